#![forbid(unsafe_code)]

//! External collaborators for the lazy core: concrete format encoders
//! (CSV, JSON, HTML), the matching decoders, and destination sinks. All of
//! them reach the core only through `bake`, `rows`, `columns`, and
//! `index`; the core knows them only as `Encoder`/`Sink` capabilities.

use std::path::PathBuf;

use csv::{ReaderBuilder, WriterBuilder};
use serde_json::{Map, Value};
use tb_frame::{DataFrame, FrameError};
use tb_index::Index;
use tb_lazy::{Encoder, LazyError, LazyFrame, Sink};
use tb_types::{NullKind, Scalar};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error("json input must be an array of flat objects")]
    UnsupportedJsonShape,
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Lazy(#[from] LazyError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

// ── Scalar rendering and sniffing ──────────────────────────────────────

fn parse_scalar(field: &str) -> Scalar {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Scalar::Null(NullKind::Null);
    }

    if let Ok(value) = trimmed.parse::<i64>() {
        return Scalar::Int64(value);
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        return Scalar::Float64(value);
    }
    if let Ok(value) = trimmed.parse::<bool>() {
        return Scalar::Bool(value);
    }

    Scalar::Utf8(trimmed.to_owned())
}

fn scalar_to_text(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Null(_) => String::new(),
        Scalar::Bool(v) => v.to_string(),
        Scalar::Int64(v) => v.to_string(),
        Scalar::Float64(v) => {
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }
        Scalar::Utf8(v) => v.clone(),
    }
}

fn scalar_to_json(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Null(_) => Value::Null,
        Scalar::Bool(v) => Value::Bool(*v),
        Scalar::Int64(v) => Value::from(*v),
        // JSON has no NaN; missing floats degrade to null.
        Scalar::Float64(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
        Scalar::Utf8(v) => Value::String(v.clone()),
    }
}

fn json_to_scalar(value: &Value) -> Result<Scalar, IoError> {
    match value {
        Value::Null => Ok(Scalar::Null(NullKind::Null)),
        Value::Bool(v) => Ok(Scalar::Bool(*v)),
        Value::Number(v) => {
            if let Some(int) = v.as_i64() {
                Ok(Scalar::Int64(int))
            } else if let Some(float) = v.as_f64() {
                Ok(Scalar::Float64(float))
            } else {
                Err(IoError::UnsupportedJsonShape)
            }
        }
        Value::String(v) => Ok(Scalar::Utf8(v.clone())),
        Value::Array(_) | Value::Object(_) => Err(IoError::UnsupportedJsonShape),
    }
}

// ── CSV ────────────────────────────────────────────────────────────────

/// CSV format encoder: header row of column names, then one record per
/// row. Row labels are not written — CSV consumers re-index on read.
#[derive(Debug, Clone, Copy)]
pub struct CsvFormat {
    pub delimiter: u8,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl Encoder for CsvFormat {
    type Error = IoError;

    fn encode(&self, frame: &LazyFrame) -> Result<String, IoError> {
        let baked = frame.bake()?;
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(Vec::new());

        writer.write_record(baked.columns())?;
        for entries in baked.values() {
            writer.write_record(entries.iter().map(scalar_to_text))?;
        }

        let bytes = writer.into_inner().map_err(|err| err.into_error())?;
        Ok(String::from_utf8(bytes)?)
    }
}

/// Decode headed CSV text into a materialized frame over the default
/// `0..n` index, sniffing each field as int, float, bool, or text (empty
/// fields become missing values).
pub fn read_csv_str(input: &str) -> Result<DataFrame, IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let headers = reader.headers().cloned()?;
    if headers.is_empty() {
        return Err(IoError::MissingHeaders);
    }

    let columns: Vec<String> = headers.iter().map(str::to_owned).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<Scalar> = (0..columns.len())
            .map(|idx| parse_scalar(record.get(idx).unwrap_or_default()))
            .collect();
        rows.push(row);
    }

    let index = Index::range(rows.len());
    Ok(DataFrame::new(columns, index, rows)?)
}

// ── JSON ───────────────────────────────────────────────────────────────

/// JSON format encoder: an array with one `{column: value}` object per
/// row, columns in frame order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat {
    pub pretty: bool,
}

impl Encoder for JsonFormat {
    type Error = IoError;

    fn encode(&self, frame: &LazyFrame) -> Result<String, IoError> {
        let baked = frame.bake()?;
        let objects: Vec<Value> = baked
            .values()
            .iter()
            .map(|entries| {
                let mut object = Map::with_capacity(entries.len());
                for (name, value) in baked.columns().iter().zip(entries) {
                    object.insert(name.clone(), scalar_to_json(value));
                }
                Value::Object(object)
            })
            .collect();

        let text = if self.pretty {
            serde_json::to_string_pretty(&objects)?
        } else {
            serde_json::to_string(&objects)?
        };
        Ok(text)
    }
}

/// Decode a JSON array of flat objects into a materialized frame. Column
/// names and order come from the first object; objects missing a key get
/// a null cell, and keys absent from the first object are ignored.
pub fn read_json_str(input: &str) -> Result<DataFrame, IoError> {
    let parsed: Value = serde_json::from_str(input)?;
    let Value::Array(objects) = parsed else {
        return Err(IoError::UnsupportedJsonShape);
    };

    let mut columns: Vec<String> = Vec::new();
    if let Some(first) = objects.first() {
        let Value::Object(object) = first else {
            return Err(IoError::UnsupportedJsonShape);
        };
        columns = object.keys().cloned().collect();
    }

    let mut rows = Vec::with_capacity(objects.len());
    for object in &objects {
        let Value::Object(object) = object else {
            return Err(IoError::UnsupportedJsonShape);
        };
        let row = columns
            .iter()
            .map(|name| {
                object
                    .get(name)
                    .map_or(Ok(Scalar::Null(NullKind::Null)), json_to_scalar)
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }

    let index = Index::range(rows.len());
    Ok(DataFrame::new(columns, index, rows)?)
}

// ── HTML ───────────────────────────────────────────────────────────────

/// HTML format encoder: the classic bordered `dataframe` table with row
/// labels as row headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlFormat;

impl Encoder for HtmlFormat {
    type Error = IoError;

    fn encode(&self, frame: &LazyFrame) -> Result<String, IoError> {
        let baked = frame.bake()?;
        let mut out = String::new();

        out.push_str("<table border=\"1\" class=\"dataframe\">\n");
        out.push_str("    <thead>\n");
        out.push_str("        <tr style=\"text-align: right;\">\n");
        out.push_str("            <th></th>\n");
        for name in baked.columns() {
            out.push_str(&format!("            <th>{name}</th>\n"));
        }
        out.push_str("       </tr>\n");
        out.push_str("    </thead>\n");
        out.push_str("    <tbody>\n");
        for (label, entries) in baked.index().labels().iter().zip(baked.values()) {
            out.push_str("        <tr>\n");
            out.push_str(&format!("            <th>{label}</th>\n"));
            for value in entries {
                out.push_str(&format!("            <td>{}</td>\n", scalar_to_text(value)));
            }
            out.push_str("        </tr>\n");
        }
        out.push_str("    </tbody>\n");
        out.push_str("</table>");

        Ok(out)
    }
}

// ── Sinks ──────────────────────────────────────────────────────────────

/// A sink that simply hands the encoded text back as its output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSink;

impl Sink for StringSink {
    type Error = std::convert::Infallible;
    type Output = String;

    fn write(&self, text: &str) -> Result<String, Self::Error> {
        Ok(text.to_owned())
    }
}

/// A sink that writes the encoded text to a file path.
#[derive(Debug, Clone)]
pub struct FileSink {
    pub path: PathBuf,
}

impl FileSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Sink for FileSink {
    type Error = std::io::Error;
    type Output = ();

    fn write(&self, text: &str) -> Result<(), std::io::Error> {
        std::fs::write(&self.path, text)
    }
}
