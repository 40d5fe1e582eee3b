#![forbid(unsafe_code)]

//! The lazy evaluation core: `LazySeries` and `LazyFrame` defer all
//! transformation work behind a tagged operation chain that a single
//! interpreter walks at force time. Nothing is computed at construction or
//! derivation; a terminal call (`values`, `rows`, `count`, `bake`, or an
//! output sink) pulls data through the whole chain in one pass.
//!
//! Forcing is deliberately uncached: `values()` re-invokes the underlying
//! producer on every call, and `bake()` is the one designated point where a
//! chain is evaluated once and stored.

use std::fmt;
use std::sync::Arc;

use tb_frame::{DataFrame, FrameError, Series, label_to_scalar};
use tb_index::Index;
use tb_types::Scalar;
use thiserror::Error;

/// Zero-argument producer of a full row-major value matrix.
pub type FrameValuesFn = Arc<dyn Fn() -> Vec<Vec<Scalar>>>;

/// Zero-argument producer of a column's values.
pub type SeriesValuesFn = Arc<dyn Fn() -> Vec<Scalar>>;

/// Reduces one window of series values; the second argument is the
/// 0-based window ordinal.
pub type SeriesReducer = Arc<dyn Fn(&[Scalar], usize) -> Scalar>;

/// Reduces one window of frame rows; the second argument is the
/// 0-based window ordinal.
pub type FrameReducer = Arc<dyn Fn(&[Vec<Scalar>], usize) -> Scalar>;

#[derive(Debug, Error)]
pub enum LazyError {
    // construction
    #[error("duplicate column name '{name}'")]
    DuplicateColumn { name: String },
    #[error("window size must be positive")]
    InvalidWindowSize,
    // lookup
    #[error("column '{name}' not found")]
    ColumnNotFound { name: String },
    // shape, detected at forcing time
    #[error("row {row} has {found} entries but the frame has {expected} columns")]
    RowWidthMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("index length ({index_len}) does not match value length ({value_len})")]
    LengthMismatch { index_len: usize, value_len: usize },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

fn reject_duplicates(columns: &[String]) -> Result<(), LazyError> {
    for (idx, name) in columns.iter().enumerate() {
        if columns[..idx].contains(name) {
            return Err(LazyError::DuplicateColumn { name: name.clone() });
        }
    }
    Ok(())
}

// ── Operation chains ───────────────────────────────────────────────────
//
// Chains are tagged plan nodes rather than nested closures: each node owns
// an `Arc` to its predecessor and a single interpreter per plan kind walks
// the chain at force time. This keeps derivation O(1), makes chains
// introspectable (`describe`), and guarantees that forcing a chain of N
// operators costs one pass over the data.

enum FramePlan {
    Source {
        values_fn: FrameValuesFn,
        width: usize,
    },
    Subset {
        input: Arc<FramePlan>,
        positions: Vec<usize>,
    },
}

enum SeriesPlan {
    Source {
        values_fn: SeriesValuesFn,
    },
    Column {
        input: Arc<FramePlan>,
        position: usize,
    },
    Window {
        input: Arc<SeriesPlan>,
        size: usize,
        reducer: SeriesReducer,
    },
    FrameWindow {
        input: Arc<FramePlan>,
        size: usize,
        reducer: FrameReducer,
    },
}

fn eval_frame(plan: &FramePlan) -> Result<Vec<Vec<Scalar>>, LazyError> {
    match plan {
        FramePlan::Source { values_fn, width } => {
            let rows = values_fn();
            for (row, entries) in rows.iter().enumerate() {
                if entries.len() != *width {
                    return Err(LazyError::RowWidthMismatch {
                        row,
                        expected: *width,
                        found: entries.len(),
                    });
                }
            }
            Ok(rows)
        }
        FramePlan::Subset { input, positions } => {
            let rows = eval_frame(input)?;
            Ok(rows
                .iter()
                .map(|entries| {
                    positions
                        .iter()
                        .map(|&position| entries[position].clone())
                        .collect()
                })
                .collect())
        }
    }
}

fn eval_series(plan: &SeriesPlan) -> Result<Vec<Scalar>, LazyError> {
    match plan {
        SeriesPlan::Source { values_fn } => Ok(values_fn()),
        SeriesPlan::Column { input, position } => {
            let rows = eval_frame(input)?;
            Ok(rows
                .iter()
                .map(|entries| entries[*position].clone())
                .collect())
        }
        // `chunks_exact` drops the trailing partial window and hands each
        // reducer a borrowed slice; no per-window allocation.
        SeriesPlan::Window {
            input,
            size,
            reducer,
        } => {
            let values = eval_series(input)?;
            Ok(values
                .chunks_exact(*size)
                .enumerate()
                .map(|(ordinal, chunk)| reducer(chunk, ordinal))
                .collect())
        }
        SeriesPlan::FrameWindow {
            input,
            size,
            reducer,
        } => {
            let rows = eval_frame(input)?;
            Ok(rows
                .chunks_exact(*size)
                .enumerate()
                .map(|(ordinal, chunk)| reducer(chunk, ordinal))
                .collect())
        }
    }
}

impl FramePlan {
    fn describe_into(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        match self {
            Self::Source { width, .. } => {
                out.push_str(&format!("{pad}source[width={width}]\n"));
            }
            Self::Subset { input, positions } => {
                out.push_str(&format!("{pad}subset{positions:?}\n"));
                input.describe_into(out, indent + 1);
            }
        }
    }
}

impl SeriesPlan {
    fn describe_into(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        match self {
            Self::Source { .. } => {
                out.push_str(&format!("{pad}source\n"));
            }
            Self::Column { input, position } => {
                out.push_str(&format!("{pad}column[{position}]\n"));
                input.describe_into(out, indent + 1);
            }
            Self::Window { input, size, .. } => {
                out.push_str(&format!("{pad}window[size={size}]\n"));
                input.describe_into(out, indent + 1);
            }
            Self::FrameWindow { input, size, .. } => {
                out.push_str(&format!("{pad}window[size={size}]\n"));
                input.describe_into(out, indent + 1);
            }
        }
    }
}

// ── LazySeries ─────────────────────────────────────────────────────────

/// A named, lazily computed column aligned to a shared index.
#[derive(Clone)]
pub struct LazySeries {
    name: String,
    index: Arc<Index>,
    plan: Arc<SeriesPlan>,
}

impl fmt::Debug for LazySeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySeries")
            .field("name", &self.name)
            .field("len", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl LazySeries {
    /// Wrap a value producer. The producer is not invoked here and must be
    /// pure: it will be re-invoked on every force.
    pub fn new(
        name: impl Into<String>,
        index: impl Into<Arc<Index>>,
        values_fn: SeriesValuesFn,
    ) -> Self {
        Self {
            name: name.into(),
            index: index.into(),
            plan: Arc::new(SeriesPlan::Source { values_fn }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared index; no recomputation.
    #[must_use]
    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    /// Force the chain. Evaluates fresh on every call — callers must not
    /// assume memoization (`bake` is the explicit, opt-in cache).
    pub fn values(&self) -> Result<Vec<Scalar>, LazyError> {
        let values = eval_series(&self.plan)?;
        if values.len() != self.index.len() {
            return Err(LazyError::LengthMismatch {
                index_len: self.index.len(),
                value_len: values.len(),
            });
        }
        Ok(values)
    }

    /// Force the chain and return the number of values.
    pub fn count(&self) -> Result<usize, LazyError> {
        Ok(self.values()?.len())
    }

    /// Reduce consecutive non-overlapping windows of `size` values, in
    /// order, discarding a trailing partial window. The result is itself
    /// lazy and indexed by window ordinal.
    pub fn window(&self, size: usize, reducer: SeriesReducer) -> Result<Self, LazyError> {
        if size == 0 {
            return Err(LazyError::InvalidWindowSize);
        }
        Ok(Self {
            name: self.name.clone(),
            index: Arc::new(Index::range(self.index.len() / size)),
            plan: Arc::new(SeriesPlan::Window {
                input: Arc::clone(&self.plan),
                size,
                reducer,
            }),
        })
    }

    /// Force the chain exactly once and store the result; accessors on the
    /// returned series are pure lookups.
    pub fn bake(&self) -> Result<Series, LazyError> {
        let values = self.values()?;
        Ok(Series::new(
            self.name.clone(),
            self.index.as_ref().clone(),
            values,
        )?)
    }

    /// Render the operation chain as an indented tree, outermost first.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.plan.describe_into(&mut out, 0);
        out
    }
}

// ── LazyFrame ──────────────────────────────────────────────────────────

/// A lazily computed table: ordered unique column names, a shared index,
/// and a deferred producer of the row-major value matrix.
#[derive(Clone)]
pub struct LazyFrame {
    columns: Arc<Vec<String>>,
    index: Arc<Index>,
    plan: Arc<FramePlan>,
}

impl fmt::Debug for LazyFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyFrame")
            .field("columns", &self.columns)
            .field("len", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl LazyFrame {
    /// Wrap a row-matrix producer. Column names must be unique; the
    /// producer is not invoked here and must be pure.
    pub fn new(
        columns: Vec<String>,
        index: impl Into<Arc<Index>>,
        values_fn: FrameValuesFn,
    ) -> Result<Self, LazyError> {
        reject_duplicates(&columns)?;
        let width = columns.len();
        Ok(Self {
            columns: Arc::new(columns),
            index: index.into(),
            plan: Arc::new(FramePlan::Source { values_fn, width }),
        })
    }

    /// Build a frame from a concrete row matrix over the default `0..n`
    /// index. Row widths are validated here, at construction.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Result<Self, LazyError> {
        for (row, entries) in rows.iter().enumerate() {
            if entries.len() != columns.len() {
                return Err(LazyError::RowWidthMismatch {
                    row,
                    expected: columns.len(),
                    found: entries.len(),
                });
            }
        }
        let index = Index::range(rows.len());
        let values_fn: FrameValuesFn = Arc::new(move || rows.clone());
        Self::new(columns, index, values_fn)
    }

    /// Re-enter the lazy world from a materialized frame.
    #[must_use]
    pub fn from_dataframe(frame: DataFrame) -> Self {
        let (columns, index, rows) = frame.into_parts();
        let width = columns.len();
        let values_fn: FrameValuesFn = Arc::new(move || rows.clone());
        Self {
            columns: Arc::new(columns),
            index: Arc::new(index),
            plan: Arc::new(FramePlan::Source { values_fn, width }),
        }
    }

    /// Ordered column names; no recomputation.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The shared index; no recomputation.
    #[must_use]
    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    fn position(&self, name: &str) -> Result<usize, LazyError> {
        self.columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| LazyError::ColumnNotFound {
                name: name.to_owned(),
            })
    }

    /// Force the chain. Row widths and the index/row-count invariant are
    /// validated here; evaluation is fresh on every call.
    pub fn values(&self) -> Result<Vec<Vec<Scalar>>, LazyError> {
        let rows = eval_frame(&self.plan)?;
        if rows.len() != self.index.len() {
            return Err(LazyError::LengthMismatch {
                index_len: self.index.len(),
                value_len: rows.len(),
            });
        }
        Ok(rows)
    }

    /// Derive the named column as a lazy series sharing this frame's index.
    /// The name is resolved now; the data is not touched.
    pub fn series(&self, name: &str) -> Result<LazySeries, LazyError> {
        let position = self.position(name)?;
        Ok(LazySeries {
            name: name.to_owned(),
            index: Arc::clone(&self.index),
            plan: Arc::new(SeriesPlan::Column {
                input: Arc::clone(&self.plan),
                position,
            }),
        })
    }

    /// Derive a frame holding the requested columns in the requested order.
    /// All names are resolved now (never per row); the data is not touched.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, LazyError> {
        let mut columns = Vec::with_capacity(names.len());
        let mut positions = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            positions.push(self.position(name)?);
            columns.push(name.to_owned());
        }
        reject_duplicates(&columns)?;
        Ok(Self {
            columns: Arc::new(columns),
            index: Arc::clone(&self.index),
            plan: Arc::new(FramePlan::Subset {
                input: Arc::clone(&self.plan),
                positions,
            }),
        })
    }

    /// Drop a single column, keeping the rest in their original order.
    pub fn drop_column(&self, name: &str) -> Result<Self, LazyError> {
        self.position(name)?;
        let keep: Vec<&String> = self
            .columns
            .iter()
            .filter(|column| *column != name)
            .collect();
        self.subset(&keep)
    }

    /// Reduce consecutive non-overlapping windows of `size` rows into a
    /// lazy series indexed by window ordinal. A trailing partial window is
    /// discarded.
    pub fn window(&self, size: usize, reducer: FrameReducer) -> Result<LazySeries, LazyError> {
        if size == 0 {
            return Err(LazyError::InvalidWindowSize);
        }
        Ok(LazySeries {
            name: "window".to_owned(),
            index: Arc::new(Index::range(self.index.len() / size)),
            plan: Arc::new(SeriesPlan::FrameWindow {
                input: Arc::clone(&self.plan),
                size,
                reducer,
            }),
        })
    }

    /// Label-prefixed rows: `[label, v0, v1, ...]` for each row position.
    /// This is the bridge presentation and codec collaborators use to get
    /// labels and data together.
    pub fn rows(&self) -> Result<Vec<Vec<Scalar>>, LazyError> {
        let values = self.values()?;
        Ok(self
            .index
            .labels()
            .iter()
            .zip(values)
            .map(|(label, entries)| {
                let mut row = Vec::with_capacity(entries.len() + 1);
                row.push(label_to_scalar(label));
                row.extend(entries);
                row
            })
            .collect())
    }

    /// Force the chain and return the number of rows.
    pub fn count(&self) -> Result<usize, LazyError> {
        Ok(self.values()?.len())
    }

    /// Force the chain exactly once and store the result; accessors on the
    /// returned frame are pure lookups. The lazy frame itself is unchanged
    /// and can be forced again.
    pub fn bake(&self) -> Result<DataFrame, LazyError> {
        let values = self.values()?;
        Ok(DataFrame::new(
            self.columns.as_ref().clone(),
            self.index.as_ref().clone(),
            values,
        )?)
    }

    /// Render the operation chain as an indented tree, outermost first.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.plan.describe_into(&mut out, 0);
        out
    }

    /// Stage one of the pluggable output protocol: capture a format
    /// encoder. Stage two (`Formatted::to`) captures the destination sink.
    pub fn as_format<E: Encoder>(&self, encoder: E) -> Formatted<'_, E> {
        Formatted {
            frame: self,
            encoder,
        }
    }
}

// ── Pluggable output protocol ──────────────────────────────────────────

/// A format encoder: turns a frame into text. Must be deterministic for a
/// given frame; options belong to the encoder value itself.
pub trait Encoder {
    type Error: std::error::Error + 'static;

    fn encode(&self, frame: &LazyFrame) -> Result<String, Self::Error>;
}

/// A destination sink: consumes encoded text and produces a sink-specific
/// output, which the core passes through untouched.
pub trait Sink {
    type Error: std::error::Error + 'static;
    type Output;

    fn write(&self, text: &str) -> Result<Self::Output, Self::Error>;
}

/// A collaborator failure from either stage of the output protocol,
/// propagated unchanged.
#[derive(Debug, Error)]
pub enum PipeError<E, W>
where
    E: std::error::Error + 'static,
    W: std::error::Error + 'static,
{
    #[error(transparent)]
    Encode(E),
    #[error(transparent)]
    Write(W),
}

/// The intermediate of `as_format`: a frame paired with a captured encoder,
/// waiting for a destination.
#[derive(Debug)]
pub struct Formatted<'a, E: Encoder> {
    frame: &'a LazyFrame,
    encoder: E,
}

impl<E: Encoder> Formatted<'_, E> {
    /// Encode the frame exactly once and hand the exact output to the
    /// sink, returning the sink's output unmodified.
    pub fn to<S: Sink>(&self, sink: &S) -> Result<S::Output, PipeError<E::Error, S::Error>> {
        let text = self.encoder.encode(self.frame).map_err(PipeError::Encode)?;
        sink.write(&text).map_err(PipeError::Write)
    }
}
