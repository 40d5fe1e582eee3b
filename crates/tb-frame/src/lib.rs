#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use tb_index::{Index, IndexLabel};
use tb_types::{DType, Scalar, TypeError, infer_dtype};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("index length ({index_len}) does not match value length ({value_len})")]
    LengthMismatch { index_len: usize, value_len: usize },
    #[error("row {row} has {found} entries but the frame has {expected} columns")]
    RowWidthMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("duplicate column name '{name}'")]
    DuplicateColumn { name: String },
    #[error("column '{name}' not found")]
    ColumnNotFound { name: String },
}

pub fn label_to_scalar(label: &IndexLabel) -> Scalar {
    match label {
        IndexLabel::Int64(v) => Scalar::Int64(*v),
        IndexLabel::Utf8(v) => Scalar::Utf8(v.clone()),
    }
}

fn reject_duplicate_columns(columns: &[String]) -> Result<(), FrameError> {
    for (idx, name) in columns.iter().enumerate() {
        if columns[..idx].contains(name) {
            return Err(FrameError::DuplicateColumn { name: name.clone() });
        }
    }
    Ok(())
}

/// A materialized single column: a name, an index, and stored values.
///
/// Produced by baking a lazy series; every accessor is a pure lookup and
/// nothing is ever recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    name: String,
    index: Index,
    values: Vec<Scalar>,
}

impl Series {
    pub fn new(
        name: impl Into<String>,
        index: Index,
        values: Vec<Scalar>,
    ) -> Result<Self, FrameError> {
        if index.len() != values.len() {
            return Err(FrameError::LengthMismatch {
                index_len: index.len(),
                value_len: values.len(),
            });
        }

        Ok(Self {
            name: name.into(),
            index,
            values,
        })
    }

    /// Build a series over the default `0..n` index.
    pub fn from_values(name: impl Into<String>, values: Vec<Scalar>) -> Self {
        let index = Index::range(values.len());
        Self {
            name: name.into(),
            index,
            values,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Scalar> {
        self.values.get(position)
    }

    /// The dtype the stored values unify to.
    pub fn dtype(&self) -> Result<DType, TypeError> {
        infer_dtype(&self.values)
    }

    /// Label/value pairs in row order.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(IndexLabel, Scalar)> {
        self.index
            .labels()
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

/// A materialized table: ordered column names, an index, and the stored
/// row-major value matrix.
///
/// Produced by baking a lazy frame. Construction enforces the same
/// invariants the lazy layer checks at forcing time: unique column names,
/// uniform row width, and index/row-count agreement. After that, every
/// accessor is a pure lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    columns: Vec<String>,
    index: Index,
    values: Vec<Vec<Scalar>>,
}

impl DataFrame {
    pub fn new(
        columns: Vec<String>,
        index: Index,
        values: Vec<Vec<Scalar>>,
    ) -> Result<Self, FrameError> {
        reject_duplicate_columns(&columns)?;
        for (row, entries) in values.iter().enumerate() {
            if entries.len() != columns.len() {
                return Err(FrameError::RowWidthMismatch {
                    row,
                    expected: columns.len(),
                    found: entries.len(),
                });
            }
        }
        if index.len() != values.len() {
            return Err(FrameError::LengthMismatch {
                index_len: index.len(),
                value_len: values.len(),
            });
        }

        Ok(Self {
            columns,
            index,
            values,
        })
    }

    /// Build a frame over the default `0..n` index.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Result<Self, FrameError> {
        let index = Index::range(rows.len());
        Self::new(columns, index, rows)
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn values(&self) -> &[Vec<Scalar>] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn row(&self, position: usize) -> Option<&[Scalar]> {
        self.values.get(position).map(Vec::as_slice)
    }

    fn position(&self, name: &str) -> Result<usize, FrameError> {
        self.columns
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| FrameError::ColumnNotFound {
                name: name.to_owned(),
            })
    }

    /// Extract one column as a materialized series sharing this frame's index.
    pub fn series(&self, name: &str) -> Result<Series, FrameError> {
        let position = self.position(name)?;
        let values = self
            .values
            .iter()
            .map(|entries| entries[position].clone())
            .collect();
        Series::new(name, self.index.clone(), values)
    }

    /// Select columns by name, in the requested order.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, FrameError> {
        let mut columns = Vec::with_capacity(names.len());
        let mut positions = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            positions.push(self.position(name)?);
            columns.push(name.to_owned());
        }
        reject_duplicate_columns(&columns)?;

        let values = self
            .values
            .iter()
            .map(|entries| {
                positions
                    .iter()
                    .map(|&position| entries[position].clone())
                    .collect()
            })
            .collect();
        Self::new(columns, self.index.clone(), values)
    }

    /// Drop a single column, keeping the rest in their original order.
    pub fn drop_column(&self, name: &str) -> Result<Self, FrameError> {
        self.position(name)?;
        let keep: Vec<&String> = self.columns.iter().filter(|column| *column != name).collect();
        self.subset(&keep)
    }

    /// Label-prefixed rows: `[label, v0, v1, ...]` for each row position.
    #[must_use]
    pub fn rows(&self) -> Vec<Vec<Scalar>> {
        self.index
            .labels()
            .iter()
            .zip(self.values.iter())
            .map(|(label, entries)| {
                let mut row = Vec::with_capacity(entries.len() + 1);
                row.push(label_to_scalar(label));
                row.extend(entries.iter().cloned());
                row
            })
            .collect()
    }

    /// Decompose into columns, index, and value matrix without cloning.
    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, Index, Vec<Vec<Scalar>>) {
        (self.columns, self.index, self.values)
    }
}

#[cfg(test)]
mod tests {
    use tb_index::{Index, IndexLabel};
    use tb_types::{DType, Scalar};

    use super::{DataFrame, FrameError, Series};

    fn sample_frame() -> DataFrame {
        DataFrame::from_rows(
            vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
            vec![
                vec![Scalar::Int64(1), Scalar::Int64(2), Scalar::Int64(3)],
                vec![Scalar::Int64(4), Scalar::Int64(5), Scalar::Int64(6)],
            ],
        )
        .expect("sample frame")
    }

    #[test]
    fn construction_rejects_ragged_rows() {
        let err = DataFrame::from_rows(
            vec!["a".to_owned(), "b".to_owned()],
            vec![
                vec![Scalar::Int64(1), Scalar::Int64(2)],
                vec![Scalar::Int64(3)],
            ],
        )
        .expect_err("ragged rows must fail");
        assert_eq!(
            err.to_string(),
            "row 1 has 1 entries but the frame has 2 columns"
        );
    }

    #[test]
    fn construction_rejects_duplicate_columns() {
        let err = DataFrame::from_rows(vec!["a".to_owned(), "a".to_owned()], vec![])
            .expect_err("duplicates must fail");
        assert!(matches!(err, FrameError::DuplicateColumn { name } if name == "a"));
    }

    #[test]
    fn construction_rejects_index_length_mismatch() {
        let err = DataFrame::new(
            vec!["a".to_owned()],
            Index::range(2),
            vec![vec![Scalar::Int64(1)]],
        )
        .expect_err("length mismatch must fail");
        assert_eq!(
            err.to_string(),
            "index length (2) does not match value length (1)"
        );
    }

    #[test]
    fn series_extracts_the_named_column() {
        let frame = sample_frame();
        let series = frame.series("b").expect("series");
        assert_eq!(series.name(), "b");
        assert_eq!(series.values(), &[Scalar::Int64(2), Scalar::Int64(5)]);
        assert_eq!(series.get(1), Some(&Scalar::Int64(5)));
        assert_eq!(series.get(2), None);
        assert_eq!(series.index(), frame.index());
    }

    #[test]
    fn series_unknown_column_fails_with_name() {
        let err = sample_frame().series("z").expect_err("must fail");
        assert_eq!(err.to_string(), "column 'z' not found");
    }

    #[test]
    fn subset_reorders_and_filters_columns() {
        let frame = sample_frame();
        let out = frame.subset(&["c", "a"]).expect("subset");
        assert_eq!(out.columns(), &["c".to_owned(), "a".to_owned()]);
        assert_eq!(
            out.values(),
            &[
                vec![Scalar::Int64(3), Scalar::Int64(1)],
                vec![Scalar::Int64(6), Scalar::Int64(4)],
            ]
        );
    }

    #[test]
    fn drop_column_keeps_remaining_order() {
        let frame = sample_frame();
        let out = frame.drop_column("b").expect("drop");
        assert_eq!(out.columns(), &["a".to_owned(), "c".to_owned()]);
        assert_eq!(out.width(), 2);
    }

    #[test]
    fn rows_prefix_each_row_with_its_label() {
        let frame = DataFrame::new(
            vec!["x".to_owned(), "y".to_owned()],
            Index::from_i64(vec![10, 11]),
            vec![
                vec![Scalar::Int64(1), Scalar::Int64(2)],
                vec![Scalar::Int64(3), Scalar::Int64(4)],
            ],
        )
        .expect("frame");
        assert_eq!(
            frame.rows(),
            vec![
                vec![Scalar::Int64(10), Scalar::Int64(1), Scalar::Int64(2)],
                vec![Scalar::Int64(11), Scalar::Int64(3), Scalar::Int64(4)],
            ]
        );
    }

    #[test]
    fn series_dtype_unifies_stored_values() {
        let series = Series::from_values(
            "mixed",
            vec![Scalar::Int64(1), Scalar::Float64(2.5), Scalar::Bool(true)],
        );
        assert_eq!(series.dtype().expect("dtype"), DType::Float64);
    }

    #[test]
    fn series_to_pairs_zips_labels_and_values() {
        let series = Series::new(
            "s",
            Index::from_utf8(vec!["p".to_owned(), "q".to_owned()]),
            vec![Scalar::Int64(7), Scalar::Int64(8)],
        )
        .expect("series");
        assert_eq!(
            series.to_pairs(),
            vec![
                (IndexLabel::from("p"), Scalar::Int64(7)),
                (IndexLabel::from("q"), Scalar::Int64(8)),
            ]
        );
    }

    #[test]
    fn series_rejects_index_length_mismatch() {
        let err = Series::new("s", Index::range(3), vec![Scalar::Int64(1)])
            .expect_err("must fail");
        assert!(matches!(
            err,
            FrameError::LengthMismatch {
                index_len: 3,
                value_len: 1
            }
        ));
    }
}
