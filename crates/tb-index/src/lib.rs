#![forbid(unsafe_code)]

use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexLabel {
    Int64(i64),
    Utf8(String),
}

impl From<i64> for IndexLabel {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for IndexLabel {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for IndexLabel {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

/// An ordered sequence of row labels.
///
/// One label per logical row; labels need not be unique, and their order
/// defines row order for the table they index. An `Index` is created once at
/// table construction and never mutated; a table and every series derived
/// from it share the same `Index` by reference, so re-labeling is a
/// table-level operation rather than a per-column one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    labels: Vec<IndexLabel>,
    #[serde(skip)]
    duplicate_cache: OnceCell<bool>,
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for Index {}

fn detect_duplicates(labels: &[IndexLabel]) -> bool {
    let mut seen = HashMap::<&IndexLabel, ()>::new();
    for label in labels {
        if seen.insert(label, ()).is_some() {
            return true;
        }
    }
    false
}

impl Index {
    #[must_use]
    pub fn new(labels: Vec<IndexLabel>) -> Self {
        Self {
            labels,
            duplicate_cache: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self::new(values.into_iter().map(IndexLabel::from).collect())
    }

    #[must_use]
    pub fn from_utf8(values: Vec<String>) -> Self {
        Self::new(values.into_iter().map(IndexLabel::from).collect())
    }

    /// The default index: labels `0..len`.
    #[must_use]
    pub fn range(len: usize) -> Self {
        Self::new((0..len as i64).map(IndexLabel::Int64).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[IndexLabel] {
        &self.labels
    }

    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        *self
            .duplicate_cache
            .get_or_init(|| detect_duplicates(&self.labels))
    }
}

#[cfg(test)]
mod tests {
    use super::{Index, IndexLabel};

    #[test]
    fn range_index_counts_from_zero() {
        let index = Index::range(3);
        assert_eq!(
            index.labels(),
            &[
                IndexLabel::Int64(0),
                IndexLabel::Int64(1),
                IndexLabel::Int64(2)
            ]
        );
        assert!(!index.has_duplicates());
    }

    #[test]
    fn duplicate_labels_are_permitted_and_detected() {
        let index = Index::from_utf8(vec!["a".to_owned(), "b".to_owned(), "a".to_owned()]);
        assert_eq!(index.len(), 3);
        assert!(index.has_duplicates());
    }

    #[test]
    fn equality_ignores_the_duplicate_cache() {
        let left = Index::from_i64(vec![1, 2, 3]);
        let right = Index::from_i64(vec![1, 2, 3]);
        assert!(!left.has_duplicates());
        assert_eq!(left, right);
    }

    #[test]
    fn empty_index_is_empty() {
        let index = Index::range(0);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn labels_display_without_adornment() {
        assert_eq!(IndexLabel::from(42).to_string(), "42");
        assert_eq!(IndexLabel::from("row-1").to_string(), "row-1");
    }
}
