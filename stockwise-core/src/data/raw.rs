//! Provider-neutral tabular payload.
//!
//! Providers (and the storage read path) hand the normalizer a `RawTable`:
//! column headers, possibly multi-level, plus rows of loosely typed JSON
//! cells. Nothing here is validated; that is the normalizer's job.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A column header made of one or more segments (multi-level headers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnHeader(pub Vec<String>);

impl ColumnHeader {
    pub fn single(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    pub fn multi<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Join non-empty segments with `separator`.
    pub fn flatten(&self, separator: &str) -> String {
        self.0
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl From<&str> for ColumnHeader {
    fn from(name: &str) -> Self {
        Self::single(name)
    }
}

/// Raw rows as returned by a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<Vec<Value>>,
}

impl RawTable {
    pub fn new(columns: Vec<ColumnHeader>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Convenience constructor from single-level column names.
    pub fn with_columns(names: &[&str]) -> Self {
        Self::new(names.iter().map(|n| ColumnHeader::single(*n)).collect())
    }

    /// Append a row. Short rows are padded with nulls, long rows truncated.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
