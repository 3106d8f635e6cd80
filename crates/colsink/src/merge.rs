//! Row merge policies
//!
//! Combines a fetched stored row with an incoming change row. The update
//! policy resolves each field through the null/unmodified sentinel
//! convention; the soft-delete policy touches only the designated synced
//! and deleted columns. Output rows always follow the stored row's physical
//! width and column order, regardless of the batch's column shuffle.

use std::collections::HashSet;

use crate::batch::CsvColumns;
use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// Ordered per-row value arrays plus a skip-index set.
///
/// A row whose referenced stored record is absent is skip-marked rather
/// than errored; the writer excludes skip-marked rows from the append.
#[derive(Debug, Default)]
pub struct PendingWrite {
    rows: Vec<Vec<Value>>,
    skipped: HashSet<usize>,
}

impl PendingWrite {
    /// Create a pending write for up to `capacity` rows
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            skipped: HashSet::new(),
        }
    }

    /// Append a merged row
    pub fn push(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    /// Append a skip-marked placeholder, keeping row indices aligned
    pub fn push_skipped(&mut self) {
        self.skipped.insert(self.rows.len());
        self.rows.push(Vec::new());
    }

    /// Total rows, skip-marked included
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no rows at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of skip-marked rows
    #[inline]
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Whether every row is skip-marked
    pub fn is_all_skipped(&self) -> bool {
        !self.rows.is_empty() && self.skipped.len() == self.rows.len()
    }

    /// Consume and return only the writable rows, in order
    pub fn into_write_rows(self) -> Vec<Vec<Value>> {
        let skipped = self.skipped;
        self.rows
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !skipped.contains(i))
            .map(|(_, row)| row)
            .collect()
    }
}

/// Merge an incoming change row into its fetched stored row under the
/// update policy.
///
/// Per physical column: the null marker produces NULL, the unmodified
/// marker copies the stored value, and anything else parses per the
/// column's logical type.
pub fn merge_update(
    csv: &CsvColumns,
    stored: &Row,
    incoming: &[String],
    null_marker: &str,
    unmodified_marker: &str,
) -> Result<Vec<Value>> {
    let width = csv.width();
    if stored.len() != width {
        return Err(Error::schema(format!(
            "stored row has {} columns, batch maps {width}",
            stored.len()
        )));
    }

    let mut out = vec![Value::Null; width];
    for col in csv.all() {
        let text = csv.field(col, incoming)?;
        let value = if text == null_marker {
            Value::Null
        } else if text == unmodified_marker {
            stored
                .get(col.table_index)
                .cloned()
                .unwrap_or(Value::Null)
        } else {
            col.logical_type.parse_text(text)?
        };
        out[col.table_index] = value;
    }
    Ok(out)
}

/// Merge under the soft-delete policy.
///
/// Copies the stored row unchanged except for the designated deleted flag
/// (forced true) and synced timestamp (overwritten with the batch row's
/// parsed UTC value).
pub fn merge_soft_delete(
    stored: &Row,
    synced: Value,
    synced_index: usize,
    deleted_index: usize,
) -> Result<Vec<Value>> {
    let width = stored.len();
    if synced_index >= width || deleted_index >= width {
        return Err(Error::config(format!(
            "soft-delete columns (synced {synced_index}, deleted {deleted_index}) \
             out of range for width {width}"
        )));
    }

    let mut out = stored.values().to_vec();
    out[synced_index] = synced;
    out[deleted_index] = Value::Bool(true);
    Ok(out)
}
