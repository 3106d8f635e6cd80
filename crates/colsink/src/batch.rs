//! Decoded change-batch shapes
//!
//! A change batch arrives as ordered text rows whose column order may differ
//! from the physical table order. `CsvColumns` carries both orderings: `all`
//! is the authoritative list for merges (one entry per physical column) and
//! `primary_keys` is the ordered sublist used on both sides of identity
//! encoding.

use crate::error::{Error, Result};
use crate::types::LogicalType;

/// One column of the decoded change batch
#[derive(Debug, Clone, PartialEq)]
pub struct CsvColumn {
    /// Column name
    pub name: String,
    /// Position of the field within a batch row
    pub index: usize,
    /// Position of the column within the physical table row
    pub table_index: usize,
    /// Logical type of the field text
    pub logical_type: LogicalType,
    /// Whether the column is part of the primary key
    pub primary_key: bool,
}

impl CsvColumn {
    /// Create a batch column mapping
    pub fn new(
        name: impl Into<String>,
        index: usize,
        table_index: usize,
        logical_type: LogicalType,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            table_index,
            logical_type,
            primary_key: false,
        }
    }

    /// Mark the column as part of the primary key
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// The column mapping of a decoded change batch.
///
/// Invariants enforced at construction: `all` covers every physical column
/// exactly once, and `primary_keys` is a non-empty ordered sublist of `all`.
#[derive(Debug, Clone)]
pub struct CsvColumns {
    all: Vec<CsvColumn>,
    primary_keys: Vec<CsvColumn>,
}

impl CsvColumns {
    /// Build the aggregate from all batch columns.
    ///
    /// `table_width` is the physical row width of the target table; `all`
    /// must map each physical position exactly once.
    pub fn new(all: Vec<CsvColumn>, table_width: usize) -> Result<Self> {
        if all.len() != table_width {
            return Err(Error::schema(format!(
                "batch declares {} columns but table has {table_width}",
                all.len()
            )));
        }

        let mut seen = vec![false; table_width];
        for col in &all {
            if col.table_index >= table_width {
                return Err(Error::schema(format!(
                    "column {:?} maps to table index {} beyond width {table_width}",
                    col.name, col.table_index
                )));
            }
            if std::mem::replace(&mut seen[col.table_index], true) {
                return Err(Error::schema(format!(
                    "table index {} mapped twice",
                    col.table_index
                )));
            }
        }

        let primary_keys: Vec<CsvColumn> =
            all.iter().filter(|c| c.primary_key).cloned().collect();
        if primary_keys.is_empty() {
            return Err(Error::config("batch has no primary-key columns"));
        }

        Ok(Self { all, primary_keys })
    }

    /// All batch columns, in the authoritative merge order
    #[inline]
    pub fn all(&self) -> &[CsvColumn] {
        &self.all
    }

    /// Ordered primary-key columns
    #[inline]
    pub fn primary_keys(&self) -> &[CsvColumn] {
        &self.primary_keys
    }

    /// Physical row width covered by this batch
    #[inline]
    pub fn width(&self) -> usize {
        self.all.len()
    }

    /// Fetch the field text for `column` from a batch row
    pub fn field<'a>(&self, column: &CsvColumn, row: &'a [String]) -> Result<&'a str> {
        row.get(column.index).map(String::as_str).ok_or_else(|| {
            Error::config(format!(
                "batch row has {} fields, column {:?} expects index {}",
                row.len(),
                column.name,
                column.index
            ))
        })
    }

    /// Find the column mapped to a given physical table index
    pub fn by_table_index(&self, table_index: usize) -> Option<&CsvColumn> {
        self.all.iter().find(|c| c.table_index == table_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<CsvColumn> {
        vec![
            CsvColumn::new("id", 0, 0, LogicalType::Long).primary_key(),
            CsvColumn::new("name", 2, 1, LogicalType::String),
            CsvColumn::new("synced", 1, 2, LogicalType::UtcDateTime),
        ]
    }

    #[test]
    fn test_csv_columns_valid() {
        let cols = CsvColumns::new(sample(), 3).unwrap();
        assert_eq!(cols.width(), 3);
        assert_eq!(cols.primary_keys().len(), 1);
        assert_eq!(cols.primary_keys()[0].name, "id");
        assert_eq!(cols.by_table_index(2).unwrap().name, "synced");
    }

    #[test]
    fn test_csv_columns_width_mismatch() {
        let err = CsvColumns::new(sample(), 4).unwrap_err();
        assert!(err.to_string().contains("table has 4"));
    }

    #[test]
    fn test_csv_columns_duplicate_table_index() {
        let mut cols = sample();
        cols[2].table_index = 1;
        assert!(CsvColumns::new(cols, 3).is_err());
    }

    #[test]
    fn test_csv_columns_no_primary_key() {
        let cols = sample()
            .into_iter()
            .map(|mut c| {
                c.primary_key = false;
                c
            })
            .collect();
        let err = CsvColumns::new(cols, 3).unwrap_err();
        assert!(err.to_string().contains("no primary-key"));
    }

    #[test]
    fn test_field_lookup_respects_batch_order() {
        let cols = CsvColumns::new(sample(), 3).unwrap();
        let row = vec!["7".to_string(), "2022-01-01T00:00:00Z".to_string(), "bob".to_string()];
        let name_col = &cols.all()[1];
        assert_eq!(cols.field(name_col, &row).unwrap(), "bob");

        let short = vec!["7".to_string()];
        assert!(cols.field(name_col, &short).is_err());
    }
}
