//! Store connection abstraction
//!
//! The engine drives all network operations through this opaque handle;
//! connection pooling and lifecycle live outside the engine.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ColumnDefinition, Row, Value};

/// A connection to a column store.
///
/// Implementations are expected to resolve duplicate primary-key versions
/// themselves (at read time or background compaction); the engine relies on
/// that for replay-safe appends and latest-version point lookups.
#[async_trait]
pub trait Store: Send + Sync {
    /// Execute a DDL statement
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Run a query and return its rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Append a batch of row tuples in one call.
    ///
    /// `rows` are full-width tuples ordered to match `columns`. Returns the
    /// number of rows appended.
    async fn append_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<u64>;

    /// Introspect the physical column types of a table
    async fn column_types(&self, schema: &str, table: &str) -> Result<Vec<ColumnDefinition>>;
}

/// Quote an identifier for the store's SQL dialect
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Fully qualified, quoted table name
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}
