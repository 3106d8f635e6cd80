//! Value and schema types for colsink
//!
//! The store-facing type system:
//! - Value: typed store values as scanned from or appended to the store
//! - LogicalType: source-protocol logical type tags with text parsing
//! - ColumnDefinition / TableDescription: introspected or declared schema

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A store value that can hold any column value supported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// 16-bit signed integer (SMALLINT)
    Int16(i16),
    /// 32-bit signed integer (INTEGER)
    Int32(i32),
    /// 64-bit signed integer (BIGINT)
    Int64(i64),
    /// 32-bit floating point (REAL)
    Float32(f32),
    /// 64-bit floating point (DOUBLE PRECISION)
    Float64(f64),
    /// Arbitrary precision decimal (NUMERIC, DECIMAL)
    Decimal(Decimal),
    /// Text string (VARCHAR, TEXT, XML payloads)
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Date without time (DATE)
    Date(NaiveDate),
    /// Timestamp without timezone (TIMESTAMP)
    DateTime(NaiveDateTime),
    /// Timestamp with timezone, normalized to UTC (TIMESTAMPTZ)
    DateTimeTz(DateTime<Utc>),
    /// JSON value
    Json(serde_json::Value),
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the store-facing type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOLEAN",
            Self::Int16(_) => "SMALLINT",
            Self::Int32(_) => "INTEGER",
            Self::Int64(_) => "BIGINT",
            Self::Float32(_) => "REAL",
            Self::Float64(_) => "DOUBLE PRECISION",
            Self::Decimal(_) => "DECIMAL",
            Self::String(_) => "VARCHAR",
            Self::Bytes(_) => "BINARY",
            Self::Date(_) => "DATE",
            Self::DateTime(_) => "TIMESTAMP",
            Self::DateTimeTz(_) => "TIMESTAMPTZ",
            Self::Json(_) => "JSON",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTimeTz(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

/// Logical column types of the change-data protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum LogicalType {
    Boolean,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    Date,
    DateTime,
    /// Timezone-aware timestamp, normalized to UTC
    UtcDateTime,
    String,
    Json,
    Xml,
    Binary,
}

impl LogicalType {
    /// Parse a raw batch text field into a typed store value.
    ///
    /// The text is the field exactly as decoded from the change-batch file;
    /// sentinel handling (null/unmodified markers) happens before this call.
    pub fn parse_text(self, text: &str) -> Result<Value> {
        match self {
            Self::Boolean => match text {
                "true" | "TRUE" | "1" => Ok(Value::Bool(true)),
                "false" | "FALSE" | "0" => Ok(Value::Bool(false)),
                _ => Err(bad_field(text, "boolean")),
            },
            Self::Short => text
                .parse::<i16>()
                .map(Value::Int16)
                .map_err(|_| bad_field(text, "short")),
            Self::Int => text
                .parse::<i32>()
                .map(Value::Int32)
                .map_err(|_| bad_field(text, "int")),
            Self::Long => text
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|_| bad_field(text, "long")),
            Self::Float => text
                .parse::<f32>()
                .map(Value::Float32)
                .map_err(|_| bad_field(text, "float")),
            Self::Double => text
                .parse::<f64>()
                .map(Value::Float64)
                .map_err(|_| bad_field(text, "double")),
            Self::Decimal => Decimal::from_str(text)
                .map(Value::Decimal)
                .map_err(|_| bad_field(text, "decimal")),
            Self::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| bad_field(text, "date")),
            Self::DateTime => parse_naive_datetime(text)
                .map(Value::DateTime)
                .ok_or_else(|| bad_field(text, "datetime")),
            Self::UtcDateTime => DateTime::parse_from_rfc3339(text)
                .map(|dt| Value::DateTimeTz(dt.with_timezone(&Utc)))
                .map_err(|_| bad_field(text, "utc datetime")),
            Self::String | Self::Xml => Ok(Value::String(text.to_owned())),
            Self::Json => serde_json::from_str(text)
                .map(Value::Json)
                .map_err(|_| bad_field(text, "json")),
            Self::Binary => {
                use base64::Engine as _;
                base64::engine::general_purpose::STANDARD
                    .decode(text)
                    .map(Value::Bytes)
                    .map_err(|_| bad_field(text, "binary"))
            }
        }
    }
}

fn parse_naive_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

fn bad_field(text: &str, expected: &str) -> Error {
    Error::type_conversion(format!("cannot parse {text:?} as {expected}"))
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::UtcDateTime => "utc_datetime",
            Self::String => "string",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Binary => "binary",
        };
        write!(f, "{name}")
    }
}

/// Store row as ordered column values
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column names
    columns: Vec<String>,
    /// Column values (same order as columns)
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column names
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get all values
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get value by column index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get value by column name
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Consume the row and return its values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// A single column of a column-store table.
///
/// Immutable once built, from introspection or from an inbound schema request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,
    /// Physical store type string
    pub type_name: String,
    /// Whether the column is nullable (also disambiguates wrapped types)
    pub nullable: bool,
    /// Whether the column is part of the primary key
    pub primary_key: bool,
    /// Precision for decimal columns
    pub precision: Option<u32>,
    /// Scale for decimal columns
    pub scale: Option<u32>,
}

impl ColumnDefinition {
    /// Create basic column metadata
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable: true,
            primary_key: false,
            precision: None,
            scale: None,
        }
    }

    /// Mark the column as part of the primary key
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark the column as not nullable
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set decimal precision and scale
    pub fn with_decimal(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }
}

/// Ordered column definitions with derived lookups.
///
/// The primary-key name list is derived at construction and never mutated
/// independently of the column list.
#[derive(Debug, Clone)]
pub struct TableDescription {
    name: String,
    columns: Vec<ColumnDefinition>,
    index: HashMap<String, usize>,
    primary_keys: Vec<String>,
}

impl TableDescription {
    /// Build a table description from ordered columns
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Result<Self> {
        let name = name.into();
        let mut index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            if index.insert(col.name.clone(), i).is_some() {
                return Err(Error::schema(format!(
                    "duplicate column {:?} in table {name}",
                    col.name
                )));
            }
        }
        let primary_keys = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        Ok(Self {
            name,
            columns,
            index,
            primary_keys,
        })
    }

    /// Table name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered column definitions
    #[inline]
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Physical row width
    #[inline]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Ordered primary-key column names
    #[inline]
    pub fn primary_key_names(&self) -> &[String] {
        &self.primary_keys
    }

    /// Ordered column names
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Compare declared columns against introspected store metadata.
    ///
    /// Checks name and physical type in order; anything deeper (defaults,
    /// codecs) is out of scope.
    pub fn check_against(&self, introspected: &[ColumnDefinition]) -> Result<()> {
        if self.columns.len() != introspected.len() {
            return Err(Error::schema(format!(
                "table {} declares {} columns but store has {}",
                self.name,
                self.columns.len(),
                introspected.len()
            )));
        }
        for (declared, actual) in self.columns.iter().zip(introspected) {
            if declared.name != actual.name || declared.type_name != actual.type_name {
                return Err(Error::schema(format!(
                    "table {}: declared column {} {} does not match store column {} {}",
                    self.name, declared.name, declared.type_name, actual.name, actual.type_name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null() {
        assert!(Value::Null.is_null());
        assert!(!Value::Int32(0).is_null());
    }

    #[test]
    fn test_parse_primitives() {
        assert_eq!(
            LogicalType::Boolean.parse_text("true").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            LogicalType::Short.parse_text("-3").unwrap(),
            Value::Int16(-3)
        );
        assert_eq!(LogicalType::Int.parse_text("42").unwrap(), Value::Int32(42));
        assert_eq!(
            LogicalType::Long.parse_text("9000000000").unwrap(),
            Value::Int64(9_000_000_000)
        );
        assert_eq!(
            LogicalType::Double.parse_text("1.5").unwrap(),
            Value::Float64(1.5)
        );
    }

    #[test]
    fn test_parse_decimal_exact() {
        let v = LogicalType::Decimal.parse_text("123456.789012").unwrap();
        assert_eq!(v, Value::Decimal("123456.789012".parse().unwrap()));
    }

    #[test]
    fn test_parse_temporal() {
        assert_eq!(
            LogicalType::Date.parse_text("2022-03-05").unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2022, 3, 5).unwrap())
        );

        let dt = LogicalType::DateTime.parse_text("2022-03-05T04:45:12.5").unwrap();
        assert!(matches!(dt, Value::DateTime(_)));

        // Space-separated form is accepted too
        let dt = LogicalType::DateTime.parse_text("2022-03-05 04:45:12").unwrap();
        assert!(matches!(dt, Value::DateTime(_)));

        let tz = LogicalType::UtcDateTime
            .parse_text("2022-03-05T04:45:12.123456789Z")
            .unwrap();
        match tz {
            Value::DateTimeTz(t) => assert_eq!(t.timestamp_subsec_nanos(), 123_456_789),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_parse_binary_base64() {
        assert_eq!(
            LogicalType::Binary.parse_text("aGVsbG8=").unwrap(),
            Value::Bytes(b"hello".to_vec())
        );
    }

    #[test]
    fn test_parse_errors_are_type_conversion() {
        let err = LogicalType::Int.parse_text("not-a-number").unwrap_err();
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("not-a-number"));

        assert!(LogicalType::Json.parse_text("{broken").is_err());
        assert!(LogicalType::UtcDateTime.parse_text("2022-03-05").is_err());
    }

    #[test]
    fn test_row_operations() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::Int32(1), Value::String("Alice".into())],
        );

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Int32(1)));
        assert_eq!(row.get_by_name("NAME"), Some(&Value::String("Alice".into())));
    }

    #[test]
    fn test_table_description() {
        let table = TableDescription::new(
            "users",
            vec![
                ColumnDefinition::new("id", "Int64").primary_key(),
                ColumnDefinition::new("name", "String"),
                ColumnDefinition::new("balance", "Decimal(18, 4)").with_decimal(18, 4),
            ],
        )
        .unwrap();

        assert_eq!(table.width(), 3);
        assert_eq!(table.primary_key_names(), ["id"]);
        assert_eq!(table.column_index("balance"), Some(2));
        assert!(table.column("id").unwrap().primary_key);
        assert!(!table.column("id").unwrap().nullable);
    }

    #[test]
    fn test_table_description_duplicate_column() {
        let err = TableDescription::new(
            "t",
            vec![
                ColumnDefinition::new("a", "Int32"),
                ColumnDefinition::new("a", "String"),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate column"));
    }

    #[test]
    fn test_check_against() {
        let table = TableDescription::new(
            "t",
            vec![
                ColumnDefinition::new("id", "Int64").primary_key(),
                ColumnDefinition::new("name", "String"),
            ],
        )
        .unwrap();

        let introspected = vec![
            ColumnDefinition::new("id", "Int64"),
            ColumnDefinition::new("name", "String"),
        ];
        assert!(table.check_against(&introspected).is_ok());

        let mismatched = vec![
            ColumnDefinition::new("id", "Int32"),
            ColumnDefinition::new("name", "String"),
        ];
        assert!(table.check_against(&mismatched).is_err());

        assert!(table.check_against(&introspected[..1]).is_err());
    }
}
