//! Row identity encoding
//!
//! Correlates a change row with a previously stored row by canonicalizing
//! primary-key values into one matching string key. Both representations of
//! a row — typed values scanned from the store, and raw batch text — funnel
//! through the same [`KeyValue`] union and the same formatter, so the two
//! sides cannot drift apart.
//!
//! UTC timestamps encode as Unix-epoch nanoseconds, which normalizes
//! sources of differing sub-second precision to identical keys.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::fmt::Write as _;

use crate::batch::CsvColumns;
use crate::error::{Error, Result};
use crate::types::{LogicalType, Row, Value};

/// A primary-key value in canonical form.
///
/// Closed union over the value types that may participate in a primary key;
/// anything else is a hard error at the adapter, never a silent coercion.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum KeyValue {
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Utc(DateTime<Utc>),
    Text(String),
}

impl KeyValue {
    /// Adapt a typed store-scanned value
    pub fn from_stored(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(Self::Bool(*v)),
            Value::Int16(v) => Ok(Self::Int16(*v)),
            Value::Int32(v) => Ok(Self::Int32(*v)),
            Value::Int64(v) => Ok(Self::Int64(*v)),
            Value::Float32(v) => Ok(Self::Float32(*v)),
            Value::Float64(v) => Ok(Self::Float64(*v)),
            Value::Decimal(v) => Ok(Self::Decimal(*v)),
            Value::Date(v) => Ok(Self::Date(*v)),
            Value::DateTime(v) => Ok(Self::DateTime(*v)),
            Value::DateTimeTz(v) => Ok(Self::Utc(*v)),
            Value::String(v) => Ok(Self::Text(v.clone())),
            other => Err(Error::type_conversion(format!(
                "{} value cannot form a row identity",
                other.type_name()
            ))),
        }
    }

    /// Adapt a raw batch text field of the given logical type
    pub fn from_text(text: &str, logical_type: LogicalType) -> Result<Self> {
        match logical_type {
            // String skips the parse round-trip; the raw text is the value.
            LogicalType::String => Ok(Self::Text(text.to_owned())),
            LogicalType::Json | LogicalType::Xml | LogicalType::Binary => {
                Err(Error::type_conversion(format!(
                    "{logical_type} column cannot form a row identity"
                )))
            }
            other => Self::from_stored(&other.parse_text(text)?),
        }
    }

    fn write_into(&self, out: &mut String) -> Result<()> {
        match self {
            Self::Bool(v) => write!(out, "{v}"),
            Self::Int16(v) => write!(out, "{v}"),
            Self::Int32(v) => write!(out, "{v}"),
            Self::Int64(v) => write!(out, "{v}"),
            Self::Float32(v) => write!(out, "{v}"),
            Self::Float64(v) => write!(out, "{v}"),
            // Normalize trailing zeros so a scale-1 "42.0" from batch text
            // and a scale-0 "42" from the store agree.
            Self::Decimal(v) => write!(out, "{}", v.normalize()),
            Self::Date(v) => write!(out, "{}", v.format("%Y-%m-%d")),
            Self::DateTime(v) => write!(out, "{}", v.format("%Y-%m-%dT%H:%M:%S%.f")),
            Self::Utc(v) => {
                let nanos = v.timestamp_nanos_opt().ok_or_else(|| {
                    Error::type_conversion(format!("timestamp {v} out of nanosecond range"))
                })?;
                write!(out, "{nanos}")
            }
            Self::Text(v) => write!(out, "{v}"),
        }
        .map_err(|e| Error::internal(format!("identity formatting failed: {e}")))
    }
}

/// Encode primary-key name/value pairs into the canonical identity key
/// `"name1:value1,name2:value2,..."`.
///
/// The pairs must be in the authoritative primary-key column order; an
/// empty list is a usage error.
pub fn encode_identity(pairs: &[(&str, KeyValue)]) -> Result<String> {
    if pairs.is_empty() {
        return Err(Error::config("cannot encode identity without primary keys"));
    }
    let mut out = String::new();
    for (i, (name, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(name);
        out.push(':');
        value.write_into(&mut out)?;
    }
    Ok(out)
}

/// Identity key of a raw batch row
pub fn identity_from_batch_row(csv: &CsvColumns, row: &[String]) -> Result<String> {
    let mut pairs = Vec::with_capacity(csv.primary_keys().len());
    for col in csv.primary_keys() {
        let text = csv.field(col, row)?;
        pairs.push((col.name.as_str(), KeyValue::from_text(text, col.logical_type)?));
    }
    encode_identity(&pairs)
}

/// Identity key of a store-scanned row (values ordered by table index)
pub fn identity_from_stored_row(csv: &CsvColumns, row: &Row) -> Result<String> {
    let mut pairs = Vec::with_capacity(csv.primary_keys().len());
    for col in csv.primary_keys() {
        let value = row.get(col.table_index).ok_or_else(|| {
            Error::schema(format!(
                "scanned row has {} columns, primary key {:?} expects index {}",
                row.len(),
                col.name,
                col.table_index
            ))
        })?;
        pairs.push((col.name.as_str(), KeyValue::from_stored(value)?));
    }
    encode_identity(&pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::CsvColumn;

    #[test]
    fn test_encode_format() {
        let key = encode_identity(&[
            ("id", KeyValue::Int64(42)),
            ("region", KeyValue::Text("eu-west".into())),
        ])
        .unwrap();
        assert_eq!(key, "id:42,region:eu-west");
    }

    #[test]
    fn test_encode_empty_is_usage_error() {
        let err = encode_identity(&[]).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_utc_encodes_as_epoch_nanos() {
        let t: DateTime<Utc> = "2022-03-05T04:45:12.123456789Z".parse().unwrap();
        let key = encode_identity(&[("ts", KeyValue::Utc(t))]).unwrap();
        assert_eq!(key, format!("ts:{}", t.timestamp_nanos_opt().unwrap()));
    }

    #[test]
    fn test_utc_precision_normalization() {
        // The same logical second at four truncation levels: the encoded
        // nanosecond integers differ only where true sub-second values
        // differ, with trailing precision zero-filled.
        let cases = [
            ("2022-03-05T04:45:12Z", "000000000"),
            ("2022-03-05T04:45:12.123Z", "123000000"),
            ("2022-03-05T04:45:12.123456Z", "123456000"),
            ("2022-03-05T04:45:12.123456789Z", "123456789"),
        ];
        let mut keys = Vec::new();
        for (text, suffix) in cases {
            let kv = KeyValue::from_text(text, LogicalType::UtcDateTime).unwrap();
            let key = encode_identity(&[("ts", kv)]).unwrap();
            assert!(key.ends_with(suffix), "{key} should end with {suffix}");
            keys.push(key);
        }
        // All share the same whole-second prefix.
        let prefix = &keys[0][..keys[0].len() - 9];
        for key in &keys {
            assert_eq!(&key[..key.len() - 9], prefix);
        }
    }

    #[test]
    fn test_stored_and_text_sides_agree() {
        let samples: Vec<(LogicalType, &str, Value)> = vec![
            (LogicalType::Boolean, "true", Value::Bool(true)),
            (LogicalType::Short, "-7", Value::Int16(-7)),
            (LogicalType::Int, "42", Value::Int32(42)),
            (LogicalType::Long, "9000000000", Value::Int64(9_000_000_000)),
            (LogicalType::Double, "1.25", Value::Float64(1.25)),
            (
                LogicalType::Decimal,
                "42.0",
                Value::Decimal("42".parse().unwrap()),
            ),
            (
                LogicalType::Date,
                "2022-03-05",
                Value::Date(NaiveDate::from_ymd_opt(2022, 3, 5).unwrap()),
            ),
            (
                LogicalType::UtcDateTime,
                "2022-03-05T04:45:12.123Z",
                Value::DateTimeTz("2022-03-05T04:45:12.123000000Z".parse().unwrap()),
            ),
            (LogicalType::String, "alpha", Value::String("alpha".into())),
        ];

        for (ty, text, stored) in samples {
            let from_text = encode_identity(&[("k", KeyValue::from_text(text, ty).unwrap())]).unwrap();
            let from_stored =
                encode_identity(&[("k", KeyValue::from_stored(&stored).unwrap())]).unwrap();
            assert_eq!(from_text, from_stored, "mismatch for {ty}");
        }
    }

    #[test]
    fn test_unsupported_key_types_are_hard_errors() {
        assert!(KeyValue::from_stored(&Value::Bytes(vec![1])).is_err());
        assert!(KeyValue::from_stored(&Value::Json(serde_json::json!({}))).is_err());
        assert!(KeyValue::from_stored(&Value::Null).is_err());
        assert!(KeyValue::from_text("{}", LogicalType::Json).is_err());
        assert!(KeyValue::from_text("aGk=", LogicalType::Binary).is_err());
    }

    fn csv() -> CsvColumns {
        CsvColumns::new(
            vec![
                CsvColumn::new("id", 1, 0, LogicalType::Long).primary_key(),
                CsvColumn::new("region", 0, 1, LogicalType::String).primary_key(),
                CsvColumn::new("name", 2, 2, LogicalType::String),
            ],
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_batch_and_stored_row_adapters_agree() {
        let csv = csv();
        // Batch row in batch order: region, id, name.
        let batch_row = vec!["eu".to_string(), "42".to_string(), "bob".to_string()];
        // Stored row in table order: id, region, name.
        let stored_row = Row::new(
            vec!["id".into(), "region".into(), "name".into()],
            vec![Value::Int64(42), Value::String("eu".into()), Value::String("bob".into())],
        );

        let a = identity_from_batch_row(&csv, &batch_row).unwrap();
        let b = identity_from_stored_row(&csv, &stored_row).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "id:42,region:eu");
    }
}
