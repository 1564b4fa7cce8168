//! Bidirectional conversion between logical values and portable text.
//!
//! The [`ValueFormatRegistry`] converts every native column value into a
//! dialect-neutral textual representation and back, keyed by the column's
//! logical type code. Conversions are round-trip exact for all primitive
//! numeric and text types: the text form is the type's native string form,
//! never locale-formatted.
//!
//! Temporal types go through dedicated formats that apply the job time
//! zone only when the source dialect cannot set a session-level time zone
//! itself; applying both would convert twice.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{FerryError, Result};
use crate::format::envelope::{Envelope, OpaqueKind};
use crate::types::{ColumnHandle, SqlTypeCode, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMP_TZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

/// Converts one column value to portable text and back.
pub trait ValueFormat: Send + Sync {
    /// Format a non-null value as portable text.
    fn get_value(&self, column: &ColumnHandle, value: &Value) -> Result<Option<String>>;

    /// Parse non-empty portable text back into a value.
    fn set_value(&self, column: &ColumnHandle, text: &str) -> Result<Value>;
}

/// Registry of value formats keyed by SQL type code.
///
/// Constructed per job: `time_zone` must be set exactly when the resolved
/// dialect does not support a session time zone. Temporal overrides are
/// registered by the constructor, mirroring how the default format covers
/// everything else; callers may register further per-type overrides.
pub struct ValueFormatRegistry {
    overrides: HashMap<SqlTypeCode, Arc<dyn ValueFormat>>,
    default_format: Arc<dyn ValueFormat>,
}

impl ValueFormatRegistry {
    pub fn new(time_zone: Option<FixedOffset>) -> Self {
        let temporal = Arc::new(TemporalValueFormat { time_zone });
        let mut overrides: HashMap<SqlTypeCode, Arc<dyn ValueFormat>> = HashMap::new();
        overrides.insert(SqlTypeCode::Date, temporal.clone());
        overrides.insert(SqlTypeCode::Time, temporal.clone());
        overrides.insert(SqlTypeCode::Timestamp, temporal.clone());
        overrides.insert(SqlTypeCode::TimestampTz, temporal);
        Self {
            overrides,
            default_format: Arc::new(DefaultValueFormat),
        }
    }

    /// Register a per-type override.
    pub fn register(&mut self, code: SqlTypeCode, format: Arc<dyn ValueFormat>) {
        self.overrides.insert(code, format);
    }

    fn format_for(&self, code: SqlTypeCode) -> &dyn ValueFormat {
        self.overrides
            .get(&code)
            .map(Arc::as_ref)
            .unwrap_or(self.default_format.as_ref())
    }

    /// Convert a value to its portable text form; `None` represents NULL.
    pub fn get_value(&self, column: &ColumnHandle, value: &Value) -> Result<Option<String>> {
        if value.is_null() {
            return Ok(None);
        }
        self.format_for(column.type_code).get_value(column, value)
    }

    /// Convert portable text back into a value; `None` represents NULL.
    ///
    /// Empty text parses to NULL for every non-text type; for text types
    /// an empty string is a value, so NULL must arrive as `None` (the
    /// framing layer's null marker).
    pub fn set_value(&self, column: &ColumnHandle, text: Option<&str>) -> Result<Value> {
        match text {
            None => Ok(Value::Null),
            Some(t) if t.is_empty() && !column.type_code.is_text() => Ok(Value::Null),
            Some(t) => self.format_for(column.type_code).set_value(column, t),
        }
    }
}

impl std::fmt::Debug for ValueFormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueFormatRegistry")
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn unexpected(column: &ColumnHandle, value: &Value) -> FerryError {
    FerryError::malformed(
        &column.name,
        format!(
            "unexpected value {:?} for {} column",
            value,
            column.type_code.alias()
        ),
    )
}

fn parse_err(column: &ColumnHandle, text: &str, what: &str) -> FerryError {
    FerryError::malformed(&column.name, format!("cannot parse {:?} as {}", text, what))
}

/// Default format: covers every non-temporal type code.
struct DefaultValueFormat;

impl DefaultValueFormat {
    fn format_integer(column: &ColumnHandle, value: &Value) -> Result<String> {
        match value {
            Value::I16(v) => Ok(v.to_string()),
            Value::I32(v) => Ok(v.to_string()),
            Value::I64(v) => Ok(v.to_string()),
            Value::Decimal(v) => Ok(v.to_string()),
            Value::Bool(v) => Ok(if *v { "1" } else { "0" }.to_string()),
            other => Err(unexpected(column, other)),
        }
    }

    fn format_bool(column: &ColumnHandle, value: &Value) -> Result<String> {
        match value {
            Value::Bool(v) => Ok(v.to_string()),
            Value::I16(v) => Ok((*v != 0).to_string()),
            Value::I32(v) => Ok((*v != 0).to_string()),
            Value::I64(v) => Ok((*v != 0).to_string()),
            other => Err(unexpected(column, other)),
        }
    }

    fn format_text(column: &ColumnHandle, value: &Value) -> Result<String> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            other => Err(unexpected(column, other)),
        }
    }

    fn format_binary(column: &ColumnHandle, value: &Value) -> Result<String> {
        match value {
            Value::Bytes(v) => Ok(BASE64.encode(v)),
            other => Err(unexpected(column, other)),
        }
    }

    fn format_opaque(column: &ColumnHandle, value: &Value) -> Result<String> {
        let payload = match value {
            Value::Opaque(v) | Value::Bytes(v) => v,
            other => return Err(unexpected(column, other)),
        };
        // Opaque columns always have an envelope kind by construction.
        let kind = OpaqueKind::for_type(column.type_code)
            .ok_or_else(|| unexpected(column, value))?;
        Ok(BASE64.encode(Envelope::new(kind, payload.clone()).encode()))
    }

    fn parse_bool(column: &ColumnHandle, text: &str) -> Result<Value> {
        match text {
            "true" | "TRUE" | "True" | "1" => Ok(Value::Bool(true)),
            "false" | "FALSE" | "False" | "0" => Ok(Value::Bool(false)),
            _ => Err(parse_err(column, text, "boolean")),
        }
    }

    fn decode_binary(column: &ColumnHandle, text: &str) -> Result<Vec<u8>> {
        BASE64
            .decode(text)
            .map_err(|e| FerryError::malformed(&column.name, format!("invalid base64: {}", e)))
    }
}

impl ValueFormat for DefaultValueFormat {
    fn get_value(&self, column: &ColumnHandle, value: &Value) -> Result<Option<String>> {
        let text = match column.type_code {
            SqlTypeCode::Bit | SqlTypeCode::Boolean => Self::format_bool(column, value)?,
            SqlTypeCode::TinyInt
            | SqlTypeCode::SmallInt
            | SqlTypeCode::Integer
            | SqlTypeCode::BigInt => Self::format_integer(column, value)?,
            SqlTypeCode::Float | SqlTypeCode::Real => match value {
                Value::F32(v) => v.to_string(),
                Value::F64(v) => v.to_string(),
                other => return Err(unexpected(column, other)),
            },
            SqlTypeCode::Double => match value {
                Value::F64(v) => v.to_string(),
                Value::F32(v) => v.to_string(),
                other => return Err(unexpected(column, other)),
            },
            SqlTypeCode::Numeric | SqlTypeCode::Decimal => match value {
                Value::Decimal(v) => v.to_string(),
                Value::I64(v) => v.to_string(),
                other => return Err(unexpected(column, other)),
            },
            SqlTypeCode::Char
            | SqlTypeCode::Varchar
            | SqlTypeCode::LongVarchar
            | SqlTypeCode::NChar
            | SqlTypeCode::NVarchar
            | SqlTypeCode::Clob
            | SqlTypeCode::NClob
            | SqlTypeCode::Xml
            | SqlTypeCode::Datalink => Self::format_text(column, value)?,
            SqlTypeCode::Binary
            | SqlTypeCode::Varbinary
            | SqlTypeCode::LongVarbinary
            | SqlTypeCode::Blob
            | SqlTypeCode::RowId => Self::format_binary(column, value)?,
            SqlTypeCode::Guid => match value {
                Value::Guid(v) => v.to_string(),
                Value::Text(v) => v.clone(),
                other => return Err(unexpected(column, other)),
            },
            SqlTypeCode::Other | SqlTypeCode::Struct | SqlTypeCode::Ref => {
                Self::format_opaque(column, value)?
            }
            // Temporal codes are normally handled by the registry's
            // overrides; format zone-naively when reached directly.
            SqlTypeCode::Date => match value {
                Value::Date(v) => v.format(DATE_FORMAT).to_string(),
                other => return Err(unexpected(column, other)),
            },
            SqlTypeCode::Time => match value {
                Value::Time(v) => v.format(TIME_FORMAT).to_string(),
                other => return Err(unexpected(column, other)),
            },
            SqlTypeCode::Timestamp | SqlTypeCode::TimestampTz => match value {
                Value::DateTime(v) => v.format(TIMESTAMP_FORMAT).to_string(),
                Value::DateTimeTz(v) => v.format(TIMESTAMP_TZ_FORMAT).to_string(),
                other => return Err(unexpected(column, other)),
            },
        };
        Ok(Some(text))
    }

    fn set_value(&self, column: &ColumnHandle, text: &str) -> Result<Value> {
        match column.type_code {
            SqlTypeCode::Bit | SqlTypeCode::Boolean => Self::parse_bool(column, text),
            SqlTypeCode::TinyInt | SqlTypeCode::SmallInt => text
                .parse::<i16>()
                .map(Value::I16)
                .map_err(|_| parse_err(column, text, "smallint")),
            SqlTypeCode::Integer => text
                .parse::<i32>()
                .map(Value::I32)
                .map_err(|_| parse_err(column, text, "integer")),
            SqlTypeCode::BigInt => {
                // Integral text is preferred; decimal text with a zero
                // fraction is accepted for engines that widen bigint.
                if let Ok(v) = text.parse::<i64>() {
                    return Ok(Value::I64(v));
                }
                let decimal = text
                    .parse::<Decimal>()
                    .map_err(|_| parse_err(column, text, "bigint"))?;
                if decimal.fract().is_zero() {
                    decimal
                        .to_i64()
                        .map(Value::I64)
                        .ok_or_else(|| parse_err(column, text, "bigint"))
                } else {
                    Err(parse_err(column, text, "bigint"))
                }
            }
            SqlTypeCode::Float | SqlTypeCode::Real => text
                .parse::<f32>()
                .map(Value::F32)
                .map_err(|_| parse_err(column, text, "real")),
            SqlTypeCode::Double => text
                .parse::<f64>()
                .map(Value::F64)
                .map_err(|_| parse_err(column, text, "double")),
            SqlTypeCode::Numeric | SqlTypeCode::Decimal => text
                .parse::<Decimal>()
                .map(Value::Decimal)
                .map_err(|_| parse_err(column, text, "decimal")),
            SqlTypeCode::Char
            | SqlTypeCode::Varchar
            | SqlTypeCode::LongVarchar
            | SqlTypeCode::NChar
            | SqlTypeCode::NVarchar
            | SqlTypeCode::Clob
            | SqlTypeCode::NClob
            | SqlTypeCode::Xml
            | SqlTypeCode::Datalink => Ok(Value::Text(text.to_string())),
            SqlTypeCode::Binary
            | SqlTypeCode::Varbinary
            | SqlTypeCode::LongVarbinary
            | SqlTypeCode::Blob
            | SqlTypeCode::RowId => Ok(Value::Bytes(Self::decode_binary(column, text)?)),
            SqlTypeCode::Guid => text
                .parse::<Uuid>()
                .map(Value::Guid)
                .map_err(|_| parse_err(column, text, "guid")),
            SqlTypeCode::Other | SqlTypeCode::Struct | SqlTypeCode::Ref => {
                let bytes = Self::decode_binary(column, text)?;
                let envelope = Envelope::decode(&column.name, &bytes)?;
                let expected = OpaqueKind::for_type(column.type_code);
                if expected != Some(envelope.kind) {
                    return Err(FerryError::malformed(
                        &column.name,
                        format!(
                            "envelope kind {:?} does not match {} column",
                            envelope.kind,
                            column.type_code.alias()
                        ),
                    ));
                }
                Ok(Value::Opaque(envelope.payload))
            }
            SqlTypeCode::Date => NaiveDate::parse_from_str(text, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|_| parse_err(column, text, "date")),
            SqlTypeCode::Time => NaiveTime::parse_from_str(text, TIME_FORMAT)
                .map(Value::Time)
                .map_err(|_| parse_err(column, text, "time")),
            SqlTypeCode::Timestamp => NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
                .map(Value::DateTime)
                .map_err(|_| parse_err(column, text, "timestamp")),
            SqlTypeCode::TimestampTz => DateTime::parse_from_str(text, TIMESTAMP_TZ_FORMAT)
                .map(Value::DateTimeTz)
                .map_err(|_| parse_err(column, text, "timestamptz")),
        }
    }
}

/// Temporal format honoring an optional job time zone.
///
/// With a zone configured, timestamps are rendered and parsed with an
/// explicit offset so the instant survives the trip; dates and times have
/// no instant to convert, so their wall value is rendered unchanged.
struct TemporalValueFormat {
    time_zone: Option<FixedOffset>,
}

impl ValueFormat for TemporalValueFormat {
    fn get_value(&self, column: &ColumnHandle, value: &Value) -> Result<Option<String>> {
        let text = match (value, column.type_code) {
            (Value::Date(v), _) => v.format(DATE_FORMAT).to_string(),
            (Value::Time(v), _) => v.format(TIME_FORMAT).to_string(),
            (Value::DateTime(v), _) => match self.time_zone {
                Some(offset) => offset
                    .from_local_datetime(v)
                    .single()
                    .ok_or_else(|| unexpected(column, value))?
                    .format(TIMESTAMP_TZ_FORMAT)
                    .to_string(),
                None => v.format(TIMESTAMP_FORMAT).to_string(),
            },
            (Value::DateTimeTz(v), _) => v.format(TIMESTAMP_TZ_FORMAT).to_string(),
            (other, _) => return Err(unexpected(column, other)),
        };
        Ok(Some(text))
    }

    fn set_value(&self, column: &ColumnHandle, text: &str) -> Result<Value> {
        match column.type_code {
            SqlTypeCode::Date => NaiveDate::parse_from_str(text, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|_| parse_err(column, text, "date")),
            SqlTypeCode::Time => NaiveTime::parse_from_str(text, TIME_FORMAT)
                .map(Value::Time)
                .map_err(|_| parse_err(column, text, "time")),
            SqlTypeCode::Timestamp => match self.time_zone {
                Some(offset) => DateTime::parse_from_str(text, TIMESTAMP_TZ_FORMAT)
                    .map(|dt| Value::DateTime(dt.with_timezone(&offset).naive_local()))
                    .map_err(|_| parse_err(column, text, "timestamp")),
                None => NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
                    .map(Value::DateTime)
                    .map_err(|_| parse_err(column, text, "timestamp")),
            },
            SqlTypeCode::TimestampTz => DateTime::parse_from_str(text, TIMESTAMP_TZ_FORMAT)
                .map(Value::DateTimeTz)
                .map_err(|_| parse_err(column, text, "timestamptz")),
            _ => DefaultValueFormat.set_value(column, text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn col(code: SqlTypeCode) -> ColumnHandle {
        ColumnHandle::new("c", code)
    }

    fn registry() -> ValueFormatRegistry {
        ValueFormatRegistry::new(None)
    }

    fn round_trip(code: SqlTypeCode, value: Value) {
        let registry = registry();
        let column = col(code);
        let text = registry.get_value(&column, &value).unwrap();
        let back = registry
            .set_value(&column, text.as_deref())
            .unwrap();
        assert_eq!(back, value, "round trip failed for {:?}", code);
    }

    #[test]
    fn test_round_trip_integers() {
        round_trip(SqlTypeCode::SmallInt, Value::I16(0));
        round_trip(SqlTypeCode::SmallInt, Value::I16(i16::MIN));
        round_trip(SqlTypeCode::Integer, Value::I32(-1));
        round_trip(SqlTypeCode::Integer, Value::I32(i32::MAX));
        round_trip(SqlTypeCode::BigInt, Value::I64(i64::MIN));
        round_trip(SqlTypeCode::BigInt, Value::I64(i64::MAX));
    }

    #[test]
    fn test_round_trip_floats_exact() {
        round_trip(SqlTypeCode::Real, Value::F32(0.1));
        round_trip(SqlTypeCode::Real, Value::F32(f32::MAX));
        round_trip(SqlTypeCode::Real, Value::F32(f32::MIN_POSITIVE));
        round_trip(SqlTypeCode::Double, Value::F64(-0.3333333333333333));
        round_trip(SqlTypeCode::Double, Value::F64(f64::MAX));
    }

    #[test]
    fn test_round_trip_decimal_text_guid() {
        round_trip(
            SqlTypeCode::Decimal,
            Value::Decimal("123456789.123456789".parse().unwrap()),
        );
        round_trip(SqlTypeCode::Varchar, Value::Text(String::new()));
        round_trip(SqlTypeCode::Varchar, Value::Text("héllo, wörld".into()));
        round_trip(
            SqlTypeCode::Guid,
            Value::Guid("6ba7b810-9dad-11d1-80b4-00c04fd430c8".parse().unwrap()),
        );
    }

    #[test]
    fn test_round_trip_binary_with_embedded_zeros() {
        round_trip(SqlTypeCode::Blob, Value::Bytes(vec![0, 1, 0, 255, 0]));
        round_trip(SqlTypeCode::Varbinary, Value::Bytes(Vec::new()));
    }

    #[test]
    fn test_round_trip_temporal_naive() {
        round_trip(
            SqlTypeCode::Date,
            Value::Date(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()),
        );
        round_trip(
            SqlTypeCode::Timestamp,
            Value::DateTime(
                NaiveDate::from_ymd_opt(2024, 2, 29)
                    .unwrap()
                    .and_hms_milli_opt(23, 59, 59, 125)
                    .unwrap(),
            ),
        );
    }

    #[test]
    fn test_timestamp_with_job_time_zone() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let registry = ValueFormatRegistry::new(Some(offset));
        let column = col(SqlTypeCode::Timestamp);
        let value = Value::DateTime(
            NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        );

        let text = registry.get_value(&column, &value).unwrap().unwrap();
        assert!(text.contains("+0200"), "offset missing in {:?}", text);

        let back = registry.set_value(&column, Some(&text)).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_null_and_empty_handling() {
        let registry = registry();
        assert_eq!(
            registry.set_value(&col(SqlTypeCode::Integer), None).unwrap(),
            Value::Null
        );
        // Empty text is NULL for non-text types...
        assert_eq!(
            registry
                .set_value(&col(SqlTypeCode::Integer), Some(""))
                .unwrap(),
            Value::Null
        );
        // ...but a value for text types.
        assert_eq!(
            registry
                .set_value(&col(SqlTypeCode::Varchar), Some(""))
                .unwrap(),
            Value::Text(String::new())
        );
        assert_eq!(
            registry
                .get_value(&col(SqlTypeCode::Varchar), &Value::Null)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_opaque_envelope_path() {
        let registry = registry();
        let column = col(SqlTypeCode::Struct);
        let value = Value::Opaque(vec![7, 0, 9]);

        let text = registry.get_value(&column, &value).unwrap().unwrap();
        let back = registry.set_value(&column, Some(&text)).unwrap();
        assert_eq!(back, value);

        // The same text must not parse as a different opaque kind.
        let other = col(SqlTypeCode::Ref);
        assert!(registry.set_value(&other, Some(&text)).is_err());
    }

    #[test]
    fn test_malformed_value_context() {
        let registry = registry();
        let err = registry
            .set_value(&col(SqlTypeCode::Integer), Some("not-a-number"))
            .unwrap_err();
        match err {
            FerryError::MalformedValue { column, .. } => assert_eq!(column, "c"),
            other => panic!("expected MalformedValue, got {:?}", other),
        }
    }

    #[test]
    fn test_bigint_accepts_integral_decimal_text() {
        let registry = registry();
        let column = col(SqlTypeCode::BigInt);
        assert_eq!(
            registry.set_value(&column, Some("42.000")).unwrap(),
            Value::I64(42)
        );
        assert!(registry.set_value(&column, Some("42.5")).is_err());
    }
}
