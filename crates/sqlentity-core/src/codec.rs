//! Type codec: application values <-> storage representations.
//!
//! Storage forms per logical type:
//!
//! | Logical   | Storage                           |
//! |-----------|-----------------------------------|
//! | `string`  | `Text`                            |
//! | `number`  | `BigInt` / `Double` (finite only) |
//! | `boolean` | `Bool`                            |
//! | `date`    | `Text`, RFC 3339 with `Z` suffix  |
//! | `object`  | `Text`, JSON                      |
//! | `array`   | `Text`, JSON                      |
//!
//! `Null` maps to `Null` in both directions.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{Error, ErrorKind, Result};
use crate::types::LogicalType;
use crate::value::Value;

/// Convert an application value to its storage representation.
pub fn serialize(value: &Value, ty: LogicalType) -> Result<Value> {
    encode(value, ty, None)
}

/// Like [`serialize`], naming `field` in any validation error.
pub fn serialize_field(value: &Value, ty: LogicalType, field: &str) -> Result<Value> {
    encode(value, ty, Some(field))
}

/// Convert a storage value back into an application value.
///
/// Structured values that the driver already decoded are passed through.
pub fn deserialize(value: &Value, ty: LogicalType, field: &str) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match ty {
        LogicalType::String => Ok(match value {
            Value::Text(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }),
        LogicalType::Number => match value {
            Value::BigInt(_) | Value::Double(_) => Ok(value.clone()),
            Value::Text(s) => parse_number(s)
                .ok_or_else(|| mismatch(Some(field), ty, value)),
            _ => Err(mismatch(Some(field), ty, value)),
        },
        LogicalType::Boolean => {
            parse_bool(value).map(Value::Bool).ok_or_else(|| mismatch(Some(field), ty, value))
        }
        LogicalType::Date => to_timestamp(value)
            .map(Value::TimestampTz)
            .ok_or_else(|| invalid_date(Some(field), value)),
        LogicalType::Object | LogicalType::Array => match value {
            Value::Text(s) => serde_json::from_str::<serde_json::Value>(s)
                .map(Value::Json)
                .map_err(|e| {
                    Error::validation(field, format!("field '{field}' holds invalid JSON: {e}"))
                }),
            other => Ok(other.clone()),
        },
    }
}

/// Runtime type check used before any SQL is issued.
///
/// `Null` always passes; required-ness is the storage layer's concern.
pub fn validate_type(value: &Value, ty: LogicalType, field: &str) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    let ok = match ty {
        LogicalType::String => matches!(value, Value::Text(_)),
        LogicalType::Number => match value {
            Value::BigInt(_) => true,
            Value::Double(f) => f.is_finite(),
            Value::Text(s) => parse_number(s).is_some(),
            _ => false,
        },
        LogicalType::Boolean => matches!(value, Value::Bool(_)),
        LogicalType::Date => match value {
            Value::TimestampTz(_) => true,
            Value::Text(s) => parse_date(s).is_some(),
            _ => false,
        },
        LogicalType::Object => match value {
            Value::Json(j) => j.is_object(),
            Value::Text(s) => serde_json::from_str::<serde_json::Value>(s).is_ok_and(|j| j.is_object()),
            _ => false,
        },
        LogicalType::Array => match value {
            Value::Json(j) => j.is_array(),
            Value::Text(s) => serde_json::from_str::<serde_json::Value>(s).is_ok_and(|j| j.is_array()),
            _ => false,
        },
    };
    if ok {
        Ok(())
    } else {
        Err(mismatch(Some(field), ty, value))
    }
}

/// Parse a date from any accepted textual form.
///
/// Accepted: RFC 3339, `YYYY-MM-DD HH:MM:SS[.f][±HH[:MM]]`, naive date-times
/// (taken as UTC) and plain `YYYY-MM-DD` (midnight UTC).
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Canonical text form of a date.
pub fn format_date(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn encode(value: &Value, ty: LogicalType, field: Option<&str>) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match ty {
        LogicalType::String => Ok(match value {
            Value::Text(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }),
        LogicalType::Number => match value {
            Value::BigInt(_) => Ok(value.clone()),
            Value::Double(f) if f.is_finite() => Ok(value.clone()),
            Value::Double(f) => Err(validation(
                field,
                format!("{} must be a finite number, got {f}", describe(field)),
            )),
            Value::Text(s) => parse_number(s).ok_or_else(|| mismatch(field, ty, value)),
            _ => Err(mismatch(field, ty, value)),
        },
        LogicalType::Boolean => parse_bool(value)
            .map(Value::Bool)
            .ok_or_else(|| mismatch(field, ty, value)),
        LogicalType::Date => to_timestamp(value)
            .map(|ts| Value::Text(format_date(&ts)))
            .ok_or_else(|| invalid_date(field, value)),
        LogicalType::Object | LogicalType::Array => {
            let json = match value {
                Value::Json(j) => j.clone(),
                Value::Text(s) => serde_json::from_str(s).map_err(|_| mismatch(field, ty, value))?,
                _ => return Err(mismatch(field, ty, value)),
            };
            let shape_ok = if ty == LogicalType::Object { json.is_object() } else { json.is_array() };
            if shape_ok {
                Ok(Value::Text(json.to_string()))
            } else {
                Err(mismatch(field, ty, value))
            }
        }
    }
}

fn to_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::TimestampTz(ts) => Some(*ts),
        Value::Text(s) => parse_date(s),
        Value::BigInt(ms) => DateTime::from_timestamp_millis(*ms),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::BigInt(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Double)
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::BigInt(1) => Some(true),
        Value::BigInt(0) => Some(false),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(true),
            "false" | "f" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn describe(field: Option<&str>) -> String {
    field.map_or_else(|| "value".to_string(), |f| format!("field '{f}'"))
}

fn validation(field: Option<&str>, message: String) -> Error {
    match field {
        Some(f) => Error::validation(f, message),
        None => Error::new(ErrorKind::Validation, message),
    }
}

fn mismatch(field: Option<&str>, ty: LogicalType, value: &Value) -> Error {
    let mut err = validation(
        field,
        format!("{} expected {ty}, got {}", describe(field), value.type_name()),
    );
    err.details_mut().expected_type = Some(ty.to_string());
    err
}

fn invalid_date(field: Option<&str>, value: &Value) -> Error {
    let mut err = validation(field, format!("{} is not a valid date: {value}", describe(field)));
    err.details_mut().expected_type = Some(LogicalType::Date.to_string());
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_null_maps_to_null_both_ways() {
        for ty in [
            LogicalType::String,
            LogicalType::Number,
            LogicalType::Boolean,
            LogicalType::Date,
            LogicalType::Object,
            LogicalType::Array,
        ] {
            assert_eq!(serialize(&Value::Null, ty).unwrap(), Value::Null);
            assert_eq!(deserialize(&Value::Null, ty, "f").unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_date_serializes_to_iso_text() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(
            serialize(&Value::TimestampTz(ts), LogicalType::Date).unwrap(),
            Value::Text("2024-05-06T07:08:09Z".into())
        );
    }

    #[test]
    fn test_date_deserializes_accepted_forms_to_same_instant() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        for raw in [
            "2024-05-06T07:08:09Z",
            "2024-05-06T09:08:09+02:00",
            "2024-05-06 07:08:09",
            "2024-05-06 07:08:09+00",
            "2024-05-06T07:08:09",
        ] {
            let got = deserialize(&Value::Text(raw.into()), LogicalType::Date, "at").unwrap();
            assert_eq!(got, Value::TimestampTz(expected), "input {raw}");
        }
        let midnight = deserialize(&Value::Text("2024-05-06".into()), LogicalType::Date, "at").unwrap();
        assert_eq!(
            midnight,
            Value::TimestampTz(Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_invalid_date_is_validation_naming_field() {
        let err = serialize_field(&Value::Text("not a date".into()), LogicalType::Date, "installed_at")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.details().field.as_deref(), Some("installed_at"));

        let err = deserialize(&Value::Bool(true), LogicalType::Date, "installed_at").unwrap_err();
        assert_eq!(err.details().field.as_deref(), Some("installed_at"));
    }

    #[test]
    fn test_epoch_millis_date() {
        let got = serialize(&Value::BigInt(0), LogicalType::Date).unwrap();
        assert_eq!(got, Value::Text("1970-01-01T00:00:00Z".into()));
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = serialize(&Value::Double(f), LogicalType::Number).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn test_numeric_text_deserializes_to_number() {
        assert_eq!(
            deserialize(&Value::Text("42".into()), LogicalType::Number, "n").unwrap(),
            Value::BigInt(42)
        );
        assert_eq!(
            deserialize(&Value::Text("12.50".into()), LogicalType::Number, "n").unwrap(),
            Value::Double(12.5)
        );
        assert!(deserialize(&Value::Text("twelve".into()), LogicalType::Number, "n").is_err());
    }

    #[test]
    fn test_boolean_storage_encodings() {
        for truthy in [Value::Bool(true), Value::Text("t".into()), Value::BigInt(1), Value::Text("TRUE".into())] {
            assert_eq!(deserialize(&truthy, LogicalType::Boolean, "b").unwrap(), Value::Bool(true));
        }
        for falsy in [Value::Bool(false), Value::Text("f".into()), Value::BigInt(0)] {
            assert_eq!(deserialize(&falsy, LogicalType::Boolean, "b").unwrap(), Value::Bool(false));
        }
        assert!(deserialize(&Value::BigInt(2), LogicalType::Boolean, "b").is_err());
    }

    #[test]
    fn test_object_round_trip_preserves_nested_structure() {
        let original = Value::Json(json!({"a": [1, {"b": null}], "c": {"d": "e"}}));
        let stored = serialize(&original, LogicalType::Object).unwrap();
        assert!(matches!(stored, Value::Text(_)));
        assert_eq!(deserialize(&stored, LogicalType::Object, "o").unwrap(), original);
    }

    #[test]
    fn test_structured_passthrough_when_driver_decoded() {
        let decoded = Value::Json(json!([1, 2, 3]));
        assert_eq!(deserialize(&decoded, LogicalType::Array, "a").unwrap(), decoded);
    }

    #[test]
    fn test_object_shape_enforced_on_serialize() {
        assert!(serialize(&Value::Json(json!([1])), LogicalType::Object).is_err());
        assert!(serialize(&Value::Json(json!({"a": 1})), LogicalType::Array).is_err());
    }

    #[test]
    fn test_validate_type_rules() {
        assert!(validate_type(&Value::Null, LogicalType::Boolean, "x").is_ok());
        assert!(validate_type(&Value::Text("3.5".into()), LogicalType::Number, "x").is_ok());
        assert!(validate_type(&Value::Text("abc".into()), LogicalType::Number, "x").is_err());
        assert!(validate_type(&Value::BigInt(1), LogicalType::String, "x").is_err());
        assert!(validate_type(&Value::Text("true".into()), LogicalType::Boolean, "x").is_err());
        assert!(validate_type(&Value::Text("2024-01-01".into()), LogicalType::Date, "x").is_ok());
        assert!(validate_type(&Value::Text("{\"a\":1}".into()), LogicalType::Object, "x").is_ok());
        assert!(validate_type(&Value::Text("[1]".into()), LogicalType::Object, "x").is_err());

        let err = validate_type(&Value::Bool(true), LogicalType::Number, "reading").unwrap_err();
        assert_eq!(err.details().field.as_deref(), Some("reading"));
        assert_eq!(err.details().expected_type.as_deref(), Some("number"));
    }
}
