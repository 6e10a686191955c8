use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{format_datetime, Value};
use crate::schema::column::ColumnType;

/// Convert a value into the declared base type of a column.
///
/// The same rules apply to filter operands and to saved records, so `"10"`
/// against an integer column compares numerically.
pub fn coerce(value: Value, column_type: &ColumnType) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match column_type {
        ColumnType::Id | ColumnType::Text => Ok(Value::Text(value.to_text())),
        ColumnType::Varchar(size) => {
            let text = value.to_text();
            if text.chars().count() > *size {
                return Err(invalid(&value, column_type));
            }
            Ok(Value::Text(text))
        }
        ColumnType::Integer => to_integer(&value)
            .map(Value::Integer)
            .ok_or_else(|| invalid(&value, column_type)),
        ColumnType::Decimal => to_float(&value)
            .map(Value::Float)
            .ok_or_else(|| invalid(&value, column_type)),
        ColumnType::Money => to_float(&value)
            .map(|f| Value::Float((f * 100.0).round() / 100.0))
            .ok_or_else(|| invalid(&value, column_type)),
        ColumnType::Boolean => to_boolean(&value)
            .map(Value::Boolean)
            .ok_or_else(|| invalid(&value, column_type)),
        ColumnType::DateTime => to_datetime(&value)
            .map(Value::DateTime)
            .ok_or_else(|| invalid(&value, column_type)),
        ColumnType::Json => Ok(Value::Json(to_json(value))),
        ColumnType::Array(element) => {
            let items = match value {
                Value::Array(items) => items,
                Value::Text(text) => text
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::Text(s.to_string()))
                    .collect(),
                Value::Json(serde_json::Value::Array(items)) => {
                    items.into_iter().map(Value::Json).collect()
                }
                scalar => vec![scalar],
            };
            items
                .into_iter()
                .map(|item| coerce(unwrap_json_scalar(item), element))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
    }
}

/// Like [`coerce`], for the right-hand side of a filter.
///
/// A fractional bound against an integer column stays a float so that
/// `qty >= "10.5"` does not turn into `qty >= 10`.
pub fn coerce_operand(value: Value, column_type: &ColumnType) -> Result<Value> {
    if *column_type == ColumnType::Integer {
        if let Some(f) = fractional(&value) {
            return Ok(Value::Float(f));
        }
    }
    coerce(value, column_type)
}

fn fractional(value: &Value) -> Option<f64> {
    let f = match value {
        Value::Float(f) => *f,
        Value::Text(s) => {
            let s = s.trim();
            if s.parse::<i64>().is_ok() {
                return None;
            }
            s.parse::<f64>().ok()?
        }
        Value::Json(json) if json.as_i64().is_none() => json.as_f64()?,
        _ => return None,
    };
    (f.is_finite() && f.fract() != 0.0).then_some(f)
}

fn invalid(value: &Value, column_type: &ColumnType) -> Error {
    Error::new(
        ErrorKind::InvalidValue,
        format!("cannot convert '{}' to {}", value, column_type),
    )
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        Value::Boolean(b) => Some(*b as i64),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        Value::DateTime(dt) => Some(dt.timestamp()),
        Value::Json(json) => json.as_i64().or_else(|| json.as_f64().map(|f| f.trunc() as i64)),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        Value::Json(json) => json.as_f64(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn to_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Integer(i) => Some(*i != 0),
        Value::Float(f) => Some(*f != 0.0),
        Value::Text(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" | "t" => Some(true),
            "false" | "0" | "no" | "off" | "f" | "" => Some(false),
            _ => None,
        },
        Value::Json(json) => json.as_bool(),
        _ => None,
    }
}

fn to_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Integer(secs) => Utc.timestamp_opt(*secs, 0).single(),
        Value::Text(s) => parse_datetime(s.trim()),
        Value::Json(serde_json::Value::String(s)) => parse_datetime(s.trim()),
        _ => None,
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) and plain dates
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }
    None
}

fn to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Json(json) => json,
        Value::Text(text) => {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        }
        other => plain_json(&other),
    }
}

/// JSON rendering of a generic value (datetimes as fixed-width RFC 3339)
pub fn plain_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::DateTime(dt) => serde_json::Value::String(format_datetime(dt)),
        Value::Json(json) => json.clone(),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(plain_json).collect()),
    }
}

fn unwrap_json_scalar(value: Value) -> Value {
    match value {
        Value::Json(serde_json::Value::String(s)) => Value::Text(s),
        Value::Json(serde_json::Value::Bool(b)) => Value::Boolean(b),
        Value::Json(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        Value::Json(serde_json::Value::Null) => Value::Null,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_become_numbers() {
        assert_eq!(coerce("10".into(), &ColumnType::Integer).unwrap(), Value::Integer(10));
        assert_eq!(coerce(" 7.9 ".into(), &ColumnType::Integer).unwrap(), Value::Integer(7));
        assert_eq!(coerce("2.5".into(), &ColumnType::Decimal).unwrap(), Value::Float(2.5));
        assert_eq!(coerce("19.999".into(), &ColumnType::Money).unwrap(), Value::Float(20.0));
        assert_eq!(
            coerce("ten".into(), &ColumnType::Integer).unwrap_err().kind,
            ErrorKind::InvalidValue
        );
    }

    #[test]
    fn fractional_filter_bounds_keep_their_precision() {
        assert_eq!(coerce_operand("10.5".into(), &ColumnType::Integer).unwrap(), Value::Float(10.5));
        assert_eq!(coerce_operand(Value::Float(2.25), &ColumnType::Integer).unwrap(), Value::Float(2.25));
        assert_eq!(coerce_operand("10".into(), &ColumnType::Integer).unwrap(), Value::Integer(10));
        assert_eq!(coerce_operand("10.0".into(), &ColumnType::Integer).unwrap(), Value::Integer(10));
        assert_eq!(coerce_operand("10.5".into(), &ColumnType::Decimal).unwrap(), Value::Float(10.5));
        assert_eq!(
            coerce_operand("ten".into(), &ColumnType::Integer).unwrap_err().kind,
            ErrorKind::InvalidValue
        );
    }

    #[test]
    fn booleans_and_dates() {
        assert_eq!(coerce("yes".into(), &ColumnType::Boolean).unwrap(), Value::Boolean(true));
        assert_eq!(coerce(Value::Integer(0), &ColumnType::Boolean).unwrap(), Value::Boolean(false));
        assert!(coerce("maybe".into(), &ColumnType::Boolean).is_err());

        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(coerce("2024-03-01".into(), &ColumnType::DateTime).unwrap(), Value::DateTime(expected));
        assert_eq!(
            coerce("2024-03-01T00:00:00+00:00".into(), &ColumnType::DateTime).unwrap(),
            Value::DateTime(expected)
        );
    }

    #[test]
    fn varchar_limit_and_arrays() {
        assert!(coerce("abcdef".into(), &ColumnType::Varchar(3)).is_err());

        let tags = ColumnType::Array(Box::new(ColumnType::Integer));
        assert_eq!(
            coerce("1, 2,3".into(), &tags).unwrap(),
            Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
        assert_eq!(coerce(Value::Integer(5), &tags).unwrap(), Value::Array(vec![Value::Integer(5)]));
        assert_eq!(coerce(Value::Null, &tags).unwrap(), Value::Null);
    }
}
