use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OpenFlags};
use uuid::Uuid;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{format_datetime, Value};
use crate::schema::coerce::coerce;
use crate::schema::column::ColumnType;

/// Arrays are stored as `,a,b,` so containment is a `LIKE '%,x,%'` test
pub const ARRAY_DELIMITER: char = ',';

/// Where pooled connections point to
#[derive(Debug, Clone)]
pub enum ConnectionTarget {
    File(PathBuf),
    /// Named in-process database shared by every connection opened on it
    Memory(String),
}

impl ConnectionTarget {
    pub fn file(path: impl AsRef<Path>) -> Self {
        ConnectionTarget::File(path.as_ref().to_path_buf())
    }

    pub fn memory() -> Self {
        ConnectionTarget::Memory(format!("file:/seldex-{}?vfs=memdb", Uuid::new_v4().simple()))
    }
}

pub fn open_connection(target: &ConnectionTarget, busy_timeout: Duration) -> Result<Connection> {
    let conn = match target {
        ConnectionTarget::File(path) => {
            let conn = Connection::open(path)?;
            conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
            conn
        }
        ConnectionTarget::Memory(uri) => Connection::open_with_flags(
            uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?,
    };
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

/// Run `f` with a statement deadline; overdue statements are interrupted
pub fn with_deadline<T>(
    conn: &Connection,
    timeout: Option<Duration>,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let timeout = match timeout {
        Some(timeout) => timeout,
        None => return f(conn),
    };

    let deadline = Instant::now() + timeout;
    conn.progress_handler(1_000, Some(move || Instant::now() >= deadline));
    let result = f(conn);
    conn.progress_handler(1_000, None::<fn() -> bool>);

    result.map_err(|err| {
        if err.kind == ErrorKind::Timeout {
            Error::new(
                ErrorKind::Timeout,
                format!("statement exceeded {}ms", timeout.as_millis()),
            )
        } else {
            err
        }
    })
}

/// Native encoding of an already coerced value
pub fn to_sql_value(value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Integer(*b as i64),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::DateTime(dt) => SqlValue::Text(format_datetime(dt)),
        Value::Json(json) => SqlValue::Text(json.to_string()),
        Value::Array(items) => SqlValue::Text(encode_array(items)?),
    })
}

pub fn encode_array(items: &[Value]) -> Result<String> {
    if items.is_empty() {
        return Ok(String::new());
    }

    let mut encoded = String::from(ARRAY_DELIMITER);
    for item in items {
        encoded.push_str(&array_element(item)?);
        encoded.push(ARRAY_DELIMITER);
    }
    Ok(encoded)
}

/// Text of one array element as it appears between delimiters
pub fn array_element(item: &Value) -> Result<String> {
    let text = item.to_text();
    if text.contains(ARRAY_DELIMITER) {
        return Err(Error::new(
            ErrorKind::InvalidValue,
            format!("array element '{}' contains the delimiter '{}'", text, ARRAY_DELIMITER),
        ));
    }
    Ok(text)
}

pub fn decode_array(text: &str, element: &ColumnType) -> Result<Value> {
    text.split(ARRAY_DELIMITER)
        .filter(|part| !part.is_empty())
        .map(|part| coerce(Value::Text(part.to_string()), element))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

/// Typed read using column metadata
pub fn from_sql_value(value: ValueRef<'_>, column_type: &ColumnType) -> Result<Value> {
    match (untyped(value), column_type) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Text(text), ColumnType::Array(element)) => decode_array(&text, element),
        (raw, column_type) => coerce(raw, column_type),
    }
}

/// Read without metadata (raw queries)
pub fn untyped(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Quote a table or column name
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrays_use_delimited_text() {
        let items = vec![Value::from("a"), Value::from("b")];
        assert_eq!(encode_array(&items).unwrap(), ",a,b,");
        assert_eq!(encode_array(&[]).unwrap(), "");
        assert!(encode_array(&[Value::from("a,b")]).is_err());

        let decoded = decode_array(",1,2,", &ColumnType::Integer).unwrap();
        assert_eq!(decoded, Value::Array(vec![Value::Integer(1), Value::Integer(2)]));
        assert_eq!(decode_array("", &ColumnType::Text).unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn typed_reads() {
        assert_eq!(
            from_sql_value(ValueRef::Integer(1), &ColumnType::Boolean).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            from_sql_value(ValueRef::Integer(3), &ColumnType::Decimal).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(from_sql_value(ValueRef::Null, &ColumnType::Integer).unwrap(), Value::Null);
        assert_eq!(
            from_sql_value(ValueRef::Text(b"{\"a\":1}"), &ColumnType::Json).unwrap(),
            Value::Json(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_identifier("qty"), "\"qty\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
