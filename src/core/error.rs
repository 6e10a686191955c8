use std::fmt;
use rusqlite::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownColumn,
    UnsupportedOperator,
    InvalidOperatorForType,
    InvalidValue,
    InvalidSubquery,
    CompileError,
    TransactionAlreadyExists,
    UnknownTransaction,
    ConnectionExhausted,
    Timeout,
    NativeQueryError,
    UnknownCollection,
    CollectionAlreadyExists,
    NotFound,
    InvalidArgument,
    Unsupported,
    Io,
    Parse,
    Internal,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn unknown_column(collection: &str, column: &str) -> Self {
        Error::new(
            ErrorKind::UnknownColumn,
            format!("collection '{}' has no column '{}'", collection, column),
        )
    }

    pub fn unknown_transaction(id: &str) -> Self {
        Error::new(ErrorKind::UnknownTransaction, format!("no open transaction '{}'", id))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        // The progress handler aborts overdue statements with SQLITE_INTERRUPT
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            if failure.code == ErrorCode::OperationInterrupted {
                return Error {
                    kind: ErrorKind::Timeout,
                    context: format!("statement interrupted: {}", err),
                };
            }
        }

        Error {
            kind: ErrorKind::NativeQueryError,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("invalid configuration: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
