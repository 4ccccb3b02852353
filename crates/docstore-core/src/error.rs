//! Error types for docstore operations.

use std::fmt;

/// The primary error type for all docstore operations.
#[derive(Debug)]
pub enum Error {
    /// The backing database file could not be created or opened.
    Open(OpenError),
    /// SQL text failed to compile against the current schema.
    ///
    /// A prepare failure is an implementation bug (the library generates all
    /// SQL it prepares), not a user-data problem.
    Prepare(PrepareError),
    /// The engine rejected an operation with a non-success status code.
    Engine(EngineError),
    /// A unique index or identity collision on insert.
    Constraint(ConstraintError),
    /// A find-style lookup matched zero rows.
    KeyNotFound(KeyNotFoundError),
    /// An operation was invoked on a disposed connection, table, or statement.
    Disposed(DisposedError),
    /// Document serialization or deserialization failed.
    Codec(CodecError),
}

/// Failure while opening the backing database file.
#[derive(Debug)]
pub struct OpenError {
    /// The path that was passed to the engine.
    pub path: String,
    /// Engine status code, if the engine got far enough to produce one.
    pub code: i32,
    /// Engine diagnostic text.
    pub message: String,
}

/// Failure while compiling SQL into a prepared statement.
#[derive(Debug)]
pub struct PrepareError {
    /// The SQL text that failed to compile.
    pub sql: String,
    /// Engine status code.
    pub code: i32,
    /// Engine diagnostic text.
    pub message: String,
}

/// A non-success status from the engine outside the prepare path.
#[derive(Debug)]
pub struct EngineError {
    pub kind: EngineErrorKind,
    /// Raw engine status code.
    pub code: i32,
    /// The SQL of the statement being executed, when known.
    pub sql: Option<String>,
    /// Engine diagnostic text.
    pub message: String,
}

/// Coarse classification of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Another connection holds a conflicting lock.
    Busy,
    /// The database or a table is write-locked within this process.
    Locked,
    /// Write attempted on a read-only database.
    ReadOnly,
    /// Disk I/O failure.
    Io,
    /// The database image is malformed.
    Corrupt,
    /// The API was used out of sequence.
    Misuse,
    /// Any other non-success status.
    Other,
}

/// Unique index or identity collision.
#[derive(Debug)]
pub struct ConstraintError {
    /// Raw engine status code.
    pub code: i32,
    /// The SQL of the statement being executed, when known.
    pub sql: Option<String>,
    /// Engine diagnostic text.
    pub message: String,
}

/// A keyed lookup found no matching document.
#[derive(Debug)]
pub struct KeyNotFoundError {
    /// Table the lookup ran against.
    pub table: String,
    /// JSON path the key was matched on.
    pub path: String,
    /// Serialized form of the key that was looked up.
    pub key: String,
}

/// Operation on an already-disposed resource.
#[derive(Debug)]
pub struct DisposedError {
    /// What was disposed: "connection", "table", or "statement".
    pub what: &'static str,
}

/// Serialization or deserialization failure, bridged from serde_json.
#[derive(Debug)]
pub struct CodecError {
    /// What was being encoded or decoded.
    pub context: &'static str,
    pub source: serde_json::Error,
}

impl Error {
    /// Is this a unique-index or identity collision?
    pub fn is_constraint(&self) -> bool {
        matches!(self, Error::Constraint(_))
    }

    /// Is this a zero-rows lookup failure?
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_))
    }

    /// Was the target of the operation already disposed?
    pub fn is_disposed(&self) -> bool {
        matches!(self, Error::Disposed(_))
    }

    /// The SQL that caused this error, if available.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Prepare(e) => Some(&e.sql),
            Error::Engine(e) => e.sql.as_deref(),
            Error::Constraint(e) => e.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Open(e) => write!(f, "cannot open database at '{}': {}", e.path, e.message),
            Error::Prepare(e) => write!(f, "cannot prepare '{}': {}", e.sql, e.message),
            Error::Engine(e) => match &e.sql {
                Some(sql) => write!(f, "engine error (code {}) in '{}': {}", e.code, sql, e.message),
                None => write!(f, "engine error (code {}): {}", e.code, e.message),
            },
            Error::Constraint(e) => write!(f, "constraint violation: {}", e.message),
            Error::KeyNotFound(e) => write!(
                f,
                "no document in '{}' with {} = {}",
                e.table, e.path, e.key
            ),
            Error::Disposed(e) => write!(f, "operation on disposed {}", e.what),
            Error::Codec(e) => write!(f, "codec failure while {}: {}", e.context, e.source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Codec(e) => Some(&e.source),
            _ => None,
        }
    }
}

impl From<OpenError> for Error {
    fn from(err: OpenError) -> Self {
        Error::Open(err)
    }
}

impl From<PrepareError> for Error {
    fn from(err: PrepareError) -> Self {
        Error::Prepare(err)
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Error::Engine(err)
    }
}

impl From<ConstraintError> for Error {
    fn from(err: ConstraintError) -> Self {
        Error::Constraint(err)
    }
}

impl From<KeyNotFoundError> for Error {
    fn from(err: KeyNotFoundError) -> Self {
        Error::KeyNotFound(err)
    }
}

impl From<DisposedError> for Error {
    fn from(err: DisposedError) -> Self {
        Error::Disposed(err)
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        Error::Codec(err)
    }
}

/// Result type alias for docstore operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_helpers() {
        let constraint = Error::Constraint(ConstraintError {
            code: 19,
            sql: Some("INSERT INTO t (documents) VALUES (json(?1))".to_string()),
            message: "UNIQUE constraint failed".to_string(),
        });
        assert!(constraint.is_constraint());
        assert!(!constraint.is_not_found());
        assert_eq!(
            constraint.sql(),
            Some("INSERT INTO t (documents) VALUES (json(?1))")
        );

        let missing = Error::KeyNotFound(KeyNotFoundError {
            table: "users".to_string(),
            path: "$.id".to_string(),
            key: "42".to_string(),
        });
        assert!(missing.is_not_found());
        assert!(missing.sql().is_none());
    }

    #[test]
    fn display_carries_context() {
        let err = Error::Disposed(DisposedError { what: "table" });
        assert_eq!(err.to_string(), "operation on disposed table");

        let err = Error::KeyNotFound(KeyNotFoundError {
            table: "users".to_string(),
            path: "$.id".to_string(),
            key: "\"abc\"".to_string(),
        });
        assert!(err.to_string().contains("users"));
        assert!(err.to_string().contains("$.id"));
    }

    #[test]
    fn codec_error_exposes_source() {
        let source = serde_json::from_str::<i64>("not json").unwrap_err();
        let err = Error::Codec(CodecError {
            context: "deserializing document",
            source,
        });
        assert!(std::error::Error::source(&err).is_some());
    }
}
