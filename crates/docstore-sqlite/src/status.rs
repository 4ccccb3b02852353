//! Translation of engine status codes into the docstore error taxonomy.
//!
//! All status inspection funnels through here: the executor for step-cycle
//! failures, and the connection/table setup paths for open, exec, and
//! prepare failures. `SQLITE_OK`, `SQLITE_ROW`, and `SQLITE_DONE` are never
//! surfaced as errors.

use std::ffi::{CStr, c_int};

use docstore_core::{ConstraintError, EngineError, EngineErrorKind, Error};

use crate::ffi;

/// Is this one of the three success statuses?
pub(crate) fn accepted(code: c_int) -> bool {
    matches!(
        code & 0xff,
        ffi::SQLITE_OK | ffi::SQLITE_ROW | ffi::SQLITE_DONE
    )
}

/// Read the connection's current diagnostic text.
///
/// # Safety
/// `db` must be a valid, open connection handle.
pub(crate) unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    if db.is_null() {
        return "no connection".to_string();
    }
    // SAFETY: db is valid per the caller's contract; errmsg returns a valid
    // C string owned by the connection.
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Translate a non-success status into a typed failure, carrying the
/// engine's own diagnostic text and the SQL being executed.
///
/// # Safety
/// `db` must be a valid, open connection handle (or null, in which case the
/// static error string for `code` is used instead).
pub(crate) unsafe fn translate(db: *mut ffi::sqlite3, code: c_int, sql: Option<&str>) -> Error {
    let message = if db.is_null() {
        ffi::error_string(code).to_string()
    } else {
        // SAFETY: db is valid per the caller's contract
        unsafe { errmsg(db) }
    };
    from_parts(code, sql, message)
}

/// Classify a non-success status when the diagnostic text is already in
/// hand (e.g. captured from `sqlite3_exec`'s errmsg out-parameter).
pub(crate) fn from_parts(code: c_int, sql: Option<&str>, message: String) -> Error {
    if code & 0xff == ffi::SQLITE_CONSTRAINT {
        return Error::Constraint(ConstraintError {
            code,
            sql: sql.map(str::to_string),
            message,
        });
    }

    Error::Engine(EngineError {
        kind: kind_of(code),
        code,
        sql: sql.map(str::to_string),
        message,
    })
}

fn kind_of(code: c_int) -> EngineErrorKind {
    match code & 0xff {
        ffi::SQLITE_BUSY => EngineErrorKind::Busy,
        ffi::SQLITE_LOCKED => EngineErrorKind::Locked,
        ffi::SQLITE_READONLY => EngineErrorKind::ReadOnly,
        ffi::SQLITE_IOERR => EngineErrorKind::Io,
        ffi::SQLITE_CORRUPT => EngineErrorKind::Corrupt,
        ffi::SQLITE_MISUSE => EngineErrorKind::Misuse,
        _ => EngineErrorKind::Other,
    }
}
