//! Prepared statement ownership and execution.
//!
//! [`StatementHandle`] owns one compiled SQL program tied to one live
//! connection and exposes the positional bind/read primitives over it.
//! [`Statement`] wraps a handle in a mutex and runs complete step cycles
//! under that lock: bind, step, read, clear bindings, reset. The reset runs
//! on error paths too, so a failed cycle never leaves the program mid-row.
//!
//! Two threads targeting the same `Statement` serialize on its lock; threads
//! targeting different statements proceed in parallel (the connection handle
//! is opened in serialized mode, so interleaved engine calls are safe).

// FFI code needs to match C types exactly
#![allow(clippy::cast_possible_truncation)]

use std::ffi::{CString, c_int};
use std::ptr;
use std::sync::Mutex;

use serde::de::DeserializeOwned;

use docstore_core::{DisposedError, Error, JsonCodec, PrepareError, Result};

use crate::ffi;
use crate::status;

/// A positional statement argument.
///
/// The binder surface is deliberately restricted to the four setters the
/// document layer needs; everything a document operation binds is one of
/// these.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    Null,
    Int(i32),
    Int64(i64),
    Text(&'a str),
    Blob(&'a [u8]),
}

/// One compiled SQL program, exclusively owned, bound to one connection.
///
/// The `db` pointer is a non-owning back-reference used only for diagnostic
/// text retrieval; the handle never closes it.
pub struct StatementHandle {
    stmt: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
    sql: String,
}

// SAFETY: a sqlite3_stmt may be used from any thread as long as calls are
// not interleaved; Statement guards every use with its mutex, and the
// connection handle is opened in serialized (FULLMUTEX) mode.
unsafe impl Send for StatementHandle {}

impl StatementHandle {
    /// Compile `sql` against `db`.
    ///
    /// # Safety
    /// `db` must be a valid, open connection handle that outlives the
    /// returned statement.
    pub(crate) unsafe fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<Self> {
        let c_sql = CString::new(sql).map_err(|_| {
            Error::Prepare(PrepareError {
                sql: sql.to_string(),
                code: ffi::SQLITE_MISUSE,
                message: "SQL contains a null byte".to_string(),
            })
        })?;

        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: all pointers are valid; length covers the full SQL text
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut stmt,
                ptr::null_mut(),
            )
        };

        if rc != ffi::SQLITE_OK {
            // SAFETY: db is valid per this function's contract
            let message = unsafe { status::errmsg(db) };
            return Err(Error::Prepare(PrepareError {
                sql: sql.to_string(),
                code: rc,
                message,
            }));
        }

        Ok(Self {
            stmt,
            db,
            sql: sql.to_string(),
        })
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    fn live(&self) -> Result<()> {
        if self.stmt.is_null() {
            return Err(Error::Disposed(DisposedError { what: "statement" }));
        }
        Ok(())
    }

    /// Bind one argument at a 1-based index.
    fn bind(&mut self, index: c_int, arg: &Arg<'_>) -> Result<()> {
        self.live()?;
        // SAFETY: stmt is valid (checked above); buffers are copied by the
        // engine before the call returns (SQLITE_TRANSIENT)
        let rc = unsafe {
            match arg {
                Arg::Null => ffi::sqlite3_bind_null(self.stmt, index),
                Arg::Int(v) => ffi::sqlite3_bind_int(self.stmt, index, *v),
                Arg::Int64(v) => ffi::sqlite3_bind_int64(self.stmt, index, *v),
                Arg::Text(s) => ffi::sqlite3_bind_text(
                    self.stmt,
                    index,
                    s.as_ptr().cast(),
                    s.len() as c_int,
                    ffi::sqlite_transient(),
                ),
                Arg::Blob(b) => ffi::sqlite3_bind_blob(
                    self.stmt,
                    index,
                    b.as_ptr().cast(),
                    b.len() as c_int,
                    ffi::sqlite_transient(),
                ),
            }
        };
        if rc != ffi::SQLITE_OK {
            // SAFETY: db is a valid connection handle
            return Err(unsafe { status::translate(self.db, rc, Some(&self.sql)) });
        }
        Ok(())
    }

    /// One step of the program. Returns the raw status code; the executor
    /// decides which codes are acceptable.
    fn step(&mut self) -> c_int {
        // SAFETY: stmt is valid; the executor checks live() before stepping
        unsafe { ffi::sqlite3_step(self.stmt) }
    }

    fn clear_bindings(&mut self) {
        if !self.stmt.is_null() {
            // SAFETY: stmt is valid
            unsafe {
                ffi::sqlite3_clear_bindings(self.stmt);
            }
        }
    }

    fn reset(&mut self) {
        if !self.stmt.is_null() {
            // sqlite3_reset re-reports the last step error; that error has
            // already been translated, so the code is dropped here.
            // SAFETY: stmt is valid
            unsafe {
                ffi::sqlite3_reset(self.stmt);
            }
        }
    }

    /// Release the compiled program. Idempotent; after the first call every
    /// bind/step/read on this handle fails with a disposed error.
    pub(crate) fn finalize(&mut self) {
        if !self.stmt.is_null() {
            // SAFETY: stmt is valid and finalized exactly once (nulled below)
            unsafe {
                ffi::sqlite3_finalize(self.stmt);
            }
            self.stmt = ptr::null_mut();
        }
    }
}

impl Drop for StatementHandle {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// Read-only positional view over the current row of a stepped statement.
///
/// Column indices are 0-based. Only constructed by the executor while the
/// statement lock is held and the last step returned a row.
pub struct RowView<'a> {
    handle: &'a StatementHandle,
}

impl RowView<'_> {
    pub fn int(&self, index: i32) -> i32 {
        // SAFETY: handle is live and positioned on a row
        unsafe { ffi::sqlite3_column_int(self.handle.stmt, index) }
    }

    pub fn int64(&self, index: i32) -> i64 {
        // SAFETY: handle is live and positioned on a row
        unsafe { ffi::sqlite3_column_int64(self.handle.stmt, index) }
    }

    /// Text column, or `None` for SQL NULL.
    pub fn text(&self, index: i32) -> Option<String> {
        // SAFETY: handle is live and positioned on a row; the byte count is
        // read while the text pointer is still valid
        unsafe {
            let ptr = ffi::sqlite3_column_text(self.handle.stmt, index);
            if ptr.is_null() {
                return None;
            }
            let len = ffi::sqlite3_column_bytes(self.handle.stmt, index);
            let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
            Some(String::from_utf8_lossy(slice).into_owned())
        }
    }

    /// Blob column, or `None` for SQL NULL.
    pub fn blob(&self, index: i32) -> Option<Vec<u8>> {
        // SAFETY: handle is live and positioned on a row
        unsafe {
            let ptr = ffi::sqlite3_column_blob(self.handle.stmt, index);
            if ptr.is_null() {
                return None;
            }
            let len = ffi::sqlite3_column_bytes(self.handle.stmt, index);
            Some(std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize).to_vec())
        }
    }

    pub fn is_null(&self, index: i32) -> bool {
        // SAFETY: handle is live and positioned on a row
        unsafe { ffi::sqlite3_column_type(self.handle.stmt, index) == ffi::SQLITE_NULL }
    }

    /// Deserialize a JSON text column through the codec. SQL NULL decodes as
    /// JSON `null`.
    pub fn json<T: DeserializeOwned>(&self, index: i32, codec: &JsonCodec) -> Result<T> {
        match self.text(index) {
            Some(text) => codec.decode(&text),
            None => codec.decode("null"),
        }
    }
}

/// A cached, concurrently usable prepared statement.
///
/// Exactly one step cycle holds the lock at a time; callers on the same
/// statement serialize, callers on different statements do not block each
/// other.
pub struct Statement {
    inner: Mutex<StatementHandle>,
}

impl Statement {
    /// Compile `sql` against `db`.
    ///
    /// # Safety
    /// `db` must be a valid, open connection handle that outlives the
    /// returned statement.
    pub(crate) unsafe fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<Self> {
        // SAFETY: forwarded contract
        let handle = unsafe { StatementHandle::prepare(db, sql)? };
        Ok(Self {
            inner: Mutex::new(handle),
        })
    }

    /// Run one guarded step cycle. Bindings are cleared iff `args` is
    /// non-empty; the statement is always reset before the lock is released,
    /// error paths included.
    fn cycle<R>(
        &self,
        args: &[Arg<'_>],
        body: impl FnOnce(&mut StatementHandle) -> Result<R>,
    ) -> Result<R> {
        let mut handle = self.inner.lock().unwrap();
        handle.live()?;

        let result = (|| {
            for (i, arg) in args.iter().enumerate() {
                handle.bind((i + 1) as c_int, arg)?;
            }
            body(&mut handle)
        })();

        if !args.is_empty() {
            handle.clear_bindings();
        }
        handle.reset();
        result
    }

    /// Execute for effect: a single step where both "row available" and
    /// "done" count as success.
    pub fn run(&self, args: &[Arg<'_>]) -> Result<()> {
        self.cycle(args, |handle| {
            let rc = handle.step();
            if status::accepted(rc) {
                Ok(())
            } else {
                // SAFETY: db back-reference is valid while the handle lives
                Err(unsafe { status::translate(handle.db, rc, Some(&handle.sql)) })
            }
        })
    }

    /// Execute expecting at most one row. Returns `None` when the step
    /// reports done without producing a row.
    pub fn query_row<R>(
        &self,
        args: &[Arg<'_>],
        read: impl FnOnce(&RowView<'_>) -> Result<R>,
    ) -> Result<Option<R>> {
        self.cycle(args, |handle| {
            let rc = handle.step();
            if rc == ffi::SQLITE_ROW {
                read(&RowView { handle: &*handle }).map(Some)
            } else if status::accepted(rc) {
                Ok(None)
            } else {
                // SAFETY: db back-reference is valid while the handle lives
                Err(unsafe { status::translate(handle.db, rc, Some(&handle.sql)) })
            }
        })
    }

    /// Execute a cursor: step while rows are available, reading one `R` per
    /// row in engine order. The pass is not restartable; a later call
    /// re-executes from scratch because the cycle resets on exit.
    pub fn query_all<R>(
        &self,
        args: &[Arg<'_>],
        mut read: impl FnMut(&RowView<'_>) -> Result<R>,
    ) -> Result<Vec<R>> {
        self.cycle(args, |handle| {
            let mut rows = Vec::new();
            loop {
                let rc = handle.step();
                if rc == ffi::SQLITE_ROW {
                    rows.push(read(&RowView { handle: &*handle })?);
                } else if status::accepted(rc) {
                    return Ok(rows);
                } else {
                    // SAFETY: db back-reference is valid while the handle lives
                    return Err(unsafe { status::translate(handle.db, rc, Some(&handle.sql)) });
                }
            }
        })
    }

    /// The SQL this statement was compiled from.
    pub fn sql(&self) -> String {
        self.inner.lock().unwrap().sql().to_string()
    }

    /// Finalize the underlying handle. Idempotent; later executions fail
    /// with a disposed error. Blocks until any in-flight step cycle on this
    /// statement completes.
    pub(crate) fn finalize(&self) {
        self.inner.lock().unwrap().finalize();
    }
}
