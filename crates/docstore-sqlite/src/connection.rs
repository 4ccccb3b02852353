//! Connection ownership and lifecycle.
//!
//! A [`Connection`] exclusively owns the engine handle, the registry of live
//! [`Table`]s, and the connection-scoped metadata statements. Teardown is
//! top-down: dispose cascades to every registered table (finalizing its
//! cached statements), folds the write-ahead log back into the main file,
//! then closes the handle. After disposal every public operation fails fast;
//! the handle is never resurrected.

// FFI code needs to match C types exactly
#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;
use std::ffi::{CString, c_char, c_int};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use docstore_core::{
    CodecConfig, DisposedError, Error, JsonCodec, NamingConvention, OpenError, Result,
};

use crate::ffi;
use crate::statement::{Arg, Statement};
use crate::status;
use crate::table::{Table, TableOptions};

/// Run the engine's process-wide bootstrap exactly once, before the first
/// handle is opened. Teardown (`sqlite3_shutdown`) is left to the host
/// application.
pub(crate) fn initialize_engine() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // SAFETY: sqlite3_initialize is safe to call from any thread; Once
        // guarantees a single invocation
        let rc = unsafe { ffi::sqlite3_initialize() };
        if rc != ffi::SQLITE_OK {
            tracing::warn!(code = rc, "sqlite3_initialize reported failure");
        }
    });
}

/// Configuration for opening a connection.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    /// Open for reading only.
    pub read_only: bool,
    /// Put the database in write-ahead-log mode at open.
    pub wal: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Document codec configuration. Fixed for the connection's lifetime:
    /// cached statements capture it implicitly through the codec calls they
    /// make.
    pub codec: CodecConfig,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            read_only: false,
            wal: true,
            busy_timeout_ms: 5000,
            codec: CodecConfig::default(),
        }
    }
}

impl SqliteConfig {
    /// Config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Open read-only (the file must exist).
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Stay on the rollback journal instead of WAL.
    pub fn no_wal(mut self) -> Self {
        self.wal = false;
        self
    }

    /// Set the busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Set the codec configuration.
    pub fn codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    /// Set the key-path naming convention.
    pub fn naming(mut self, naming: NamingConvention) -> Self {
        self.codec.naming = naming;
        self
    }
}

/// Shared connection state. Owned by [`Connection`]; tables hold a `Weak`
/// back-reference for deregistration only.
pub(crate) struct ConnectionInner {
    db: *mut ffi::sqlite3,
    path: String,
    wal: bool,
    codec: JsonCodec,
    disposed: AtomicBool,
    tables: Mutex<HashMap<String, Arc<Table>>>,
    table_exists_stmt: Mutex<Option<Arc<Statement>>>,
}

// SAFETY: the handle is opened with SQLITE_OPEN_FULLMUTEX (serialized mode),
// so engine calls may come from any thread; all other state is behind
// mutexes or atomics.
unsafe impl Send for ConnectionInner {}
unsafe impl Sync for ConnectionInner {}

impl ConnectionInner {
    pub(crate) fn db(&self) -> *mut ffi::sqlite3 {
        self.db
    }

    pub(crate) fn codec(&self) -> &JsonCodec {
        &self.codec
    }

    /// Fail fast once the connection is disposed.
    pub(crate) fn live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed(DisposedError { what: "connection" }));
        }
        Ok(())
    }

    /// Drop a table from the registry. Called by `Table::dispose`; missing
    /// entries are fine (the registry is drained first during cascade
    /// teardown).
    pub(crate) fn forget(&self, name: &str) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.remove(name);
        }
    }

    /// One-shot execution for DDL and pragmas. Does not check the disposed
    /// flag; public entry points do that first, and the teardown path uses
    /// this after the flag is already set.
    pub(crate) fn exec(&self, sql: &str) -> Result<()> {
        let c_sql = CString::new(sql).map_err(|_| {
            status::from_parts(
                ffi::SQLITE_MISUSE,
                Some(sql),
                "SQL contains a null byte".to_string(),
            )
        })?;

        let mut errmsg: *mut c_char = ptr::null_mut();
        // SAFETY: db is open for the lifetime of self; pointers are valid
        let rc = unsafe {
            ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != ffi::SQLITE_OK {
            let message = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg is a valid C string allocated by the engine
                unsafe {
                    let msg = std::ffi::CStr::from_ptr(errmsg)
                        .to_string_lossy()
                        .into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            return Err(status::from_parts(rc, Some(sql), message));
        }

        Ok(())
    }

    /// Fold the write-ahead log into the main file.
    fn checkpoint_truncate(&self) -> Result<()> {
        // SAFETY: db is open; null out-parameters are permitted
        let rc = unsafe {
            ffi::sqlite3_wal_checkpoint_v2(
                self.db,
                ptr::null(),
                ffi::SQLITE_CHECKPOINT_TRUNCATE,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if status::accepted(rc) {
            Ok(())
        } else {
            // SAFETY: db is open
            Err(unsafe { status::translate(self.db, rc, None) })
        }
    }

    /// Lazily prepare the connection-scoped "table exists" statement.
    fn table_exists_statement(&self) -> Result<Arc<Statement>> {
        let mut slot = self.table_exists_stmt.lock().unwrap();
        if let Some(stmt) = &*slot {
            return Ok(Arc::clone(stmt));
        }
        // SAFETY: db outlives the statement; both are torn down together
        let stmt = Arc::new(unsafe {
            Statement::prepare(
                self.db,
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            )?
        });
        *slot = Some(Arc::clone(&stmt));
        Ok(stmt)
    }

    /// Cascade teardown: tables first, then WAL fold, then the handle.
    /// Idempotent.
    fn teardown(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Drain under the lock, dispose outside it: Table::dispose calls
        // back into forget(), which takes the same lock.
        let tables: Vec<Arc<Table>> = match self.tables.lock() {
            Ok(mut map) => map.drain().map(|(_, t)| t).collect(),
            Err(_) => Vec::new(),
        };
        for table in tables {
            table.dispose();
        }

        if let Ok(mut slot) = self.table_exists_stmt.lock() {
            if let Some(stmt) = slot.take() {
                stmt.finalize();
            }
        }

        if self.wal {
            let _ = self.checkpoint_truncate();
        }

        // SAFETY: db was opened by us and is closed exactly once (the
        // disposed flag was claimed above); close_v2 defers if a statement
        // somehow remains un-finalized.
        unsafe {
            ffi::sqlite3_close_v2(self.db);
        }
        tracing::debug!(path = %self.path, "connection closed");
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// A connection to a document database.
///
/// Thread-safe: the engine handle is opened in serialized mode, tables and
/// statements guard their own state.
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Open a database with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        initialize_engine();

        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Open(OpenError {
                path: config.path.clone(),
                code: ffi::SQLITE_MISUSE,
                message: "path contains a null byte".to_string(),
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let mut flags = ffi::SQLITE_OPEN_FULLMUTEX;
        if config.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        } else {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        // SAFETY: pointers are valid; the return code is checked
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: a failed open can still return a handle carrying
                // the diagnostic; it must be closed here
                unsafe {
                    let msg = status::errmsg(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };
            return Err(Error::Open(OpenError {
                path: config.path.clone(),
                code: rc,
                message,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is open
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        let inner = Arc::new(ConnectionInner {
            db,
            path: config.path.clone(),
            wal: config.wal,
            codec: JsonCodec::new(config.codec),
            disposed: AtomicBool::new(false),
            tables: Mutex::new(HashMap::new()),
            table_exists_stmt: Mutex::new(None),
        });

        if config.wal {
            // On failure the Arc drops here and ConnectionInner::drop closes
            // the handle.
            inner.exec("PRAGMA journal_mode=WAL")?;
        }

        tracing::debug!(path = %config.path, version = ffi::version(), "connection opened");
        Ok(Self { inner })
    }

    /// Open a file-based database with default configuration.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// The database path this connection was opened on.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// The SQLite library version string.
    pub fn version(&self) -> &'static str {
        ffi::version()
    }

    /// The connection's document codec.
    pub fn codec(&self) -> &JsonCodec {
        self.inner.codec()
    }

    /// Get or create the table `name` with the default (single-column)
    /// layout. Idempotent: the same name yields the same instance for the
    /// life of the connection.
    pub fn get_table(&self, name: &str) -> Result<Arc<Table>> {
        self.get_table_with(name, TableOptions::default())
    }

    /// Get or create the table `name`. The backing table is created if
    /// absent (`CREATE TABLE IF NOT EXISTS`). If a table of this name is
    /// already registered, the existing instance is returned and `options`
    /// is ignored.
    pub fn get_table_with(&self, name: &str, options: TableOptions) -> Result<Arc<Table>> {
        self.inner.live()?;

        let mut tables = self.inner.tables.lock().unwrap();
        if let Some(existing) = tables.get(name) {
            return Ok(Arc::clone(existing));
        }

        self.inner.exec(&Table::create_sql(name, &options))?;
        let table = Arc::new(Table::new(name, &options, &self.inner));
        tables.insert(name.to_string(), Arc::clone(&table));
        tracing::debug!(table = %name, "table attached");
        Ok(table)
    }

    /// Does a physical table of this name exist?
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        self.inner.live()?;
        let stmt = self.inner.table_exists_statement()?;
        let count = stmt.query_row(&[Arg::Text(name)], |row| Ok(row.int64(0)))?;
        Ok(count.is_some_and(|n| n > 0))
    }

    /// Create the backing table for `name` (idempotent DDL) without
    /// registering a wrapper.
    pub fn create_table(&self, name: &str) -> Result<()> {
        self.inner.live()?;
        self.inner.exec(&Table::create_sql(name, &TableOptions::default()))
    }

    /// Drop the backing table for `name`.
    ///
    /// A live [`Table`] wrapper over this name is NOT invalidated: its
    /// cached statements still reference the dropped schema and must not be
    /// used afterwards. Dispose the wrapper before dropping its store.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.inner.live()?;
        let sql = format!("DROP TABLE IF EXISTS {}", docstore_core::quote_ident(name));
        tracing::debug!(table = %name, "dropping table");
        self.inner.exec(&sql)
    }

    /// Drop and recreate the backing table for `name`. The same wrapper
    /// hazard as [`Connection::drop_table`] applies.
    pub fn drop_and_create_table(&self, name: &str) -> Result<()> {
        self.drop_table(name)?;
        self.create_table(name)
    }

    /// Fold the write-ahead log into the main file and remove both side
    /// files, leaving the connection usable. A no-op when the connection
    /// was opened without WAL.
    pub fn checkpoint(&self) -> Result<()> {
        self.inner.live()?;
        if !self.inner.wal {
            return Ok(());
        }
        self.inner.checkpoint_truncate()?;
        // Dropping out of WAL deletes the -wal and -shm files; switch back
        // for subsequent writes.
        self.inner.exec("PRAGMA journal_mode=DELETE")?;
        self.inner.exec("PRAGMA journal_mode=WAL")?;
        tracing::debug!(path = %self.inner.path, "wal checkpoint complete");
        Ok(())
    }

    /// Start a batch scope. The scope commits when dropped; call
    /// [`Batch::rollback`] to discard instead.
    pub fn begin(&self) -> Result<Batch<'_>> {
        self.inner.live()?;
        self.inner.exec("BEGIN IMMEDIATE")?;
        Ok(Batch {
            conn: self,
            finished: false,
        })
    }

    /// Rowid of the most recent successful insert on this connection.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        self.inner.live()?;
        // SAFETY: db is open
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(self.inner.db) })
    }

    /// Rows changed by the most recent statement.
    pub fn changes(&self) -> Result<i64> {
        self.inner.live()?;
        // SAFETY: db is open
        Ok(i64::from(unsafe { ffi::sqlite3_changes(self.inner.db) }))
    }

    /// Dispose the connection: dispose every registered table, fold the
    /// WAL, close the engine handle. Idempotent; all later operations fail
    /// with a disposed error.
    pub fn dispose(&self) {
        self.inner.teardown();
    }
}

/// A transaction scope around a batch of row operations.
///
/// Commits on normal drop. Callers that need rollback-on-error must catch
/// the error and call [`Batch::rollback`] before the scope exits.
pub struct Batch<'c> {
    conn: &'c Connection,
    finished: bool,
}

impl Batch<'_> {
    /// Commit the batch now.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.conn.inner.live()?;
        self.conn.inner.exec("COMMIT")
    }

    /// Discard the batch.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.inner.live()?;
        self.conn.inner.exec("ROLLBACK")
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        // Commit errors cannot propagate out of drop. A connection disposed
        // mid-scope has already rolled the batch back on close.
        if !self.finished && self.conn.inner.live().is_ok() {
            let _ = self.conn.inner.exec("COMMIT");
        }
    }
}
