//! SQLite backend for docstore.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! Document tables of JSON values over an embedded SQLite database. Storage,
//! indexing, transactions, and durability are all delegated to the engine's
//! native JSON operators; this crate owns the statement lifecycle and the
//! connection/table teardown discipline on top of them.
//!
//! # Example
//!
//! ```rust,ignore
//! use docstore_sqlite::{Connection, SqliteConfig};
//! use docstore_core::KeyPath;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! const BY_ID: KeyPath<User, i64> = KeyPath::new("id");
//!
//! let conn = Connection::open(&SqliteConfig::file("users.db"))?;
//! let users = conn.get_table("users")?;
//!
//! users.add(&User { id: 1, name: "Alice".into() })?;
//! let alice = users.find(BY_ID, &1)?;
//! users.delete(BY_ID, &1)?;
//!
//! conn.dispose();
//! ```
//!
//! # Concurrency
//!
//! All operations are blocking calls on the caller's thread. The engine
//! handle is opened in serialized mode; each cached statement carries its
//! own lock, so two threads contend only when they execute the *same*
//! logical operation on the same table at the same time.
//!
//! # Teardown
//!
//! `Connection::dispose` cascades: every registered table finalizes its
//! cached statements, the write-ahead log is folded into the main file
//! (removing the `-wal`/`-shm` side files), and the handle closes. Dropping
//! the last `Connection` does the same best-effort.

pub mod connection;
pub mod ffi;
pub mod statement;
mod status;
pub mod table;

pub use connection::{Batch, Connection, SqliteConfig};
pub use statement::{Arg, RowView, Statement};
pub use table::{Table, TableLayout, TableOptions};

/// The SQLite library version string.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}
