//! Docstore - document tables of JSON values over embedded SQLite.
//!
//! A NoSQL-flavored API over a relational engine: tables hold JSON
//! documents, addressed by typed key paths into the documents themselves,
//! while storage, indexing, transactions, and durability stay native to
//! SQLite.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use docstore::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug)]
//! struct Hero {
//!     id: i64,
//!     name: String,
//!     secret_name: String,
//! }
//!
//! const BY_ID: KeyPath<Hero, i64> = KeyPath::new("id");
//!
//! fn main() -> docstore::Result<()> {
//!     let conn = Connection::open_file("heroes.db")?;
//!     let heroes = conn.get_table("heroes")?;
//!
//!     heroes.add(&Hero {
//!         id: 1,
//!         name: "Spider-Man".into(),
//!         secret_name: "Peter Parker".into(),
//!     })?;
//!
//!     let hero = heroes.find(BY_ID, &1)?;
//!     println!("found {hero:?}");
//!
//!     heroes.create_index(BY_ID, "by_id", true)?;
//!     heroes.delete(BY_ID, &1)?;
//!
//!     conn.dispose();
//!     Ok(())
//! }
//! ```

pub use docstore_core::{
    CodecConfig, CodecError, ConstraintError, DisposedError, EngineError, EngineErrorKind, Error,
    JsonCodec, KeyNotFoundError, KeyPath, NamingConvention, OpenError, PrepareError, Result,
};
pub use docstore_sqlite::{
    Batch, Connection, SqliteConfig, Table, TableLayout, TableOptions, sqlite_version,
};

/// Everything most applications need.
pub mod prelude {
    pub use docstore_core::{CodecConfig, Error, KeyPath, NamingConvention, Result};
    pub use docstore_sqlite::{Connection, SqliteConfig, Table, TableOptions};
}
