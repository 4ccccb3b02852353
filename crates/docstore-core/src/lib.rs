//! Core types for docstore.
//!
//! This crate provides the engine-agnostic foundation shared by the drivers:
//!
//! - the [`Error`] taxonomy and [`Result`] alias
//! - the [`JsonCodec`] document codec and its configuration
//! - typed [`KeyPath`]s with JSON naming conventions
//! - SQL identifier quoting helpers

pub mod codec;
pub mod error;
pub mod identifiers;
pub mod path;

pub use codec::{CodecConfig, JsonCodec};
pub use error::{
    CodecError, ConstraintError, DisposedError, EngineError, EngineErrorKind, Error,
    KeyNotFoundError, OpenError, PrepareError, Result,
};
pub use identifiers::{quote_ident, quote_literal};
pub use path::{KeyPath, NamingConvention, render_json_path};
