//! SQL identifier and literal quoting.
//!
//! Table and index names reach SQL text directly (they cannot be bound as
//! parameters), as do JSON path literals inside index DDL. Both are quoted
//! here so arbitrary caller-supplied names stay inert.

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them.
///
/// # Examples
///
/// ```
/// use docstore_core::quote_ident;
///
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for inlining into SQL text, e.g. a JSON path
/// inside `CREATE INDEX ... (json_extract(documents, '$.id'))`.
///
/// Embedded single-quotes are escaped by doubling them.
#[inline]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
