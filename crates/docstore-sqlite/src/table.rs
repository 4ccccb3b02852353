//! Document tables.
//!
//! A [`Table`] is one named collection of JSON documents over a single
//! backing store. Every operation lazily compiles its statement on first
//! use and caches it by logical operation; JSON key paths are bound as
//! parameters, so the cache never grows with the number of distinct
//! selectors. All JSON work is delegated to the engine's native operators
//! (`json_extract`, `json_insert`, `json_replace`, `json_set`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use serde::de::DeserializeOwned;

use docstore_core::{
    DisposedError, Error, JsonCodec, KeyNotFoundError, KeyPath, Result, quote_ident, quote_literal,
    render_json_path,
};

use crate::connection::ConnectionInner;
use crate::statement::{Arg, Statement};

/// Physical layout of a document table.
#[derive(Debug, Clone, Default)]
pub enum TableLayout {
    /// One `documents` column; identity only through JSON key paths.
    #[default]
    Single,
    /// `(id TEXT PRIMARY KEY, documents TEXT)`: the value at `key_path`
    /// inside each document is mirrored into the `id` column on insert, so
    /// identity collisions surface from the primary key.
    Keyed {
        /// Dot-separated field chain naming the document's own key.
        key_path: String,
    },
}

/// Options for creating a table wrapper.
#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    pub layout: TableLayout,
}

impl TableOptions {
    /// The default single-column layout.
    pub fn single() -> Self {
        Self::default()
    }

    /// The keyed layout with the given document key path.
    pub fn keyed(key_path: impl Into<String>) -> Self {
        Self {
            layout: TableLayout::Keyed {
                key_path: key_path.into(),
            },
        }
    }
}

/// Logical operations with a cached statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StatementKind {
    Count,
    CountWhere,
    All,
    Clear,
    Find,
    FindProperty,
    Add,
    AddKeyed,
    Update,
    Delete,
    PatchInsert,
    PatchReplace,
    PatchSet,
    IndexExists,
}

/// A named collection of JSON documents.
///
/// Obtained from [`Connection::get_table`](crate::Connection::get_table);
/// the connection owns the table and disposes it on teardown. The table
/// holds only a non-owning back-reference for deregistration.
pub struct Table {
    name: String,
    conn: Weak<ConnectionInner>,
    codec: JsonCodec,
    /// Rendered `$.…` key path in the keyed layout.
    keyed_path: Option<String>,
    statements: Mutex<HashMap<StatementKind, Arc<Statement>>>,
    disposed: AtomicBool,
}

impl Table {
    pub(crate) fn new(name: &str, options: &TableOptions, inner: &Arc<ConnectionInner>) -> Self {
        let codec = inner.codec().clone();
        let keyed_path = match &options.layout {
            TableLayout::Single => None,
            TableLayout::Keyed { key_path } => Some(render_json_path(key_path, codec.naming())),
        };
        Self {
            name: name.to_string(),
            conn: Arc::downgrade(inner),
            codec,
            keyed_path,
            statements: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// DDL for the backing store. Idempotent.
    pub(crate) fn create_sql(name: &str, options: &TableOptions) -> String {
        let table = quote_ident(name);
        match &options.layout {
            TableLayout::Single => {
                format!("CREATE TABLE IF NOT EXISTS {table} (documents TEXT NOT NULL)")
            }
            TableLayout::Keyed { .. } => format!(
                "CREATE TABLE IF NOT EXISTS {table} (id TEXT PRIMARY KEY, documents TEXT NOT NULL)"
            ),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fail fast if this table or its connection is disposed. Returns the
    /// upgraded connection so the engine handle stays alive for the
    /// duration of the operation.
    fn live(&self) -> Result<Arc<ConnectionInner>> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed(DisposedError { what: "table" }));
        }
        let inner = self
            .conn
            .upgrade()
            .ok_or(Error::Disposed(DisposedError { what: "connection" }))?;
        inner.live()?;
        Ok(inner)
    }

    /// Get-or-create the cached statement for a logical operation.
    fn statement(&self, kind: StatementKind, inner: &ConnectionInner) -> Result<Arc<Statement>> {
        let mut statements = self.statements.lock().unwrap();
        if let Some(stmt) = statements.get(&kind) {
            return Ok(Arc::clone(stmt));
        }
        // SAFETY: the connection handle outlives the statement; dispose
        // finalizes all cached statements before the handle closes
        let stmt = Arc::new(unsafe { Statement::prepare(inner.db(), &self.sql_for(kind))? });
        statements.insert(kind, Arc::clone(&stmt));
        Ok(stmt)
    }

    fn sql_for(&self, kind: StatementKind) -> String {
        let t = quote_ident(&self.name);
        match kind {
            StatementKind::Count => format!("SELECT COUNT(*) FROM {t}"),
            StatementKind::CountWhere => format!(
                "SELECT COUNT(*) FROM {t} \
                 WHERE json_extract(documents, ?1) IS json_extract(json(?2), '$')"
            ),
            StatementKind::All => format!("SELECT documents FROM {t}"),
            StatementKind::Clear => format!("DELETE FROM {t}"),
            StatementKind::Find => format!(
                "SELECT documents FROM {t} \
                 WHERE json_extract(documents, ?1) IS json_extract(json(?2), '$') LIMIT 1"
            ),
            StatementKind::FindProperty => format!(
                "SELECT json_quote(json_extract(documents, ?1)) FROM {t} \
                 WHERE json_extract(documents, ?2) IS json_extract(json(?3), '$') LIMIT 1"
            ),
            StatementKind::Add => format!("INSERT INTO {t} (documents) VALUES (json(?1))"),
            StatementKind::AddKeyed => format!(
                "INSERT INTO {t} (id, documents) \
                 VALUES (json_extract(json(?2), ?1), json(?2))"
            ),
            StatementKind::Update => format!(
                "UPDATE {t} SET documents = json(?2) \
                 WHERE json_extract(documents, ?1) IS json_extract(json(?2), ?1)"
            ),
            StatementKind::Delete => format!(
                "DELETE FROM {t} \
                 WHERE json_extract(documents, ?1) IS json_extract(json(?2), '$')"
            ),
            StatementKind::PatchInsert => format!(
                "UPDATE {t} SET documents = json_insert(documents, ?1, json(?2)) \
                 WHERE json_extract(documents, ?3) IS json_extract(json(?4), '$')"
            ),
            StatementKind::PatchReplace => format!(
                "UPDATE {t} SET documents = json_replace(documents, ?1, json(?2)) \
                 WHERE json_extract(documents, ?3) IS json_extract(json(?4), '$')"
            ),
            StatementKind::PatchSet => format!(
                "UPDATE {t} SET documents = json_set(documents, ?1, json(?2)) \
                 WHERE json_extract(documents, ?3) IS json_extract(json(?4), '$')"
            ),
            StatementKind::IndexExists => {
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1".to_string()
            }
        }
    }

    /// Row count as a narrow integer.
    pub fn count(&self) -> Result<i32> {
        let inner = self.live()?;
        let stmt = self.statement(StatementKind::Count, &inner)?;
        let n = stmt.query_row(&[], |row| Ok(row.int(0)))?;
        Ok(n.unwrap_or(0))
    }

    /// Row count as a wide integer.
    pub fn count_long(&self) -> Result<i64> {
        let inner = self.live()?;
        let stmt = self.statement(StatementKind::Count, &inner)?;
        let n = stmt.query_row(&[], |row| Ok(row.int64(0)))?;
        Ok(n.unwrap_or(0))
    }

    /// Rows whose value at `path` equals `key`.
    pub fn count_where<T, V: Serialize>(&self, path: KeyPath<T, V>, key: &V) -> Result<i64> {
        let inner = self.live()?;
        let json_path = path.json_path(self.codec.naming());
        let key_json = self.codec.encode(key)?;
        let stmt = self.statement(StatementKind::CountWhere, &inner)?;
        let n = stmt.query_row(&[Arg::Text(&json_path), Arg::Text(&key_json)], |row| {
            Ok(row.int64(0))
        })?;
        Ok(n.unwrap_or(0))
    }

    /// Every document in storage order. The order is whatever the engine
    /// returns without an ORDER BY; it is not stable across engine-internal
    /// reorganizations.
    pub fn all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let inner = self.live()?;
        let stmt = self.statement(StatementKind::All, &inner)?;
        stmt.query_all(&[], |row| row.json(0, &self.codec))
    }

    /// Delete every row. Cached statements and indexes survive.
    pub fn clear(&self) -> Result<()> {
        let inner = self.live()?;
        let stmt = self.statement(StatementKind::Clear, &inner)?;
        stmt.run(&[])
    }

    /// Is there a document whose value at `path` equals `key`?
    pub fn exists<T, V: Serialize>(&self, path: KeyPath<T, V>, key: &V) -> Result<bool> {
        Ok(self.count_where(path, key)? > 0)
    }

    /// The first document whose value at `path` equals `key`.
    ///
    /// Fails with [`Error::KeyNotFound`] when nothing matches.
    pub fn find<T: DeserializeOwned, V: Serialize>(&self, path: KeyPath<T, V>, key: &V) -> Result<T> {
        let inner = self.live()?;
        let json_path = path.json_path(self.codec.naming());
        let key_json = self.codec.encode(key)?;
        let stmt = self.statement(StatementKind::Find, &inner)?;
        let found = stmt.query_row(&[Arg::Text(&json_path), Arg::Text(&key_json)], |row| {
            row.json(0, &self.codec)
        })?;
        found.ok_or_else(|| {
            Error::KeyNotFound(KeyNotFoundError {
                table: self.name.clone(),
                path: json_path,
                key: key_json,
            })
        })
    }

    /// Extract the value at `property` from the document matching `key`,
    /// without deserializing the whole document.
    ///
    /// Returns `None` both when no document matches and when the document
    /// exists but lacks the property; the two cases are not distinguished.
    pub fn find_property<T, V: Serialize, P: DeserializeOwned>(
        &self,
        path: KeyPath<T, V>,
        property: KeyPath<T, P>,
        key: &V,
    ) -> Result<Option<P>> {
        let inner = self.live()?;
        let naming = self.codec.naming();
        let prop_path = property.json_path(naming);
        let json_path = path.json_path(naming);
        let key_json = self.codec.encode(key)?;
        let stmt = self.statement(StatementKind::FindProperty, &inner)?;
        let row = stmt.query_row(
            &[
                Arg::Text(&prop_path),
                Arg::Text(&json_path),
                Arg::Text(&key_json),
            ],
            |row| Ok(row.text(0)),
        )?;
        match row.flatten() {
            None => Ok(None),
            Some(text) if text == "null" => Ok(None),
            Some(text) => self.codec.decode(&text).map(Some),
        }
    }

    /// Insert a new row for `document`. No key collision check is made
    /// here; an identity column or unique index collision surfaces as
    /// [`Error::Constraint`].
    pub fn add<T: Serialize>(&self, document: &T) -> Result<()> {
        let inner = self.live()?;
        let doc_json = self.codec.encode(document)?;
        match &self.keyed_path {
            None => {
                let stmt = self.statement(StatementKind::Add, &inner)?;
                stmt.run(&[Arg::Text(&doc_json)])
            }
            Some(key_path) => {
                let stmt = self.statement(StatementKind::AddKeyed, &inner)?;
                stmt.run(&[Arg::Text(key_path), Arg::Text(&doc_json)])
            }
        }
    }

    /// Insert many documents inside one transaction scope. On failure the
    /// batch is rolled back and the error returned.
    pub fn add_all<T: Serialize>(&self, documents: &[T]) -> Result<()> {
        let inner = self.live()?;
        inner.exec("BEGIN IMMEDIATE")?;
        for document in documents {
            if let Err(err) = self.add(document) {
                let _ = inner.exec("ROLLBACK");
                return Err(err);
            }
        }
        inner.exec("COMMIT")
    }

    /// Overwrite the row whose value at `path` matches the same path inside
    /// `document` itself.
    pub fn update<T: Serialize, V>(&self, document: &T, path: KeyPath<T, V>) -> Result<()> {
        let inner = self.live()?;
        let json_path = path.json_path(self.codec.naming());
        let doc_json = self.codec.encode(document)?;
        let stmt = self.statement(StatementKind::Update, &inner)?;
        stmt.run(&[Arg::Text(&json_path), Arg::Text(&doc_json)])
    }

    /// Remove the row matching `key`. A no-op when nothing matches.
    pub fn delete<T, V: Serialize>(&self, path: KeyPath<T, V>, key: &V) -> Result<()> {
        let inner = self.live()?;
        let json_path = path.json_path(self.codec.naming());
        let key_json = self.codec.encode(key)?;
        let stmt = self.statement(StatementKind::Delete, &inner)?;
        stmt.run(&[Arg::Text(&json_path), Arg::Text(&key_json)])
    }

    /// Set `value` at `property` in the matching document only if the
    /// property is absent; an existing value is left untouched.
    ///
    /// Like all partial updates, this cannot report whether anything
    /// changed; the engine's JSON merge is silent on a no-op.
    pub fn patch_insert<T, V: Serialize, P: Serialize>(
        &self,
        path: KeyPath<T, V>,
        property: KeyPath<T, P>,
        key: &V,
        value: &P,
    ) -> Result<()> {
        self.patch(StatementKind::PatchInsert, path, property, key, value)
    }

    /// Set `value` at `property` in the matching document only if the
    /// property already exists; an absent property is not created.
    pub fn patch_replace<T, V: Serialize, P: Serialize>(
        &self,
        path: KeyPath<T, V>,
        property: KeyPath<T, P>,
        key: &V,
        value: &P,
    ) -> Result<()> {
        self.patch(StatementKind::PatchReplace, path, property, key, value)
    }

    /// Set `value` at `property` in the matching document, creating the
    /// property if absent and overwriting it if present.
    pub fn patch_set<T, V: Serialize, P: Serialize>(
        &self,
        path: KeyPath<T, V>,
        property: KeyPath<T, P>,
        key: &V,
        value: &P,
    ) -> Result<()> {
        self.patch(StatementKind::PatchSet, path, property, key, value)
    }

    fn patch<T, V: Serialize, P: Serialize>(
        &self,
        kind: StatementKind,
        path: KeyPath<T, V>,
        property: KeyPath<T, P>,
        key: &V,
        value: &P,
    ) -> Result<()> {
        let inner = self.live()?;
        let naming = self.codec.naming();
        let prop_path = property.json_path(naming);
        let value_json = self.codec.encode(value)?;
        let json_path = path.json_path(naming);
        let key_json = self.codec.encode(key)?;
        let stmt = self.statement(kind, &inner)?;
        stmt.run(&[
            Arg::Text(&prop_path),
            Arg::Text(&value_json),
            Arg::Text(&json_path),
            Arg::Text(&key_json),
        ])
    }

    fn index_name(&self, name: &str) -> String {
        format!("{}_{}", self.name, name)
    }

    /// Does the index `{table}_{name}` exist?
    pub fn index_exists(&self, name: &str) -> Result<bool> {
        let inner = self.live()?;
        let index = self.index_name(name);
        let stmt = self.statement(StatementKind::IndexExists, &inner)?;
        let n = stmt.query_row(&[Arg::Text(&index)], |row| Ok(row.int64(0)))?;
        Ok(n.is_some_and(|c| c > 0))
    }

    /// Build an expression index named `{table}_{name}` over the JSON path
    /// derived from `path`.
    ///
    /// Creation uses `IF NOT EXISTS` in both forms: a second call after a
    /// successful creation is a silent no-op, while a unique index over
    /// already-duplicated data fails with [`Error::Constraint`] on every
    /// attempt (the index never came into existence).
    pub fn create_index<T, V>(&self, path: KeyPath<T, V>, name: &str, unique: bool) -> Result<()> {
        let inner = self.live()?;
        let json_path = path.json_path(self.codec.naming());
        let sql = format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} (json_extract(documents, {}))",
            if unique { "UNIQUE " } else { "" },
            quote_ident(&self.index_name(name)),
            quote_ident(&self.name),
            quote_literal(&json_path),
        );
        tracing::debug!(table = %self.name, index = %name, unique, "creating index");
        inner.exec(&sql)
    }

    /// Drop the index `{table}_{name}`. Returns whether an index existed
    /// and was dropped.
    pub fn delete_index(&self, name: &str) -> Result<bool> {
        if !self.index_exists(name)? {
            return Ok(false);
        }
        let inner = self.live()?;
        let sql = format!("DROP INDEX IF EXISTS {}", quote_ident(&self.index_name(name)));
        inner.exec(&sql)?;
        Ok(true)
    }

    /// Dispose the table: deregister from the connection and finalize every
    /// cached statement exactly once. Idempotent; all later operations fail
    /// with a disposed error.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.conn.upgrade() {
            inner.forget(&self.name);
        }
        let statements: Vec<Arc<Statement>> = match self.statements.lock() {
            Ok(mut map) => map.drain().map(|(_, s)| s).collect(),
            Err(_) => Vec::new(),
        };
        for stmt in statements {
            stmt.finalize();
        }
        tracing::debug!(table = %self.name, "table disposed");
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Person {
        id: i64,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        nickname: Option<String>,
    }

    const BY_ID: KeyPath<Person, i64> = KeyPath::new("id");
    const BY_NAME: KeyPath<Person, String> = KeyPath::new("name");
    const NICKNAME: KeyPath<Person, String> = KeyPath::new("nickname");

    fn person(id: i64, name: &str) -> Person {
        Person {
            id,
            name: name.to_string(),
            nickname: None,
        }
    }

    fn table() -> (Connection, Arc<Table>) {
        let conn = Connection::open_memory().unwrap();
        let table = conn.get_table("people").unwrap();
        (conn, table)
    }

    #[test]
    fn add_then_find_round_trips() {
        let (_conn, table) = table();
        let alice = person(1, "alice");
        table.add(&alice).unwrap();

        let found = table.find(BY_ID, &1).unwrap();
        assert_eq!(found, alice);

        let by_name = table.find(BY_NAME, &"alice".to_string()).unwrap();
        assert_eq!(by_name, alice);
    }

    #[test]
    fn find_missing_key_fails_typed() {
        let (_conn, table) = table();
        let err = table.find(BY_ID, &99).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn exists_tracks_add_and_delete() {
        let (_conn, table) = table();
        assert!(!table.exists(BY_ID, &1).unwrap());

        table.add(&person(1, "alice")).unwrap();
        assert!(table.exists(BY_ID, &1).unwrap());

        table.delete(BY_ID, &1).unwrap();
        assert!(!table.exists(BY_ID, &1).unwrap());

        // Deleting an absent key is a no-op, not an error.
        table.delete(BY_ID, &1).unwrap();
    }

    #[test]
    fn counts_and_clear() {
        let (_conn, table) = table();
        for i in 0..5 {
            table.add(&person(i, "p")).unwrap();
        }
        assert_eq!(table.count().unwrap(), 5);
        assert_eq!(table.count_long().unwrap(), 5);
        assert_eq!(table.count_where(BY_NAME, &"p".to_string()).unwrap(), 5);

        table.clear().unwrap();
        assert_eq!(table.count().unwrap(), 0);

        // The table stays usable after clear.
        table.add(&person(9, "q")).unwrap();
        assert_eq!(table.count().unwrap(), 1);
    }

    #[test]
    fn all_returns_every_document() {
        let (_conn, table) = table();
        table.add(&person(1, "a")).unwrap();
        table.add(&person(2, "b")).unwrap();

        let mut docs: Vec<Person> = table.all().unwrap();
        docs.sort_by_key(|p| p.id);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "a");
        assert_eq!(docs[1].name, "b");
    }

    #[test]
    fn update_overwrites_by_document_key() {
        let (_conn, table) = table();
        table.add(&person(1, "before")).unwrap();

        table.update(&person(1, "after"), BY_ID).unwrap();
        assert_eq!(table.find(BY_ID, &1).unwrap().name, "after");
        assert_eq!(table.count().unwrap(), 1);
    }

    #[test]
    fn find_property_extracts_without_full_deserialize() {
        let (_conn, table) = table();
        table.add(&person(1, "alice")).unwrap();

        let name: Option<String> = table.find_property(BY_ID, BY_NAME, &1).unwrap();
        assert_eq!(name.as_deref(), Some("alice"));
    }

    #[test]
    fn find_property_conflates_absent_document_and_absent_path() {
        let (_conn, table) = table();
        table.add(&person(1, "alice")).unwrap();

        // Document present, property absent.
        let missing_prop: Option<String> = table.find_property(BY_ID, NICKNAME, &1).unwrap();
        assert_eq!(missing_prop, None);

        // Document absent.
        let missing_doc: Option<String> = table.find_property(BY_ID, NICKNAME, &2).unwrap();
        assert_eq!(missing_doc, None);
    }

    #[test]
    fn patch_semantics_differ_on_missing_property() {
        let (_conn, table) = table();
        table.add(&person(1, "a")).unwrap();
        table.add(&person(2, "b")).unwrap();
        table.add(&person(3, "c")).unwrap();

        let nick = "nick".to_string();

        // Insert creates the absent property.
        table.patch_insert(BY_ID, NICKNAME, &1, &nick).unwrap();
        assert_eq!(
            table.find_property(BY_ID, NICKNAME, &1).unwrap(),
            Some(nick.clone())
        );

        // Replace leaves the absent property absent.
        table.patch_replace(BY_ID, NICKNAME, &2, &nick).unwrap();
        assert_eq!(
            table.find_property::<_, _, String>(BY_ID, NICKNAME, &2).unwrap(),
            None
        );

        // Set creates it.
        table.patch_set(BY_ID, NICKNAME, &3, &nick).unwrap();
        assert_eq!(
            table.find_property(BY_ID, NICKNAME, &3).unwrap(),
            Some(nick.clone())
        );
    }

    #[test]
    fn patch_semantics_differ_on_existing_property() {
        let (_conn, table) = table();
        table.add(&person(1, "old")).unwrap();

        let new = "new".to_string();

        // Insert never overwrites.
        table.patch_insert(BY_ID, BY_NAME, &1, &new).unwrap();
        assert_eq!(table.find(BY_ID, &1).unwrap().name, "old");

        // Replace overwrites.
        table.patch_replace(BY_ID, BY_NAME, &1, &new).unwrap();
        assert_eq!(table.find(BY_ID, &1).unwrap().name, "new");

        // Set overwrites too.
        let newer = "newer".to_string();
        table.patch_set(BY_ID, BY_NAME, &1, &newer).unwrap();
        assert_eq!(table.find(BY_ID, &1).unwrap().name, "newer");
    }

    #[test]
    fn index_lifecycle() {
        let (_conn, table) = table();
        assert!(!table.index_exists("by_id").unwrap());

        table.create_index(BY_ID, "by_id", false).unwrap();
        assert!(table.index_exists("by_id").unwrap());

        // Non-unique creation is idempotent.
        table.create_index(BY_ID, "by_id", false).unwrap();

        assert!(table.delete_index("by_id").unwrap());
        assert!(!table.index_exists("by_id").unwrap());

        // Dropping a non-existent index reports false rather than failing.
        assert!(!table.delete_index("by_id").unwrap());
    }

    #[test]
    fn unique_index_rejects_duplicate_keys() {
        let (_conn, table) = table();
        table.create_index(BY_ID, "id_unique", true).unwrap();

        table.add(&person(1, "a")).unwrap();
        let err = table.add(&person(1, "b")).unwrap_err();
        assert!(err.is_constraint());

        // With the index removed the same insert succeeds.
        assert!(table.delete_index("id_unique").unwrap());
        table.add(&person(1, "b")).unwrap();
        assert_eq!(table.count().unwrap(), 2);
    }

    #[test]
    fn unique_index_over_duplicates_fails_on_every_attempt() {
        let (_conn, table) = table();
        table.add(&person(1, "a")).unwrap();
        table.add(&person(1, "b")).unwrap();

        let err = table.create_index(BY_ID, "id_unique", true).unwrap_err();
        assert!(err.is_constraint());
        // IF NOT EXISTS does not mask the retry: the index never came into
        // existence.
        let err = table.create_index(BY_ID, "id_unique", true).unwrap_err();
        assert!(err.is_constraint());
        assert!(!table.index_exists("id_unique").unwrap());
    }

    #[test]
    fn keyed_layout_enforces_identity() {
        let conn = Connection::open_memory().unwrap();
        let table = conn
            .get_table_with("people", TableOptions::keyed("id"))
            .unwrap();

        table.add(&person(1, "a")).unwrap();
        let err = table.add(&person(1, "b")).unwrap_err();
        assert!(err.is_constraint());

        // A distinct key inserts fine, and lookups still go through paths.
        table.add(&person(2, "b")).unwrap();
        assert_eq!(table.find(BY_ID, &2).unwrap().name, "b");
    }

    #[test]
    fn add_all_is_atomic() {
        let conn = Connection::open_memory().unwrap();
        let table = conn
            .get_table_with("people", TableOptions::keyed("id"))
            .unwrap();

        // Second and third collide; nothing must remain.
        let docs = vec![person(1, "a"), person(2, "b"), person(2, "c")];
        let err = table.add_all(&docs).unwrap_err();
        assert!(err.is_constraint());
        assert_eq!(table.count().unwrap(), 0);

        let docs = vec![person(1, "a"), person(2, "b")];
        table.add_all(&docs).unwrap();
        assert_eq!(table.count().unwrap(), 2);
    }

    #[test]
    fn dispose_is_idempotent_and_deregisters() {
        let conn = Connection::open_memory().unwrap();
        let table = conn.get_table("people").unwrap();
        table.add(&person(1, "a")).unwrap();

        table.dispose();
        table.dispose();
        assert!(table.count().unwrap_err().is_disposed());

        // The name is free again; a fresh wrapper sees the same rows.
        let fresh = conn.get_table("people").unwrap();
        assert!(!Arc::ptr_eq(&table, &fresh));
        assert_eq!(fresh.count().unwrap(), 1);
    }

    #[test]
    fn naming_convention_applies_to_key_paths() {
        use docstore_core::{CodecConfig, NamingConvention};
        use crate::connection::SqliteConfig;

        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        #[serde(rename_all = "camelCase")]
        struct Styled {
            user_id: i64,
            display_name: String,
        }

        let config = SqliteConfig::memory()
            .codec(CodecConfig::default().naming(NamingConvention::CamelCase));
        let conn = Connection::open(&config).unwrap();
        let table = conn.get_table("styled").unwrap();

        let by_user: KeyPath<Styled, i64> = KeyPath::new("user_id");
        table
            .add(&Styled {
                user_id: 7,
                display_name: "Seven".to_string(),
            })
            .unwrap();

        // The path "user_id" addresses the serialized "userId" property.
        let found = table.find(by_user, &7).unwrap();
        assert_eq!(found.display_name, "Seven");
    }
}
