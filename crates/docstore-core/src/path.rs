//! Typed key paths into JSON documents.
//!
//! A [`KeyPath`] names a location inside a document type `T` holding a value
//! of type `V`, as a dot-separated chain of field names. At query time the
//! path is rendered into SQLite's `$.a.b` form with the connection's naming
//! convention applied to each segment, so a Rust field `user_name` can
//! address a `userName` JSON property without the caller spelling the JSON
//! name at every site.

use std::marker::PhantomData;

/// How Rust field names map to JSON property names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingConvention {
    /// Use the segment exactly as written.
    #[default]
    AsIs,
    /// `user_name` → `userName`
    CamelCase,
    /// `user_name` → `UserName`
    PascalCase,
    /// `UserName` → `user_name`
    SnakeCase,
}

impl NamingConvention {
    /// Apply this convention to a single path segment.
    pub fn apply(&self, segment: &str) -> String {
        match self {
            NamingConvention::AsIs => segment.to_string(),
            NamingConvention::CamelCase => {
                let words = split_words(segment);
                let mut out = String::with_capacity(segment.len());
                for (i, word) in words.iter().enumerate() {
                    if i == 0 {
                        out.push_str(&word.to_lowercase());
                    } else {
                        out.push_str(&capitalize(word));
                    }
                }
                out
            }
            NamingConvention::PascalCase => {
                split_words(segment).iter().map(|w| capitalize(w)).collect()
            }
            NamingConvention::SnakeCase => split_words(segment)
                .iter()
                .map(|w| w.to_lowercase())
                .collect::<Vec<_>>()
                .join("_"),
        }
    }
}

/// Split a segment into words on underscores and lower-to-upper case
/// boundaries. `"user_name"` and `"userName"` both yield `["user", "name"]`.
fn split_words(segment: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in segment.chars() {
        if ch == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
        } else if ch.is_uppercase() && prev_lower {
            words.push(std::mem::take(&mut current));
            current.push(ch);
            prev_lower = false;
        } else {
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
            current.push(ch);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// A typed path from a document of type `T` to a value of type `V`.
///
/// The path is a compile-time constant; the type parameters exist only so
/// that key lookups and the values they match against stay type-checked at
/// the call site. `V` never needs to be constructed.
pub struct KeyPath<T, V> {
    raw: &'static str,
    _marker: PhantomData<fn(&T) -> V>,
}

impl<T, V> KeyPath<T, V> {
    /// Create a key path from a dot-separated chain of field names,
    /// e.g. `"id"` or `"address.city"`.
    pub const fn new(raw: &'static str) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// The path as written, without any convention applied.
    pub fn raw(&self) -> &'static str {
        self.raw
    }

    /// Render the SQLite JSON path (`$.a.b`), applying `naming` to every
    /// segment.
    pub fn json_path(&self, naming: NamingConvention) -> String {
        render_json_path(self.raw, naming)
    }
}

/// Render a dot-separated chain of field names into SQLite's `$.a.b` form,
/// applying `naming` to every segment.
pub fn render_json_path(raw: &str, naming: NamingConvention) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('$');
    for segment in raw.split('.') {
        out.push('.');
        out.push_str(&naming.apply(segment));
    }
    out
}

// Derived impls would put bounds on T and V; these must not.
impl<T, V> Clone for KeyPath<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for KeyPath<T, V> {}

impl<T, V> std::fmt::Debug for KeyPath<T, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyPath").field(&self.raw).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct User;

    #[test]
    fn renders_dollar_prefixed_paths() {
        let path: KeyPath<User, i64> = KeyPath::new("id");
        assert_eq!(path.json_path(NamingConvention::AsIs), "$.id");

        let nested: KeyPath<User, String> = KeyPath::new("address.city");
        assert_eq!(nested.json_path(NamingConvention::AsIs), "$.address.city");
    }

    #[test]
    fn camel_case_segments() {
        assert_eq!(NamingConvention::CamelCase.apply("user_name"), "userName");
        assert_eq!(NamingConvention::CamelCase.apply("id"), "id");
        assert_eq!(NamingConvention::CamelCase.apply("UserName"), "userName");
    }

    #[test]
    fn pascal_case_segments() {
        assert_eq!(NamingConvention::PascalCase.apply("user_name"), "UserName");
        assert_eq!(NamingConvention::PascalCase.apply("id"), "Id");
    }

    #[test]
    fn snake_case_segments() {
        assert_eq!(NamingConvention::SnakeCase.apply("UserName"), "user_name");
        assert_eq!(NamingConvention::SnakeCase.apply("userName"), "user_name");
        assert_eq!(NamingConvention::SnakeCase.apply("id"), "id");
    }

    #[test]
    fn convention_applies_per_segment() {
        let nested: KeyPath<User, String> = KeyPath::new("home_address.street_name");
        assert_eq!(
            nested.json_path(NamingConvention::CamelCase),
            "$.homeAddress.streetName"
        );
        assert_eq!(
            nested.json_path(NamingConvention::PascalCase),
            "$.HomeAddress.StreetName"
        );
    }

    #[test]
    fn key_path_is_copy() {
        let path: KeyPath<User, i64> = KeyPath::new("id");
        let copy = path;
        assert_eq!(path.raw(), copy.raw());
    }
}
