//! JSON codec for documents.
//!
//! All document encoding goes through a [`JsonCodec`] owned by the
//! connection. The codec's configuration is fixed at construction: cached
//! statements capture it implicitly through the codec calls they make, so
//! mutating it under a live connection would silently desynchronize key
//! paths from stored documents.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CodecError, Result};
use crate::path::NamingConvention;

/// Configuration for a [`JsonCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecConfig {
    /// Convention applied to key-path segments when rendering JSON paths.
    ///
    /// This must agree with how the document types themselves serialize
    /// (e.g. `#[serde(rename_all = "camelCase")]` pairs with
    /// [`NamingConvention::CamelCase`]).
    pub naming: NamingConvention,
    /// Pretty-print stored documents. Costs space; useful when the backing
    /// file is inspected by hand.
    pub pretty: bool,
}

impl CodecConfig {
    /// Set the key-path naming convention.
    pub fn naming(mut self, naming: NamingConvention) -> Self {
        self.naming = naming;
        self
    }

    /// Enable pretty-printed document text.
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }
}

/// Serializes documents and keys to JSON text and back.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    config: CodecConfig,
}

impl JsonCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// The naming convention for key-path rendering.
    pub fn naming(&self) -> NamingConvention {
        self.config.naming
    }

    /// Serialize a document (or key) to JSON text.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String> {
        let result = if self.config.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        result.map_err(|source| {
            CodecError {
                context: "serializing document",
                source,
            }
            .into()
        })
    }

    /// Deserialize a document from JSON text.
    pub fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        serde_json::from_str(text).map_err(|source| {
            CodecError {
                context: "deserializing document",
                source,
            }
            .into()
        })
    }

    /// Deserialize a document from raw JSON bytes.
    pub fn decode_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|source| {
            CodecError {
                context: "deserializing document",
                source,
            }
            .into()
        })
    }
}
