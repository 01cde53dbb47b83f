//! Document serialization strategies.
//!
//! World state values are JSON documents so the substrate's selector queries
//! can read them. The strategy deciding how a document becomes bytes is an
//! explicit object handed to whoever writes documents; there is no global
//! codec configuration.

use crate::error::{LedgerError, LedgerResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Converts documents to and from stored bytes
pub trait Codec: Send + Sync + fmt::Debug {
    /// Strategy name, for logs
    fn name(&self) -> &'static str;

    /// Encode a JSON value to bytes
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be encoded
    fn encode_value(&self, value: &Value) -> LedgerResult<Vec<u8>>;

    /// Decode bytes stored under `key` into a JSON value
    ///
    /// # Errors
    ///
    /// Returns `Decode` if the bytes are not well-formed
    fn decode_value(&self, key: &str, bytes: &[u8]) -> LedgerResult<Value>;
}

impl dyn Codec {
    /// Encode any serializable document
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be represented as JSON
    pub fn encode<T: Serialize>(&self, doc: &T) -> LedgerResult<Vec<u8>> {
        let value = serde_json::to_value(doc).map_err(|e| LedgerError::Encode {
            reason: e.to_string(),
        })?;
        self.encode_value(&value)
    }

    /// Decode bytes stored under `key` into a typed document
    ///
    /// # Errors
    ///
    /// Returns `Decode` if the bytes are not a well-formed `T`
    pub fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> LedgerResult<T> {
        let value = self.decode_value(key, bytes)?;
        serde_json::from_value(value).map_err(|e| LedgerError::Decode {
            key: printable_key(key),
            reason: e.to_string(),
        })
    }
}

/// JSON codec, compact or pretty-printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Compact JSON, the default
    #[must_use]
    pub const fn compact() -> Self {
        Self { pretty: false }
    }

    /// Indented JSON
    #[must_use]
    pub const fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        if self.pretty { "json-pretty" } else { "json" }
    }

    fn encode_value(&self, value: &Value) -> LedgerResult<Vec<u8>> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        encoded.map_err(|e| LedgerError::Encode {
            reason: e.to_string(),
        })
    }

    fn decode_value(&self, key: &str, bytes: &[u8]) -> LedgerResult<Value> {
        serde_json::from_slice(bytes).map_err(|e| LedgerError::Decode {
            key: printable_key(key),
            reason: e.to_string(),
        })
    }
}

/// Codec selection for configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// [`JsonCodec::compact`]
    #[default]
    Compact,
    /// [`JsonCodec::pretty`]
    Pretty,
}

impl CodecKind {
    /// Instantiate the selected strategy
    #[must_use]
    pub fn build(self) -> Arc<dyn Codec> {
        match self {
            Self::Compact => Arc::new(JsonCodec::compact()),
            Self::Pretty => Arc::new(JsonCodec::pretty()),
        }
    }
}

/// Render a composite key for error messages (separators become `/`)
#[must_use]
pub fn printable_key(key: &str) -> String {
    key.trim_matches('\u{0}').replace('\u{0}', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        id: String,
        status: u8,
    }

    #[test]
    fn test_typed_roundtrip() {
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec::compact());
        let doc = Doc { id: "CERT1".into(), status: 1 };
        let bytes = codec.encode(&doc).unwrap();
        assert_eq!(bytes, br#"{"id":"CERT1","status":1}"#);
        let back: Doc = codec.decode("k", &bytes).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_pretty_is_still_json() {
        let codec = JsonCodec::pretty();
        let bytes = codec.encode_value(&json!({"a": 1})).unwrap();
        assert!(bytes.contains(&b'\n'));
        assert_eq!(codec.decode_value("k", &bytes).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_decode_error_names_key() {
        let codec: Arc<dyn Codec> = CodecKind::Compact.build();
        let err = codec.decode::<Doc>("\u{0}CERT\u{0}2022\u{0}", b"\x00").unwrap_err();
        match err {
            LedgerError::Decode { key, .. } => assert_eq!(key, "CERT/2022"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_shape_mismatch() {
        let codec: Arc<dyn Codec> = CodecKind::Compact.build();
        let err = codec.decode::<Doc>("k", br#"{"id":3}"#).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::DecodeError);
    }

    #[test]
    fn test_codec_kind_config() {
        let kind: CodecKind = serde_json::from_str("\"pretty\"").unwrap();
        assert_eq!(kind.build().name(), "json-pretty");
        assert_eq!(CodecKind::default().build().name(), "json");
    }
}
