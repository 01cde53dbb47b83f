//! Contract configuration.

use crate::documents::DocumentStore;
use crate::key::{IdLayout, KeyIndex};
use crate::model::CERT_DOC_TYPE;
use certledger_core::{Codec, CodecKind, LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Configuration shared by the contracts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Doc type of the managed certificates
    pub doc_type: String,
    /// How ids are cut into key segments
    pub id_layout: IdLayout,
    /// Document serialization strategy
    pub codec: CodecKind,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            doc_type: CERT_DOC_TYPE.to_string(),
            id_layout: IdLayout::default(),
            codec: CodecKind::Compact,
        }
    }
}

impl ContractConfig {
    /// Parse from JSON; missing members take their defaults
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the text is not a valid configuration
    /// or names an unusable doc type
    pub fn from_json_str(text: &str) -> LedgerResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| LedgerError::invalid_argument("contract config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_json_file(path: &Path) -> LedgerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check the doc type can form keys
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty or reserved doc type
    pub fn validate(&self) -> LedgerResult<()> {
        crate::key::prefix_range(&self.doc_type)
            .map(|_| ())
            .map_err(|e| LedgerError::invalid_argument("doc_type", e.to_string()))
    }

    /// Key index for the configured layout
    #[must_use]
    pub fn key_index(&self) -> KeyIndex {
        KeyIndex::new(self.id_layout.clone())
    }

    /// Instantiate the configured codec
    #[must_use]
    pub fn build_codec(&self) -> Arc<dyn Codec> {
        self.codec.build()
    }

    /// Document store wired with this configuration
    #[must_use]
    pub fn document_store(&self) -> DocumentStore {
        DocumentStore::new(self.key_index(), self.build_codec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let config = ContractConfig::default();
        assert_eq!(config.doc_type, "CERT");
        assert_eq!(config.id_layout.widths(), &[4, 2, 2]);
        assert_eq!(config.codec, CodecKind::Compact);
    }

    #[test]
    fn test_from_json() {
        let config =
            ContractConfig::from_json_str(r#"{"codec": "pretty", "id_layout": [4, 2]}"#).unwrap();
        assert_eq!(config.codec, CodecKind::Pretty);
        assert_eq!(config.id_layout.widths(), &[4, 2]);
        assert_eq!(config.doc_type, "CERT");
        assert_eq!(config.build_codec().name(), "json-pretty");
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(ContractConfig::from_json_str(r#"{"codec": "xml"}"#).is_err());
        assert!(ContractConfig::from_json_str(r#"{"doc_type": ""}"#).is_err());
        assert!(ContractConfig::from_json_str(r#"{"doc_type": "~x"}"#).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract.json");
        std::fs::write(&path, r#"{"doc_type": "DIPL"}"#).unwrap();
        let config = ContractConfig::from_json_file(&path).unwrap();
        assert_eq!(config.doc_type, "DIPL");
    }
}
