//! World state configuration.

use certledger_core::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum value size in bytes (0 = unlimited)
    pub max_value_size: usize,
    /// Upper bound applied to requested page sizes
    pub max_page_size: usize,
    /// Commit log file; `None` keeps the log in memory
    pub log_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_value_size: 4 * 1024 * 1024, // 4 MB
            max_page_size: 1000,
            log_path: None,
        }
    }
}

impl StoreConfig {
    /// In-memory store with default limits
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed store with default limits
    #[must_use]
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Parse from JSON; missing members take their defaults
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the text is not a valid configuration
    pub fn from_json_str(text: &str) -> LedgerResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| LedgerError::invalid_argument("store config", e.to_string()))
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.max_value_size, 4 * 1024 * 1024);
        assert_eq!(config.max_page_size, 1000);
        assert!(config.log_path.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = StoreConfig::from_json_str(r#"{"max_page_size": 50}"#).unwrap();
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.max_value_size, StoreConfig::default().max_value_size);
    }

    #[test]
    fn test_bad_json() {
        assert!(StoreConfig::from_json_str(r#"{"max_page_size": "many"}"#).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"log_path": "/tmp/commits.log"}"#).unwrap();
        let config = StoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.log_path, Some(PathBuf::from("/tmp/commits.log")));
    }
}
