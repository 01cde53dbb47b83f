//! Transaction identifiers.
//!
//! A transaction id is a UUID rendered as 32 lowercase hex characters, the
//! form history records and tombstones carry.

use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transaction identifier - identifies one committed unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxId(Uuid);

impl TxId {
    /// Create a new random TxId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from UUID bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get as bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Parse the 32-char hex form (hyphenated UUIDs are accepted too)
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a UUID
    pub fn parse(text: &str) -> Result<Self, LedgerError> {
        Uuid::try_parse(text)
            .map(Self)
            .map_err(|e| LedgerError::invalid_argument("txId", e.to_string()))
    }
}

impl Default for TxId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl From<TxId> for String {
    fn from(id: TxId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for TxId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        assert_ne!(TxId::new(), TxId::new());
    }

    #[test]
    fn test_id_from_bytes() {
        let bytes = [7u8; 16];
        let id = TxId::from_bytes(bytes);
        assert_eq!(id.as_bytes(), &bytes);
    }

    #[test]
    fn test_id_display_is_simple_hex() {
        let id = TxId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(TxId::parse(&s).unwrap(), id);
    }

    #[test]
    fn test_id_serde_uses_hex_string() {
        let id = TxId::from_bytes([0xab; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(16)));
        let back: TxId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_id_parse_rejects_garbage() {
        assert!(TxId::parse("not-a-tx").is_err());
    }
}
