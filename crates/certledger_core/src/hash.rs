//! BLAKE3 digests linking commit records and fingerprinting queries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte BLAKE3 digest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Digest of `data`
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Link before the first commit record
    #[must_use]
    pub const fn genesis() -> Self {
        Self([0u8; 32])
    }

    /// Raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Digest of `self || data`; each commit record hashes onto its predecessor
    #[must_use]
    pub fn chain(&self, data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.0);
        hasher.update(data);
        Self(*hasher.finalize().as_bytes())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_is_deterministic() {
        assert_eq!(Hash::compute(b"cert"), Hash::compute(b"cert"));
        assert_ne!(Hash::compute(b"cert"), Hash::compute(b"cart"));
    }

    #[test]
    fn test_display_is_hex() {
        let shown = Hash::compute(b"data").to_string();
        assert_eq!(shown.len(), 64);
        assert!(shown.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(Hash::genesis().to_string(), "0".repeat(64));
    }

    #[test]
    fn test_chain_depends_on_both_sides() {
        let a = Hash::genesis().chain(b"one");
        let b = Hash::genesis().chain(b"two");
        let c = Hash::compute(b"x").chain(b"one");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Hash::compute(b"one"));
    }
}
