//! Commit records of the append-only log.
//!
//! One committed transaction is one record. Records are hash-chained: each
//! record's hash covers the previous record's hash and its own canonical body.

use crate::encoding::{CanonicalEncode, EncodeError};
use certledger_core::{Hash, LogicalTime, Timestamp, TxId};
use serde::{Deserialize, Serialize};

/// A single key mutation inside a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Write {
    /// World state key
    pub key: String,
    /// New value, `None` for a deletion
    pub value: Option<Vec<u8>>,
}

impl Write {
    /// An upsert of `key`
    pub fn put(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value: Some(value),
        }
    }

    /// A deletion of `key`
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Check if this write removes the key
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        self.value.is_none()
    }
}

/// The hashed part of a commit record
#[derive(Serialize)]
struct CommitBody<'a> {
    seq: LogicalTime,
    tx_id: &'a TxId,
    timestamp: &'a Timestamp,
    writes: &'a [Write],
}

impl CanonicalEncode for CommitBody<'_> {}

/// A committed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Commit order, starting at 1
    pub seq: LogicalTime,
    /// Transaction that produced the writes
    pub tx_id: TxId,
    /// Transaction timestamp
    pub timestamp: Timestamp,
    /// Mutations in the order they were staged
    pub writes: Vec<Write>,
    /// Hash of the previous record
    pub prev_hash: Hash,
    /// Hash of this record
    pub hash: Hash,
}

impl CanonicalEncode for CommitRecord {}

impl CommitRecord {
    /// Build a record linked to `prev_hash`
    ///
    /// # Errors
    ///
    /// Returns error if the body cannot be canonically encoded
    pub fn seal(
        seq: LogicalTime,
        tx_id: TxId,
        timestamp: Timestamp,
        writes: Vec<Write>,
        prev_hash: Hash,
    ) -> Result<Self, EncodeError> {
        let hash = Self::compute_hash(seq, &tx_id, &timestamp, &writes, &prev_hash)?;
        Ok(Self {
            seq,
            tx_id,
            timestamp,
            writes,
            prev_hash,
            hash,
        })
    }

    /// Check the record's own hash and its link to `expected_prev`
    #[must_use]
    pub fn verify(&self, expected_prev: &Hash) -> bool {
        if self.prev_hash != *expected_prev {
            return false;
        }
        Self::compute_hash(
            self.seq,
            &self.tx_id,
            &self.timestamp,
            &self.writes,
            &self.prev_hash,
        )
        .map(|h| h == self.hash)
        .unwrap_or(false)
    }

    /// Keys touched by this record
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.writes.iter().map(|w| w.key.as_str())
    }

    fn compute_hash(
        seq: LogicalTime,
        tx_id: &TxId,
        timestamp: &Timestamp,
        writes: &[Write],
        prev_hash: &Hash,
    ) -> Result<Hash, EncodeError> {
        let body = CommitBody {
            seq,
            tx_id,
            timestamp,
            writes,
        }
        .encode()?;
        Ok(prev_hash.chain(&body))
    }
}
