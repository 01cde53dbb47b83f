//! Versioned world state.
//!
//! Current values live in a sorted map; every committed transaction is
//! first appended to the commit log and then applied to the map, so the map
//! is always a projection of the log.

use crate::config::StoreConfig;
use crate::txn::{RangeRead, Transaction};
use certledger_core::{LedgerError, LedgerResult, LogicalTime, Timestamp, TxId};
use certledger_log::{CommitLog, CommitRecord, Write};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A current value and the commit that wrote it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Versioned {
    pub(crate) value: Vec<u8>,
    pub(crate) version: LogicalTime,
}

#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub(crate) entries: BTreeMap<String, Versioned>,
    pub(crate) log: CommitLog,
}

impl Inner {
    fn apply(&mut self, record: &CommitRecord) {
        for write in &record.writes {
            match &write.value {
                Some(value) => {
                    self.entries.insert(
                        write.key.clone(),
                        Versioned {
                            value: value.clone(),
                            version: record.seq,
                        },
                    );
                }
                None => {
                    self.entries.remove(&write.key);
                }
            }
        }
    }
}

/// The shared, versioned key-value store
///
/// Transactions serialize through optimistic conflict detection: a commit
/// fails if any key it read changed since it was read.
#[derive(Debug)]
pub struct WorldState {
    config: StoreConfig,
    inner: RwLock<Inner>,
}

impl WorldState {
    /// Create an empty in-memory world state
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: StoreConfig::in_memory(),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Open a world state, replaying the commit log file when configured
    ///
    /// # Errors
    ///
    /// Returns error if the log file is unreadable or its chain is broken
    pub fn open(config: StoreConfig) -> LedgerResult<Self> {
        let log = match &config.log_path {
            Some(path) => CommitLog::open(path)?,
            None => CommitLog::new(),
        };
        let mut inner = Inner {
            entries: BTreeMap::new(),
            log: CommitLog::new(),
        };
        for record in log.records() {
            inner.apply(record);
        }
        inner.log = log;
        tracing::debug!(keys = inner.entries.len(), "world state ready");
        Ok(Self {
            config,
            inner: RwLock::new(inner),
        })
    }

    /// Begin a transaction stamped with the current time
    #[must_use]
    pub fn begin(&self) -> Transaction<'_> {
        self.begin_at(Timestamp::now())
    }

    /// Begin a transaction with a fixed timestamp
    #[must_use]
    pub fn begin_at(&self, timestamp: Timestamp) -> Transaction<'_> {
        Transaction::new(self, TxId::new(), timestamp)
    }

    /// Store configuration
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of live keys
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the state lock is poisoned
    pub fn len(&self) -> LedgerResult<usize> {
        Ok(self.read()?.entries.len())
    }

    /// Check if no keys are live
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the state lock is poisoned
    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of committed transactions that wrote something
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the state lock is poisoned
    pub fn height(&self) -> LedgerResult<u64> {
        Ok(self.read()?.log.len() as u64)
    }

    /// Verify the commit log hash chain
    ///
    /// # Errors
    ///
    /// Returns `BrokenChain` at the first bad record
    pub fn verify_log(&self) -> LedgerResult<()> {
        self.read()?.log.verify()
    }

    pub(crate) fn read(&self) -> LedgerResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| LedgerError::storage("world state lock poisoned"))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| LedgerError::storage("world state lock poisoned"))
    }

    /// Validate a transaction's reads and apply its writes atomically
    pub(crate) fn commit(
        &self,
        tx_id: TxId,
        timestamp: Timestamp,
        reads: &BTreeMap<String, Option<LogicalTime>>,
        ranges: &[RangeRead],
        writes: Vec<Write>,
    ) -> LedgerResult<Option<LogicalTime>> {
        let mut inner = self.write()?;

        for (key, seen) in reads {
            let current = inner.entries.get(key).map(|v| v.version);
            if current != *seen {
                return Err(conflict(tx_id, key));
            }
        }
        for range in ranges {
            if let Some(key) = range.changed_key(&inner.entries) {
                return Err(conflict(tx_id, &key));
            }
        }

        if writes.is_empty() {
            return Ok(None);
        }

        let record = inner.log.append(tx_id, timestamp, writes)?.clone();
        inner.apply(&record);
        tracing::info!(
            tx_id = %tx_id,
            seq = record.seq.as_u64(),
            writes = record.writes.len(),
            "committed transaction"
        );
        Ok(Some(record.seq))
    }
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}

fn conflict(tx_id: TxId, key: &str) -> LedgerError {
    let key = certledger_core::printable_key(key);
    tracing::warn!(tx_id = %tx_id, key = %key, "read conflict, transaction rejected");
    LedgerError::Conflict {
        tx_id: tx_id.to_string(),
        key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TxContext;

    #[test]
    fn test_new_is_empty() {
        let state = WorldState::new();
        assert!(state.is_empty().unwrap());
        assert_eq!(state.height().unwrap(), 0);
    }

    #[test]
    fn test_commit_applies_and_logs() {
        let state = WorldState::new();
        let mut tx = state.begin();
        tx.put_state("a", b"1".to_vec()).unwrap();
        tx.put_state("b", b"2".to_vec()).unwrap();
        assert_eq!(tx.commit().unwrap(), Some(LogicalTime::from_raw(1)));

        assert_eq!(state.len().unwrap(), 2);
        assert_eq!(state.height().unwrap(), 1);
        assert!(state.verify_log().is_ok());
    }

    #[test]
    fn test_read_only_commit_appends_nothing() {
        let state = WorldState::new();
        let mut tx = state.begin();
        assert_eq!(tx.get_state("a").unwrap(), None);
        assert_eq!(tx.commit().unwrap(), None);
        assert_eq!(state.height().unwrap(), 0);
    }

    #[test]
    fn test_reopen_rebuilds_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::persistent(dir.path().join("commits.log"));
        {
            let state = WorldState::open(config.clone()).unwrap();
            let mut tx = state.begin();
            tx.put_state("a", b"1".to_vec()).unwrap();
            tx.put_state("b", b"2".to_vec()).unwrap();
            tx.commit().unwrap();
            let mut tx = state.begin();
            tx.del_state("a").unwrap();
            tx.commit().unwrap();
        }

        let state = WorldState::open(config).unwrap();
        assert_eq!(state.len().unwrap(), 1);
        assert_eq!(state.height().unwrap(), 2);
        let mut tx = state.begin();
        assert_eq!(tx.get_state("a").unwrap(), None);
        assert_eq!(tx.get_state("b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(tx.get_history_for_key("a").unwrap().count(), 2);
    }

    #[test]
    fn test_reopen_corrupt_log_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commits.log");
        std::fs::write(&path, b"\x00\x00\x00\x05garbage").unwrap();
        let err = WorldState::open(StoreConfig::persistent(path)).unwrap_err();
        assert_eq!(err.kind(), certledger_core::ErrorKind::StorageError);
    }
}
