//! The commit log: every committed transaction, in commit order.

use crate::cursor::{HistoryCursor, KeyModification};
use crate::file::LogFile;
use crate::record::{CommitRecord, Write};
use certledger_core::{Hash, LedgerError, LedgerResult, LogicalTime, Timestamp, TxId};
use std::collections::HashMap;
use std::path::Path;

/// Append-only commit log indexed by key
#[derive(Debug, Default)]
pub struct CommitLog {
    records: Vec<CommitRecord>,
    /// Record positions per key, ascending
    by_key: HashMap<String, Vec<usize>>,
    tip: Hash,
    sink: Option<LogFile>,
}

impl CommitLog {
    /// Create an empty in-memory log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from records, verifying the chain
    ///
    /// # Errors
    ///
    /// Returns `BrokenChain` at the first record that does not verify
    pub fn from_records(records: Vec<CommitRecord>) -> LedgerResult<Self> {
        let mut log = Self::new();
        for record in records {
            let expected_seq = log.next_seq();
            if record.seq != expected_seq || !record.verify(&log.tip) {
                return Err(LedgerError::BrokenChain {
                    position: log.records.len() as u64,
                });
            }
            log.index(record);
        }
        Ok(log)
    }

    /// Open a file-backed log, replaying what the file already holds
    ///
    /// # Errors
    ///
    /// Returns error if the file is unreadable or its chain is broken
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let (sink, records) = LogFile::open(path)?;
        let mut log = Self::from_records(records)?;
        tracing::info!(
            path = %path.display(),
            records = log.len(),
            "replayed commit log"
        );
        log.sink = Some(sink);
        Ok(log)
    }

    /// Append a commit, persisting it first when file-backed
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be encoded or persisted
    pub fn append(
        &mut self,
        tx_id: TxId,
        timestamp: Timestamp,
        writes: Vec<Write>,
    ) -> LedgerResult<&CommitRecord> {
        let record = CommitRecord::seal(self.next_seq(), tx_id, timestamp, writes, self.tip)
            .map_err(|e| LedgerError::storage(e.to_string()))?;
        if let Some(sink) = self.sink.as_mut() {
            sink.append(&record)?;
        }
        let position = self.index(record);
        Ok(&self.records[position])
    }

    fn index(&mut self, record: CommitRecord) -> usize {
        let position = self.records.len();
        for key in record.keys() {
            let positions = self.by_key.entry(key.to_string()).or_default();
            if positions.last() != Some(&position) {
                positions.push(position);
            }
        }
        self.tip = record.hash;
        self.records.push(record);
        position
    }

    /// History of `key`, oldest first
    ///
    /// A record writing the same key twice contributes only its last write.
    #[must_use]
    pub fn history(&self, key: &str) -> HistoryCursor {
        let entries = self
            .by_key
            .get(key)
            .map(|positions| {
                positions
                    .iter()
                    .filter_map(|&p| {
                        let record = &self.records[p];
                        record
                            .writes
                            .iter()
                            .rev()
                            .find(|w| w.key == key)
                            .map(|w| KeyModification {
                                seq: record.seq,
                                tx_id: record.tx_id,
                                timestamp: record.timestamp,
                                value: w.value.clone(),
                            })
                    })
                    .collect()
            })
            .unwrap_or_default();
        HistoryCursor::new(entries)
    }

    /// Verify the whole chain
    ///
    /// # Errors
    ///
    /// Returns `BrokenChain` at the first bad record
    pub fn verify(&self) -> LedgerResult<()> {
        let mut prev = Hash::genesis();
        for (i, record) in self.records.iter().enumerate() {
            if !record.verify(&prev) {
                return Err(LedgerError::BrokenChain { position: i as u64 });
            }
            prev = record.hash;
        }
        Ok(())
    }

    /// All records in commit order
    #[must_use]
    pub fn records(&self) -> &[CommitRecord] {
        &self.records
    }

    /// Sequence number the next commit will get
    #[must_use]
    pub fn next_seq(&self) -> LogicalTime {
        LogicalTime::from_raw(self.records.len() as u64 + 1)
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing was committed yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check if commits are persisted to a file
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.sink.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: i64) -> Timestamp {
        Timestamp::new(s, 0)
    }

    #[test]
    fn test_append_links_chain() {
        let mut log = CommitLog::new();
        let first = log
            .append(TxId::new(), ts(1), vec![Write::put("a", b"1".to_vec())])
            .unwrap()
            .clone();
        let second = log
            .append(TxId::new(), ts(2), vec![Write::put("b", b"2".to_vec())])
            .unwrap()
            .clone();
        assert_eq!(first.seq.as_u64(), 1);
        assert_eq!(second.seq.as_u64(), 2);
        assert_eq!(second.prev_hash, first.hash);
        assert_eq!(log.tip, second.hash);
        assert!(log.verify().is_ok());
    }

    #[test]
    fn test_history_survives_delete() {
        let mut log = CommitLog::new();
        log.append(TxId::new(), ts(1), vec![Write::put("a", b"1".to_vec())]).unwrap();
        log.append(TxId::new(), ts(2), vec![Write::put("b", b"x".to_vec())]).unwrap();
        log.append(TxId::new(), ts(3), vec![Write::put("a", b"2".to_vec())]).unwrap();
        log.append(TxId::new(), ts(4), vec![Write::delete("a")]).unwrap();

        let history: Vec<_> = log.history("a").collect();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].value.as_deref(), Some(&b"1"[..]));
        assert_eq!(history[1].value.as_deref(), Some(&b"2"[..]));
        assert!(history[2].is_delete());
        assert!(history.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn test_history_unknown_key_is_empty() {
        let log = CommitLog::new();
        assert_eq!(log.history("nope").count(), 0);
    }

    #[test]
    fn test_same_key_twice_in_one_commit() {
        let mut log = CommitLog::new();
        log.append(
            TxId::new(),
            ts(1),
            vec![Write::put("a", b"1".to_vec()), Write::put("a", b"2".to_vec())],
        )
        .unwrap();
        let history: Vec<_> = log.history("a").collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].value.as_deref(), Some(&b"2"[..]));
    }

    #[test]
    fn test_from_records_detects_tamper() {
        let mut log = CommitLog::new();
        log.append(TxId::new(), ts(1), vec![Write::put("a", b"1".to_vec())]).unwrap();
        log.append(TxId::new(), ts(2), vec![Write::put("a", b"2".to_vec())]).unwrap();
        let mut records = log.records().to_vec();
        records[1].writes[0].value = Some(b"forged".to_vec());

        let err = CommitLog::from_records(records).unwrap_err();
        assert_eq!(err, LedgerError::BrokenChain { position: 1 });
    }

    #[test]
    fn test_open_replays_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commits.log");
        {
            let mut log = CommitLog::open(&path).unwrap();
            assert!(log.is_persistent());
            log.append(TxId::new(), ts(1), vec![Write::put("a", b"1".to_vec())]).unwrap();
            log.append(TxId::new(), ts(2), vec![Write::delete("a")]).unwrap();
        }
        let log = CommitLog::open(&path).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.next_seq().as_u64(), 3);
        assert_eq!(log.history("a").count(), 2);
    }

    #[test]
    fn test_reopen_after_torn_commit_continues_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commits.log");
        {
            let mut log = CommitLog::open(&path).unwrap();
            log.append(TxId::new(), ts(1), vec![Write::put("a", b"1".to_vec())]).unwrap();
            log.append(TxId::new(), ts(2), vec![Write::put("a", b"2".to_vec())]).unwrap();
        }
        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 5).unwrap();
        drop(file);

        let mut log = CommitLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        let next = log
            .append(TxId::new(), ts(3), vec![Write::put("a", b"3".to_vec())])
            .unwrap()
            .clone();
        assert_eq!(next.seq.as_u64(), 2);
        drop(log);

        let log = CommitLog::open(&path).unwrap();
        assert!(log.verify().is_ok());
        let values: Vec<_> = log.history("a").filter_map(|m| m.value).collect();
        assert_eq!(values, vec![b"1".to_vec(), b"3".to_vec()]);
    }
}
