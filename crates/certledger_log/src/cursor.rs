//! Cursor over the modifications of one key.

use certledger_core::{LogicalTime, Timestamp, TxId};

/// One historical modification of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyModification {
    /// Commit sequence of the record holding the write
    pub seq: LogicalTime,
    /// Transaction that wrote it
    pub tx_id: TxId,
    /// Transaction timestamp
    pub timestamp: Timestamp,
    /// Written value, `None` for a deletion
    pub value: Option<Vec<u8>>,
}

impl KeyModification {
    /// Check if this modification removed the key
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        self.value.is_none()
    }
}

/// Forward cursor over a key's history, oldest first
///
/// The cursor owns a copy of the modifications taken when it was created,
/// so it holds no lock on the log and is released when dropped.
#[derive(Debug, Clone, Default)]
pub struct HistoryCursor {
    entries: Vec<KeyModification>,
    position: usize,
}

impl HistoryCursor {
    /// Create a cursor over `entries`
    #[must_use]
    pub fn new(entries: Vec<KeyModification>) -> Self {
        Self {
            entries,
            position: 0,
        }
    }

    /// Check if there are more entries
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.position < self.entries.len()
    }

    /// Remaining entry count
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.entries.len().saturating_sub(self.position)
    }
}

impl Iterator for HistoryCursor {
    type Item = KeyModification;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.position).cloned()?;
        self.position += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modification(seq: u64, value: Option<&[u8]>) -> KeyModification {
        KeyModification {
            seq: LogicalTime::from_raw(seq),
            tx_id: TxId::new(),
            timestamp: Timestamp::new(seq as i64, 0),
            value: value.map(<[u8]>::to_vec),
        }
    }

    #[test]
    fn test_cursor_empty() {
        let mut cursor = HistoryCursor::default();
        assert!(!cursor.has_next());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_cursor_iterates_in_order() {
        let mut cursor = HistoryCursor::new(vec![
            modification(1, Some(b"a")),
            modification(2, None),
        ]);
        assert_eq!(cursor.remaining(), 2);
        assert_eq!(cursor.next().unwrap().seq.as_u64(), 1);
        let last = cursor.next().unwrap();
        assert!(last.is_delete());
        assert_eq!(cursor.remaining(), 0);
        assert!(!cursor.has_next());
    }
}
