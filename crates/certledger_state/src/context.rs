//! The transactional interface contracts run inside.

use certledger_core::{LedgerResult, Timestamp, TxId};
use certledger_log::HistoryCursor;
use serde::{Deserialize, Serialize};

/// A key and the bytes stored under it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// World state key
    pub key: String,
    /// Stored bytes
    pub value: Vec<u8>,
}

/// Iterator over a point-in-time result set
///
/// Results are materialized when the iterator is created, so it holds no
/// lock on the world state. Dropping it releases everything.
#[derive(Debug, Clone, Default)]
pub struct StateIterator {
    results: std::vec::IntoIter<KeyValue>,
}

impl StateIterator {
    /// Wrap a materialized result set
    #[must_use]
    pub fn new(results: Vec<KeyValue>) -> Self {
        Self {
            results: results.into_iter(),
        }
    }

    /// Check if more results remain
    #[must_use]
    pub fn has_next(&self) -> bool {
        !self.results.as_slice().is_empty()
    }
}

impl Iterator for StateIterator {
    type Item = KeyValue;

    fn next(&mut self) -> Option<Self::Item> {
        self.results.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.results.size_hint()
    }
}

impl ExactSizeIterator for StateIterator {}

/// Metadata returned with a page of query results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    /// Records in this page
    pub fetched_records_count: i32,
    /// Resume point; empty when the result set is exhausted
    pub bookmark: String,
}

/// One unit of work against the world state
///
/// Every contract operation receives exactly one context. Reads are
/// recorded so the substrate can detect conflicting concurrent commits.
pub trait TxContext {
    /// Id of the enclosing transaction
    fn tx_id(&self) -> TxId;

    /// Timestamp of the enclosing transaction
    fn tx_timestamp(&self) -> Timestamp;

    /// Read a key, `None` if absent
    ///
    /// # Errors
    ///
    /// Returns `Storage` on substrate failure, never on absence
    fn get_state(&mut self, key: &str) -> LedgerResult<Option<Vec<u8>>>;

    /// Stage an upsert
    ///
    /// # Errors
    ///
    /// Returns error for an empty key or an oversized value
    fn put_state(&mut self, key: &str, value: Vec<u8>) -> LedgerResult<()>;

    /// Stage a deletion
    ///
    /// # Errors
    ///
    /// Returns error for an empty key
    fn del_state(&mut self, key: &str) -> LedgerResult<()>;

    /// Keys in `[start, end)` in key order; an empty `end` is unbounded
    ///
    /// # Errors
    ///
    /// Returns `Storage` on substrate failure
    fn get_state_by_range(&mut self, start: &str, end: &str) -> LedgerResult<StateIterator>;

    /// Run a selector query
    ///
    /// # Errors
    ///
    /// Returns `Query` if the query document is rejected
    fn get_query_result(&mut self, query: &str) -> LedgerResult<StateIterator>;

    /// Run a selector query one page at a time
    ///
    /// # Errors
    ///
    /// Returns `Query` for a rejected query and `InvalidArgument` for a bad
    /// page size or bookmark
    fn get_query_result_with_pagination(
        &mut self,
        query: &str,
        page_size: i32,
        bookmark: &str,
    ) -> LedgerResult<(StateIterator, QueryMetadata)>;

    /// Every committed modification of `key`, oldest first
    ///
    /// # Errors
    ///
    /// Returns `Storage` on substrate failure
    fn get_history_for_key(&mut self, key: &str) -> LedgerResult<HistoryCursor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_iterator() {
        let mut it = StateIterator::new(vec![
            KeyValue { key: "a".into(), value: vec![1] },
            KeyValue { key: "b".into(), value: vec![2] },
        ]);
        assert!(it.has_next());
        assert_eq!(it.len(), 2);
        assert_eq!(it.next().unwrap().key, "a");
        assert_eq!(it.next().unwrap().key, "b");
        assert!(!it.has_next());
    }

    #[test]
    fn test_metadata_json_shape() {
        let meta = QueryMetadata {
            fetched_records_count: 3,
            bookmark: String::new(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json, serde_json::json!({"fetchedRecordsCount": 3, "bookmark": ""}));
    }
}
