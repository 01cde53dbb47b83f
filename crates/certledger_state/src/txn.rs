//! Optimistic transactions over the world state.

use crate::bookmark;
use crate::context::{KeyValue, QueryMetadata, StateIterator, TxContext};
use crate::selector::Query;
use crate::state::{Versioned, WorldState};
use certledger_core::{LedgerError, LedgerResult, LogicalTime, Timestamp, TxId};
use certledger_log::{HistoryCursor, Write};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;

/// A range scan observed by a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RangeRead {
    start: String,
    end: Option<String>,
    observed: Vec<(String, LogicalTime)>,
}

impl RangeRead {
    fn bounds(&self) -> (Bound<&str>, Bound<&str>) {
        (
            Bound::Included(self.start.as_str()),
            self.end.as_deref().map_or(Bound::Unbounded, Bound::Excluded),
        )
    }

    /// First key that appeared, vanished or changed inside the range
    pub(crate) fn changed_key(&self, entries: &BTreeMap<String, Versioned>) -> Option<String> {
        let mut now = entries.range::<str, _>(self.bounds());
        let mut seen = self.observed.iter();
        loop {
            match (now.next(), seen.next()) {
                (None, None) => return None,
                (Some((key, v)), Some((seen_key, seen_version))) => {
                    if key != seen_key {
                        return Some(key.min(seen_key).clone());
                    }
                    if v.version != *seen_version {
                        return Some(key.clone());
                    }
                }
                (Some((key, _)), None) => return Some(key.clone()),
                (None, Some((seen_key, _))) => return Some(seen_key.clone()),
            }
        }
    }
}

/// A unit of work against a [`WorldState`]
///
/// Reads see the transaction's own staged writes and otherwise the latest
/// committed values. Nothing is visible to others until [`commit`]
/// succeeds; dropping the transaction discards it.
///
/// [`commit`]: Transaction::commit
#[derive(Debug)]
pub struct Transaction<'a> {
    state: &'a WorldState,
    tx_id: TxId,
    timestamp: Timestamp,
    reads: BTreeMap<String, Option<LogicalTime>>,
    ranges: Vec<RangeRead>,
    writes: IndexMap<String, Option<Vec<u8>>>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(state: &'a WorldState, tx_id: TxId, timestamp: Timestamp) -> Self {
        Self {
            state,
            tx_id,
            timestamp,
            reads: BTreeMap::new(),
            ranges: Vec::new(),
            writes: IndexMap::new(),
        }
    }

    /// Validate reads and apply the staged writes
    ///
    /// Returns the commit sequence, or `None` when nothing was written.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if a key read by this transaction changed since,
    /// in which case nothing is applied
    pub fn commit(self) -> LedgerResult<Option<LogicalTime>> {
        let writes = self
            .writes
            .into_iter()
            .map(|(key, value)| Write { key, value })
            .collect();
        self.state
            .commit(self.tx_id, self.timestamp, &self.reads, &self.ranges, writes)
    }

    /// Discard the staged writes
    pub fn discard(self) {
        tracing::debug!(tx_id = %self.tx_id, staged = self.writes.len(), "transaction discarded");
    }

    /// Number of staged writes
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Merged view of `[start, end)`: committed values overlaid with staged writes
    fn merged_range(
        &mut self,
        start: &str,
        end: Option<&str>,
        record: bool,
    ) -> LedgerResult<Vec<KeyValue>> {
        let bounds = (
            Bound::Included(start),
            end.map_or(Bound::Unbounded, Bound::Excluded),
        );
        let mut view: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        {
            let inner = self.state.read()?;
            let mut observed = Vec::new();
            for (key, versioned) in inner.entries.range::<str, _>(bounds) {
                if record {
                    observed.push((key.clone(), versioned.version));
                }
                view.insert(key.clone(), versioned.value.clone());
            }
            if record {
                self.ranges.push(RangeRead {
                    start: start.to_string(),
                    end: end.map(str::to_string),
                    observed,
                });
            }
        }

        for (key, value) in &self.writes {
            let in_range = key.as_str() >= start && end.is_none_or(|end| key.as_str() < end);
            if !in_range {
                continue;
            }
            match value {
                Some(value) => {
                    view.insert(key.clone(), value.clone());
                }
                None => {
                    view.remove(key);
                }
            }
        }

        Ok(view
            .into_iter()
            .map(|(key, value)| KeyValue { key, value })
            .collect())
    }

    /// Every live key whose value is a JSON object matching `query`, key order
    fn matching(&mut self, query: &Query) -> LedgerResult<Vec<(KeyValue, Value)>> {
        let all = self.merged_range("", None, false)?;
        Ok(all
            .into_iter()
            .filter_map(|kv| {
                let doc: Value = serde_json::from_slice(&kv.value).ok()?;
                (doc.is_object() && query.matches(&doc)).then_some((kv, doc))
            })
            .collect())
    }
}

fn projected(query: &Query, kv: KeyValue, doc: Value) -> KeyValue {
    if !query.has_projection() {
        return kv;
    }
    KeyValue {
        key: kv.key,
        value: query.project(doc).to_string().into_bytes(),
    }
}

fn check_key(key: &str) -> LedgerResult<()> {
    if key.is_empty() {
        return Err(LedgerError::invalid_argument("key", "key must not be empty"));
    }
    Ok(())
}

impl TxContext for Transaction<'_> {
    fn tx_id(&self) -> TxId {
        self.tx_id
    }

    fn tx_timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn get_state(&mut self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        check_key(key)?;
        if let Some(staged) = self.writes.get(key) {
            return Ok(staged.clone());
        }
        let inner = self.state.read()?;
        let current = inner.entries.get(key);
        self.reads
            .entry(key.to_string())
            .or_insert_with(|| current.map(|v| v.version));
        Ok(current.map(|v| v.value.clone()))
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> LedgerResult<()> {
        check_key(key)?;
        let limit = self.state.config().max_value_size;
        if limit > 0 && value.len() > limit {
            return Err(LedgerError::storage(format!(
                "value of {} bytes exceeds limit {limit}",
                value.len()
            )));
        }
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn del_state(&mut self, key: &str) -> LedgerResult<()> {
        check_key(key)?;
        self.writes.insert(key.to_string(), None);
        Ok(())
    }

    fn get_state_by_range(&mut self, start: &str, end: &str) -> LedgerResult<StateIterator> {
        let end = (!end.is_empty()).then_some(end);
        if end.is_some_and(|end| start > end) {
            return Err(LedgerError::invalid_argument(
                "range",
                "start key sorts after end key",
            ));
        }
        Ok(StateIterator::new(self.merged_range(start, end, true)?))
    }

    fn get_query_result(&mut self, query: &str) -> LedgerResult<StateIterator> {
        let parsed = Query::parse(query)?;
        let results: Vec<KeyValue> = self
            .matching(&parsed)?
            .into_iter()
            .skip(parsed.skip())
            .take(parsed.limit().unwrap_or(usize::MAX))
            .map(|(kv, doc)| projected(&parsed, kv, doc))
            .collect();
        tracing::debug!(tx_id = %self.tx_id, results = results.len(), "selector query");
        Ok(StateIterator::new(results))
    }

    fn get_query_result_with_pagination(
        &mut self,
        query: &str,
        page_size: i32,
        bookmark: &str,
    ) -> LedgerResult<(StateIterator, QueryMetadata)> {
        if page_size <= 0 {
            return Err(LedgerError::invalid_argument(
                "pageSize",
                format!("must be positive, got {page_size}"),
            ));
        }
        let document: Value = serde_json::from_str(query)
            .map_err(|e| LedgerError::query(format!("query is not JSON: {e}")))?;
        let parsed = Query::from_value(&document)?;
        if parsed.limit().is_some() || parsed.skip() > 0 {
            return Err(LedgerError::query(
                "limit and skip cannot be combined with pagination",
            ));
        }
        let resume = bookmark::decode(&document, bookmark)?;
        let page_size = usize::try_from(page_size)
            .unwrap_or(usize::MAX)
            .min(self.state.config().max_page_size.max(1));

        let mut remaining = self
            .matching(&parsed)?
            .into_iter()
            .filter(|(kv, _)| resume.as_ref().is_none_or(|after| kv.key.as_str() > after.as_str()))
            .peekable();
        let page: Vec<KeyValue> = remaining
            .by_ref()
            .take(page_size)
            .map(|(kv, doc)| projected(&parsed, kv, doc))
            .collect();
        let more = remaining.peek().is_some();

        let next = match page.last() {
            Some(last) if more => bookmark::encode(&document, &last.key),
            _ => String::new(),
        };
        let metadata = QueryMetadata {
            fetched_records_count: i32::try_from(page.len()).unwrap_or(i32::MAX),
            bookmark: next,
        };
        tracing::debug!(
            tx_id = %self.tx_id,
            fetched = metadata.fetched_records_count,
            more,
            "paginated selector query"
        );
        Ok((StateIterator::new(page), metadata))
    }

    fn get_history_for_key(&mut self, key: &str) -> LedgerResult<HistoryCursor> {
        check_key(key)?;
        Ok(self.state.read()?.log.history(key))
    }
}
