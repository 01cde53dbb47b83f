//! Selector and paginated queries over stored documents.

use crate::model::PaginatedQueryResponse;
use certledger_core::{Codec, LedgerError, LedgerResult};
use certledger_state::{StateIterator, TxContext};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Member carried by every tombstone and by no document
const TOMBSTONE_MARKER: &str = "tombstoneOf";

/// Runs structured queries through the substrate's selector engine
///
/// Selector documents are passed through unchanged, except that a selector
/// which never names `tombstoneOf` is narrowed to exclude tombstones.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    codec: Arc<dyn Codec>,
}

impl QueryEngine {
    /// Create an engine decoding records with `codec`
    #[must_use]
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }

    /// Every record matching `query`, in key order
    ///
    /// # Errors
    ///
    /// Returns `Query` if the query is rejected or a record cannot be
    /// decoded as `T`
    pub fn query_by_selector<T: DeserializeOwned>(
        &self,
        ctx: &mut dyn TxContext,
        query: &Value,
    ) -> LedgerResult<Vec<T>> {
        let results = ctx.get_query_result(&without_tombstones(query).to_string())?;
        self.decode_all(results)
    }

    /// One page of records matching `query`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty query, a bad page size or a
    /// bad bookmark, and `Query` if the query is rejected
    pub fn query_paginated(
        &self,
        ctx: &mut dyn TxContext,
        query: &Value,
        page_size: i32,
        bookmark: &str,
    ) -> LedgerResult<PaginatedQueryResponse> {
        if is_empty_query(query) {
            return Err(LedgerError::invalid_argument("queryString", "missing query string"));
        }
        let (results, metadata) = ctx.get_query_result_with_pagination(
            &without_tombstones(query).to_string(),
            page_size,
            bookmark,
        )?;
        let records = self.decode_all(results)?;
        Ok(PaginatedQueryResponse {
            records,
            fetched_records_count: metadata.fetched_records_count,
            bookmark: metadata.bookmark,
        })
    }

    fn decode_all<T: DeserializeOwned>(&self, results: StateIterator) -> LedgerResult<Vec<T>> {
        results
            .map(|kv| {
                self.codec
                    .decode(&kv.key, &kv.value)
                    .map_err(|e| LedgerError::query(format!("malformed record: {e}")))
            })
            .collect()
    }
}

fn without_tombstones(query: &Value) -> Value {
    let Some(selector) = query.get("selector").filter(|s| s.is_object()) else {
        return query.clone();
    };
    if names_member(selector, TOMBSTONE_MARKER) {
        return query.clone();
    }
    let mut absent = Map::new();
    absent.insert("$exists".to_string(), Value::Bool(false));
    let mut guard = Map::new();
    guard.insert(TOMBSTONE_MARKER.to_string(), Value::Object(absent));

    let mut and = Map::new();
    and.insert(
        "$and".to_string(),
        Value::Array(vec![selector.clone(), Value::Object(guard)]),
    );
    let mut scoped = query.clone();
    scoped["selector"] = Value::Object(and);
    scoped
}

// True if any field path in the selector starts at `member`.
fn names_member(selector: &Value, member: &str) -> bool {
    match selector {
        Value::Object(fields) => fields.iter().any(|(name, operand)| {
            name == member
                || name.strip_prefix(member).is_some_and(|rest| rest.starts_with('.'))
                || names_member(operand, member)
        }),
        Value::Array(items) => items.iter().any(|item| names_member(item, member)),
        _ => false,
    }
}

fn is_empty_query(query: &Value) -> bool {
    match query {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(members) => members.is_empty(),
        _ => false,
    }
}
