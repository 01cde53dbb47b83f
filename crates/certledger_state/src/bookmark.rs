//! Opaque pagination bookmarks.
//!
//! A bookmark is the hex of an 8-byte fingerprint of the query followed by
//! the hex of the last key returned. The fingerprint ties a bookmark to the
//! query that produced it.

use certledger_core::{Hash, LedgerError, LedgerResult};
use serde_json::Value;

const FINGERPRINT_LEN: usize = 8;
const FINGERPRINT_HEX_LEN: usize = FINGERPRINT_LEN * 2;

/// Fingerprint of a query document, independent of member order and spacing
#[must_use]
pub fn fingerprint(query: &Value) -> [u8; FINGERPRINT_LEN] {
    let canonical = query.to_string();
    let hash = Hash::compute(canonical.as_bytes());
    let mut out = [0u8; FINGERPRINT_LEN];
    out.copy_from_slice(&hash.as_bytes()[..FINGERPRINT_LEN]);
    out
}

/// Build the bookmark that resumes after `last_key`
#[must_use]
pub fn encode(query: &Value, last_key: &str) -> String {
    let mut out = hex::encode(fingerprint(query));
    out.push_str(&hex::encode(last_key.as_bytes()));
    out
}

/// Recover the resume key from a bookmark, `None` for the empty bookmark
///
/// # Errors
///
/// Returns `InvalidArgument` if the bookmark is malformed or was issued for
/// a different query
pub fn decode(query: &Value, bookmark: &str) -> LedgerResult<Option<String>> {
    if bookmark.is_empty() {
        return Ok(None);
    }
    let invalid = |reason: &str| LedgerError::invalid_argument("bookmark", reason);

    if bookmark.len() <= FINGERPRINT_HEX_LEN || !bookmark.is_ascii() {
        return Err(invalid("malformed bookmark"));
    }
    let (print, key) = bookmark.split_at(FINGERPRINT_HEX_LEN);
    let print = hex::decode(print).map_err(|_| invalid("malformed bookmark"))?;
    if print.as_slice() != fingerprint(query).as_slice() {
        return Err(invalid("bookmark was issued for a different query"));
    }
    let key = hex::decode(key).map_err(|_| invalid("malformed bookmark"))?;
    String::from_utf8(key)
        .map(Some)
        .map_err(|_| invalid("malformed bookmark"))
}
