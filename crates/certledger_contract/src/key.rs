//! Composite keys for world state documents.
//!
//! A key is `U+0000 docType U+0000 (segment U+0000)*`. The separator and
//! `U+10FFFF` never occur inside a component, which makes the encoding
//! injective and gives every doc type a contiguous key range.

use certledger_core::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};

/// Separator between key components
pub const SEPARATOR: char = '\u{0}';

/// Highest code point; reserved so it can close a prefix range
pub const MAX_RUNE: char = '\u{10FFFF}';

/// Doc types starting with this are reserved for internal indexes
pub const RESERVED_PREFIX: char = '~';

const TOMBSTONE_TAG: &str = "~deleted~";

fn check_component(what: &str, value: &str) -> LedgerResult<()> {
    if value.is_empty() {
        return Err(LedgerError::key(format!("{what} must not be empty")));
    }
    if value.contains(SEPARATOR) || value.contains(MAX_RUNE) {
        return Err(LedgerError::key(format!(
            "{what} {value:?} contains a reserved character"
        )));
    }
    Ok(())
}

fn check_doc_type(doc_type: &str) -> LedgerResult<()> {
    check_component("doc type", doc_type)?;
    if doc_type.starts_with(RESERVED_PREFIX) {
        return Err(LedgerError::key(format!("doc type {doc_type:?} is reserved")));
    }
    Ok(())
}

fn compose<S: AsRef<str>>(doc_type: &str, segments: &[S]) -> LedgerResult<String> {
    let mut key = String::with_capacity(
        2 + doc_type.len() + segments.iter().map(|s| s.as_ref().len() + 1).sum::<usize>(),
    );
    key.push(SEPARATOR);
    key.push_str(doc_type);
    key.push(SEPARATOR);
    for segment in segments {
        let segment = segment.as_ref();
        check_component("key segment", segment)?;
        key.push_str(segment);
        key.push(SEPARATOR);
    }
    Ok(key)
}

/// Derive the composite key of a document
///
/// # Errors
///
/// Returns `KeyConstruction` if the doc type is empty or reserved, or a
/// segment is empty or contains a reserved character
pub fn derive_key<S: AsRef<str>>(doc_type: &str, segments: &[S]) -> LedgerResult<String> {
    check_doc_type(doc_type)?;
    compose(doc_type, segments)
}

/// Doc type under which deletions of `doc_type` are recorded
#[must_use]
pub fn tombstone_doc_type(doc_type: &str) -> String {
    format!("{TOMBSTONE_TAG}{doc_type}")
}

/// Derive the key recording the deletion of `primary_key`
///
/// The result lives in a key range disjoint from every primary key, so
/// writing it never touches the history of the primary document.
///
/// # Errors
///
/// Returns `KeyConstruction` if `primary_key` is not a key of `doc_type`
pub fn derive_tombstone_key(doc_type: &str, primary_key: &str) -> LedgerResult<String> {
    check_doc_type(doc_type)?;
    let (key_type, segments) = split_key(primary_key)?;
    if key_type != doc_type {
        return Err(LedgerError::key(format!(
            "key of doc type {key_type:?} is not a {doc_type:?} key"
        )));
    }
    compose(&tombstone_doc_type(doc_type), &segments)
}

/// Split a composite key into its doc type and segments
///
/// # Errors
///
/// Returns `KeyConstruction` if `key` is not a composite key
pub fn split_key(key: &str) -> LedgerResult<(String, Vec<String>)> {
    let body = key
        .strip_prefix(SEPARATOR)
        .and_then(|rest| rest.strip_suffix(SEPARATOR))
        .ok_or_else(|| LedgerError::key("not a composite key"))?;
    let mut parts = body.split(SEPARATOR);
    let doc_type = parts.next().unwrap_or_default().to_string();
    check_component("doc type", &doc_type)?;
    let segments: Vec<String> = parts.map(str::to_string).collect();
    for segment in &segments {
        check_component("key segment", segment)?;
    }
    Ok((doc_type, segments))
}

/// Half-open range `[start, end)` covering every key of `doc_type`
///
/// # Errors
///
/// Returns `KeyConstruction` for an empty or reserved doc type
pub fn prefix_range(doc_type: &str) -> LedgerResult<(String, String)> {
    check_doc_type(doc_type)?;
    Ok(range_of(doc_type))
}

/// Half-open range covering every tombstone of `doc_type`
///
/// # Errors
///
/// Returns `KeyConstruction` for an empty or reserved doc type
pub fn tombstone_range(doc_type: &str) -> LedgerResult<(String, String)> {
    check_doc_type(doc_type)?;
    Ok(range_of(&tombstone_doc_type(doc_type)))
}

fn range_of(doc_type: &str) -> (String, String) {
    let start = format!("{SEPARATOR}{doc_type}{SEPARATOR}");
    let end = format!("{start}{MAX_RUNE}");
    (start, end)
}

/// Check if `key` belongs to an internal index rather than a document
#[must_use]
pub fn is_reserved_key(key: &str) -> bool {
    key.strip_prefix(SEPARATOR)
        .is_some_and(|rest| rest.starts_with(RESERVED_PREFIX))
}

/// How a logical id is cut into key segments
///
/// An id is the doc type followed by the segments concatenated. Fixed-width
/// segments come first; whatever remains becomes the last segment and must
/// not be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdLayout {
    widths: Vec<usize>,
}

impl Default for IdLayout {
    /// Year, month, day, then a sequence: `CERT20221122103001`
    fn default() -> Self {
        Self::new(vec![4, 2, 2])
    }
}

impl IdLayout {
    /// Layout with the given fixed segment widths (in bytes)
    #[must_use]
    pub fn new(widths: Vec<usize>) -> Self {
        Self { widths }
    }

    /// Fixed segment widths
    #[must_use]
    pub fn widths(&self) -> &[usize] {
        &self.widths
    }

    /// Cut `id` into key segments
    ///
    /// # Errors
    ///
    /// Returns `KeyConstruction` if `id` does not start with `doc_type`, is
    /// too short for the layout, or yields a malformed segment
    pub fn segments(&self, doc_type: &str, id: &str) -> LedgerResult<Vec<String>> {
        check_doc_type(doc_type)?;
        let mut rest = id.strip_prefix(doc_type).ok_or_else(|| {
            LedgerError::key(format!("id {id:?} does not start with {doc_type:?}"))
        })?;

        let mut segments = Vec::with_capacity(self.widths.len() + 1);
        for &width in &self.widths {
            let (head, tail) = match (rest.get(..width), rest.get(width..)) {
                (Some(head), Some(tail)) => (head, tail),
                _ => {
                    return Err(LedgerError::key(format!(
                        "id {id:?} is too short for layout {:?}",
                        self.widths
                    )));
                }
            };
            check_component("key segment", head)?;
            segments.push(head.to_string());
            rest = tail;
        }
        check_component("key segment", rest)
            .map_err(|_| LedgerError::key(format!("id {id:?} has no sequence part")))?;
        segments.push(rest.to_string());
        Ok(segments)
    }
}

/// Maps logical ids to composite keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyIndex {
    layout: IdLayout,
}

impl KeyIndex {
    /// Key index using `layout` for every doc type
    #[must_use]
    pub fn new(layout: IdLayout) -> Self {
        Self { layout }
    }

    /// Id layout in use
    #[must_use]
    pub fn layout(&self) -> &IdLayout {
        &self.layout
    }

    /// Composite key of the document `id` of type `doc_type`
    ///
    /// # Errors
    ///
    /// Returns `KeyConstruction` for a malformed doc type or id
    pub fn key_for_id(&self, doc_type: &str, id: &str) -> LedgerResult<String> {
        let segments = self.layout.segments(doc_type, id)?;
        derive_key(doc_type, &segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_derive_key_layout() {
        let key = derive_key("CERT", &["2022", "11", "22", "103001"]).unwrap();
        assert_eq!(key, "\u{0}CERT\u{0}2022\u{0}11\u{0}22\u{0}103001\u{0}");
    }

    #[test]
    fn test_derive_key_rejects_bad_input() {
        assert!(derive_key("", &["a"]).is_err());
        assert!(derive_key("~x", &["a"]).is_err());
        assert!(derive_key("CERT", &[""]).is_err());
        assert!(derive_key("CERT", &["a\u{0}b"]).is_err());
        assert!(derive_key("CE\u{0}RT", &["a"]).is_err());
        assert!(derive_key("CERT", &["\u{10FFFF}"]).is_err());
    }

    #[test]
    fn test_key_for_id() {
        let index = KeyIndex::default();
        let key = index.key_for_id("CERT", "CERT20221122103001").unwrap();
        assert_eq!(
            split_key(&key).unwrap(),
            (
                "CERT".to_string(),
                vec!["2022".into(), "11".into(), "22".into(), "103001".into()]
            )
        );
        let (doc_type, segments) = split_key(&key).unwrap();
        assert_eq!(doc_type + &segments.concat(), "CERT20221122103001");
    }

    #[test]
    fn test_id_errors() {
        let index = KeyIndex::default();
        assert!(index.key_for_id("CERT", "DIPL20221122103001").is_err());
        assert!(index.key_for_id("CERT", "CERT2022112").is_err());
        assert!(index.key_for_id("CERT", "CERT20221122").is_err());
        assert!(index.key_for_id("CERT", "").is_err());
        assert!(index.key_for_id("CERT", "CERT202é1122x").is_err());
    }

    #[test]
    fn test_tombstone_key_is_disjoint() {
        let primary = derive_key("CERT", &["2022", "11", "22", "1"]).unwrap();
        let tomb = derive_tombstone_key("CERT", &primary).unwrap();
        assert_ne!(tomb, primary);
        assert!(is_reserved_key(&tomb));
        assert!(!is_reserved_key(&primary));

        let (start, end) = prefix_range("CERT").unwrap();
        assert!(primary >= start && primary < end);
        assert!(!(tomb >= start && tomb < end));

        let (start, end) = tombstone_range("CERT").unwrap();
        assert!(tomb >= start && tomb < end);
        let (tomb_type, segments) = split_key(&tomb).unwrap();
        assert_eq!(tomb_type, tombstone_doc_type("CERT"));
        assert_eq!(segments, vec!["2022", "11", "22", "1"]);
    }

    #[test]
    fn test_tombstone_key_checks_doc_type() {
        let primary = derive_key("CERT", &["a"]).unwrap();
        assert!(derive_tombstone_key("DIPL", &primary).is_err());
        assert!(derive_tombstone_key("CERT", "plain").is_err());
    }

    #[test]
    fn test_split_key_rejects_garbage() {
        assert!(split_key("").is_err());
        assert!(split_key("\u{0}").is_err());
        assert!(split_key("CERT\u{0}").is_err());
        assert!(split_key("\u{0}CERT\u{0}\u{0}").is_err());
    }

    #[test]
    fn test_prefix_range_excludes_longer_doc_type() {
        let (start, end) = prefix_range("CERT").unwrap();
        let other = derive_key("CERTX", &["1"]).unwrap();
        assert!(!(other >= start && other < end));
    }

    #[test]
    fn test_layout_serde() {
        let layout: IdLayout = serde_json::from_str("[4,2]").unwrap();
        assert_eq!(layout.widths(), &[4, 2]);
        assert_eq!(
            layout.segments("CERT", "CERT202211x").unwrap(),
            vec!["2022", "11", "x"]
        );
    }

    fn segment() -> impl Strategy<Value = String> {
        "[^\\x00\\x{10FFFF}]{1,6}"
    }

    proptest! {
        #[test]
        fn prop_split_inverts_derive(
            doc_type in "[A-Z]{1,5}",
            segments in prop::collection::vec(segment(), 0..5),
        ) {
            let key = derive_key(&doc_type, &segments).unwrap();
            prop_assert_eq!(split_key(&key).unwrap(), (doc_type, segments));
        }

        #[test]
        fn prop_distinct_tuples_distinct_keys(
            a in prop::collection::vec(segment(), 1..4),
            b in prop::collection::vec(segment(), 1..4),
        ) {
            let ka = derive_key("CERT", &a).unwrap();
            let kb = derive_key("CERT", &b).unwrap();
            prop_assert_eq!(a == b, ka == kb);
        }

        #[test]
        fn prop_keys_stay_in_prefix_range(segments in prop::collection::vec(segment(), 0..4)) {
            let key = derive_key("CERT", &segments).unwrap();
            let (start, end) = prefix_range("CERT").unwrap();
            prop_assert!(key >= start && key < end);
        }
    }
}
