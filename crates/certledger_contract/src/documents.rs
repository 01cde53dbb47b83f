//! Typed document access inside one transaction.

use crate::key::{self, KeyIndex};
use crate::model::Tombstone;
use certledger_core::{Codec, LedgerError, LedgerResult, printable_key};
use certledger_state::{StateIterator, TxContext};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

/// Lazily decoded documents from a range scan
///
/// Each item is decoded when it is reached, so a malformed value fails only
/// its own item.
#[derive(Debug)]
pub struct Documents<T> {
    entries: StateIterator,
    codec: Arc<dyn Codec>,
    skip_reserved: bool,
    _doc: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for Documents<T> {
    type Item = LedgerResult<(String, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = self.entries.next()?;
            if self.skip_reserved && key::is_reserved_key(&entry.key) {
                continue;
            }
            let decoded = self.codec.decode(&entry.key, &entry.value);
            return Some(decoded.map(|doc| (entry.key, doc)));
        }
    }
}

/// Reads and writes documents through a transaction context
#[derive(Debug, Clone)]
pub struct DocumentStore {
    keys: KeyIndex,
    codec: Arc<dyn Codec>,
}

impl DocumentStore {
    /// Create a store over the given key index and codec
    #[must_use]
    pub fn new(keys: KeyIndex, codec: Arc<dyn Codec>) -> Self {
        Self { keys, codec }
    }

    /// Key index in use
    #[must_use]
    pub fn keys(&self) -> &KeyIndex {
        &self.keys
    }

    /// Serialization strategy in use
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    /// Resolve the key of `id` and read its raw bytes, if present
    ///
    /// # Errors
    ///
    /// Returns `KeyConstruction` for a malformed id and `Storage` on
    /// substrate failure; absence is not an error
    pub fn exists(
        &self,
        ctx: &mut dyn TxContext,
        doc_type: &str,
        id: &str,
    ) -> LedgerResult<(String, Option<Vec<u8>>)> {
        let key = self.keys.key_for_id(doc_type, id)?;
        let raw = ctx.get_state(&key)?;
        Ok((key, raw))
    }

    /// Read and decode a document
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent and `Decode` if the stored bytes are not
    /// a well-formed `T`
    pub fn get<T: DeserializeOwned>(
        &self,
        ctx: &mut dyn TxContext,
        doc_type: &str,
        id: &str,
    ) -> LedgerResult<T> {
        let (key, raw) = self.exists(ctx, doc_type, id)?;
        let raw = raw.ok_or_else(|| not_found(doc_type, id))?;
        tracing::debug!(key = %printable_key(&key), "document read");
        self.codec.decode(&key, &raw)
    }

    /// Encode and write a document, overwriting any previous value
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be encoded or the substrate
    /// rejects the write
    pub fn put<T: Serialize>(&self, ctx: &mut dyn TxContext, key: &str, doc: &T) -> LedgerResult<()> {
        let bytes = self.codec.encode(doc)?;
        ctx.put_state(key, bytes)
    }

    /// Record a tombstone for `id`, then remove its primary key
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document is absent
    pub fn delete(
        &self,
        ctx: &mut dyn TxContext,
        doc_type: &str,
        id: &str,
    ) -> LedgerResult<Tombstone> {
        let (key, raw) = self.exists(ctx, doc_type, id)?;
        if raw.is_none() {
            return Err(not_found(doc_type, id));
        }
        let tombstone_key = key::derive_tombstone_key(doc_type, &key)?;
        let tombstone = Tombstone {
            tombstone_of: doc_type.to_string(),
            id: id.to_string(),
            key: hex::encode(key.as_bytes()),
            tx_id: ctx.tx_id().to_string(),
            deleted_at: ctx.tx_timestamp().to_rfc3339(),
        };
        self.put(ctx, &tombstone_key, &tombstone)?;
        ctx.del_state(&key)?;
        tracing::info!(key = %printable_key(&key), "document deleted");
        Ok(tombstone)
    }

    /// Every document of every doc type, in key order
    ///
    /// Tombstones and other internal index entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on substrate failure
    pub fn scan_all<T: DeserializeOwned>(&self, ctx: &mut dyn TxContext) -> LedgerResult<Documents<T>> {
        let start = key::SEPARATOR.to_string();
        let end = format!("{}{}", key::SEPARATOR, key::MAX_RUNE);
        Ok(self.documents(ctx.get_state_by_range(&start, &end)?, true))
    }

    /// Every document of one doc type, in key order
    ///
    /// # Errors
    ///
    /// Returns `KeyConstruction` for a malformed doc type
    pub fn scan_type<T: DeserializeOwned>(
        &self,
        ctx: &mut dyn TxContext,
        doc_type: &str,
    ) -> LedgerResult<Documents<T>> {
        let (start, end) = key::prefix_range(doc_type)?;
        Ok(self.documents(ctx.get_state_by_range(&start, &end)?, false))
    }

    /// Every tombstone recorded for `doc_type`, in key order
    ///
    /// # Errors
    ///
    /// Returns `KeyConstruction` for a malformed doc type and `Decode` for a
    /// malformed tombstone
    pub fn list_tombstones(
        &self,
        ctx: &mut dyn TxContext,
        doc_type: &str,
    ) -> LedgerResult<Vec<Tombstone>> {
        let (start, end) = key::tombstone_range(doc_type)?;
        self.documents::<Tombstone>(ctx.get_state_by_range(&start, &end)?, false)
            .map(|item| item.map(|(_, tombstone)| tombstone))
            .collect()
    }

    fn documents<T>(&self, entries: StateIterator, skip_reserved: bool) -> Documents<T> {
        Documents {
            entries,
            codec: Arc::clone(&self.codec),
            skip_reserved,
            _doc: PhantomData,
        }
    }
}

fn not_found(doc_type: &str, id: &str) -> LedgerError {
    LedgerError::NotFound {
        kind: doc_type.to_string(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CERT_DOC_TYPE, Certificate};
    use certledger_core::{ErrorKind, JsonCodec};
    use certledger_state::WorldState;
    use proptest::prelude::*;
    use serde_json::Value;

    fn store() -> DocumentStore {
        DocumentStore::new(KeyIndex::default(), Arc::new(JsonCodec::compact()))
    }

    fn cert(id: &str) -> Certificate {
        Certificate {
            doc_type: CERT_DOC_TYPE.to_string(),
            id: id.to_string(),
            emitter: "Universidad de La Habana".to_string(),
            ..Certificate::default()
        }
    }

    #[test]
    fn test_exists_absent_is_not_error() {
        let state = WorldState::new();
        let mut tx = state.begin();
        let (key, raw) = store().exists(&mut tx, "CERT", "CERT20221122103001").unwrap();
        assert!(key.starts_with('\u{0}'));
        assert!(raw.is_none());
    }

    #[test]
    fn test_get_missing_and_malformed() {
        let state = WorldState::new();
        let docs = store();
        let mut tx = state.begin();
        let err = docs.get::<Certificate>(&mut tx, "CERT", "CERT20221122103001").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let key = docs.keys().key_for_id("CERT", "CERT20221122103001").unwrap();
        tx.put_state(&key, b"{not json".to_vec()).unwrap();
        let err = docs.get::<Certificate>(&mut tx, "CERT", "CERT20221122103001").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeError);

        for partial in [&b"{}"[..], &br#"{"docType":"CERT","id":"CERT20221122103001"}"#[..]] {
            tx.put_state(&key, partial.to_vec()).unwrap();
            let err = docs.get::<Certificate>(&mut tx, "CERT", "CERT20221122103001").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DecodeError);
        }
    }

    #[test]
    fn test_delete_writes_tombstone_first() {
        let state = WorldState::new();
        let docs = store();
        let id = "CERT20221122103001";
        let mut tx = state.begin();
        let key = docs.keys().key_for_id("CERT", id).unwrap();
        docs.put(&mut tx, &key, &cert(id)).unwrap();
        tx.commit().unwrap();

        let mut tx = state.begin();
        let tombstone = docs.delete(&mut tx, "CERT", id).unwrap();
        assert_eq!(tombstone.id, id);
        assert_eq!(tombstone.key, hex::encode(key.as_bytes()));
        assert_eq!(tombstone.tx_id, tx.tx_id().to_string());
        tx.commit().unwrap();

        let mut tx = state.begin();
        let err = docs.get::<Certificate>(&mut tx, "CERT", id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(docs.list_tombstones(&mut tx, "CERT").unwrap(), vec![tombstone]);
        assert_eq!(
            docs.delete(&mut tx, "CERT", id).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_scans_skip_tombstones() {
        let state = WorldState::new();
        let docs = store();
        let mut tx = state.begin();
        for seq in ["1", "2", "3"] {
            let id = format!("CERT20221122{seq}");
            let key = docs.keys().key_for_id("CERT", &id).unwrap();
            docs.put(&mut tx, &key, &cert(&id)).unwrap();
        }
        let other = docs.keys().key_for_id("DIPL", "DIPL202211229").unwrap();
        docs.put(&mut tx, &other, &serde_json::json!({"docType": "DIPL"})).unwrap();
        docs.delete(&mut tx, "CERT", "CERT202211222").unwrap();

        let all: Vec<(String, Value)> = docs
            .scan_all(&mut tx)
            .unwrap()
            .collect::<LedgerResult<_>>()
            .unwrap();
        assert_eq!(all.len(), 3);

        let certs: Vec<(String, Certificate)> = docs
            .scan_type(&mut tx, "CERT")
            .unwrap()
            .collect::<LedgerResult<_>>()
            .unwrap();
        let ids: Vec<_> = certs.into_iter().map(|(_, c)| c.id).collect();
        assert_eq!(ids, vec!["CERT202211221", "CERT202211223"]);
    }

    #[test]
    fn test_scan_decodes_lazily() {
        let state = WorldState::new();
        let docs = store();
        let mut tx = state.begin();
        let good = docs.keys().key_for_id("CERT", "CERT202211221").unwrap();
        let bad = docs.keys().key_for_id("CERT", "CERT202211222").unwrap();
        docs.put(&mut tx, &good, &cert("CERT202211221")).unwrap();
        tx.put_state(&bad, b"\x00".to_vec()).unwrap();

        let mut scan = docs.scan_type::<Certificate>(&mut tx, "CERT").unwrap();
        assert!(scan.next().unwrap().is_ok());
        assert!(scan.next().unwrap().is_err());
        assert!(scan.next().is_none());
    }

    proptest! {
        #[test]
        fn prop_put_then_get(
            seq in "[0-9]{1,6}",
            accredited in ".{0,20}",
            gold in any::<bool>(),
            pretty in any::<bool>(),
        ) {
            let codec: Arc<dyn Codec> = if pretty {
                Arc::new(JsonCodec::pretty())
            } else {
                Arc::new(JsonCodec::compact())
            };
            let docs = DocumentStore::new(KeyIndex::default(), codec);
            let state = WorldState::new();
            let id = format!("CERT20221122{seq}");
            let doc = Certificate {
                accredited,
                gold_certificate: gold,
                ..cert(&id)
            };
            let mut tx = state.begin();
            let key = docs.keys().key_for_id("CERT", &id).unwrap();
            docs.put(&mut tx, &key, &doc).unwrap();
            let back: Certificate = docs.get(&mut tx, "CERT", &id).unwrap();
            prop_assert_eq!(back, doc);
        }
    }
}
