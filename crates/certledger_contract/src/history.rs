//! Version history of a single document.

use crate::key::KeyIndex;
use crate::model::HistoryRecord;
use certledger_core::{Codec, LedgerError, LedgerResult, printable_key};
use certledger_state::TxContext;
use serde_json::Value;
use std::sync::Arc;

/// Replays every committed version of a document, deletions included
#[derive(Debug, Clone)]
pub struct HistoryReader {
    keys: KeyIndex,
    codec: Arc<dyn Codec>,
}

impl HistoryReader {
    /// Create a reader resolving ids through `keys`
    #[must_use]
    pub fn new(keys: KeyIndex, codec: Arc<dyn Codec>) -> Self {
        Self { keys, codec }
    }

    /// Versions of `id`, oldest first
    ///
    /// Works the same whether or not the document currently exists.
    ///
    /// # Errors
    ///
    /// Returns `KeyConstruction` for a malformed doc type or id, and
    /// `Decode` if a past version is not a JSON object
    pub fn get_history(
        &self,
        ctx: &mut dyn TxContext,
        doc_type: &str,
        id: &str,
    ) -> LedgerResult<Vec<HistoryRecord>> {
        let key = self.keys.key_for_id(doc_type, id)?;
        self.history_for_key(ctx, &key)
    }

    /// Versions stored under a raw key, oldest first
    ///
    /// # Errors
    ///
    /// Returns `Decode` if a past version is not a JSON object
    pub fn history_for_key(
        &self,
        ctx: &mut dyn TxContext,
        key: &str,
    ) -> LedgerResult<Vec<HistoryRecord>> {
        let cursor = ctx.get_history_for_key(key)?;
        let records = cursor
            .map(|modification| -> LedgerResult<HistoryRecord> {
                let asset = match &modification.value {
                    None => None,
                    Some(bytes) => match self.codec.decode_value(key, bytes)? {
                        Value::Object(map) => Some(map),
                        _ => {
                            return Err(LedgerError::Decode {
                                key: printable_key(key),
                                reason: "past version is not an object".to_string(),
                            });
                        }
                    },
                };
                Ok(HistoryRecord {
                    tx_id: modification.tx_id.to_string(),
                    time: modification.timestamp.to_rfc3339(),
                    asset,
                })
            })
            .collect::<LedgerResult<Vec<_>>>()?;
        tracing::debug!(key = %printable_key(key), versions = records.len(), "history read");
        Ok(records)
    }
}
