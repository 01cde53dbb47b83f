//! CertLedger Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! Errors, transaction ids, timestamps, hashes, codecs and contract
//! capabilities shared by the log, the world state and the contracts.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod codec;
pub mod error;
pub mod hash;
pub mod id;
pub mod time;

// Re-exports
pub use capability::{OperationKind, OperationSet};
pub use codec::{Codec, CodecKind, JsonCodec, printable_key};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use hash::Hash;
pub use id::TxId;
pub use time::{LogicalTime, Timestamp};
