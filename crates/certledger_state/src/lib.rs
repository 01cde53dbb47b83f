//! CertLedger World State
//!
//! A versioned key-value store projected from the commit log. Contracts
//! see it only through [`TxContext`]: point reads and writes, range scans,
//! selector queries with bookmarks, and per-key history.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bookmark;
pub mod config;
pub mod context;
pub mod selector;
pub mod state;
pub mod txn;

pub use config::StoreConfig;
pub use context::{KeyValue, QueryMetadata, StateIterator, TxContext};
pub use selector::Query;
pub use state::WorldState;
pub use txn::Transaction;
