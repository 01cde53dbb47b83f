//! CertLedger Contracts
//!
//! Academic certificates as versioned documents in the world state:
//! composite keys, the multi-party signing workflow, selector and paginated
//! queries, per-document history, and the contracts exposing them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod contract;
pub mod documents;
pub mod history;
pub mod key;
pub mod model;
pub mod query;
pub mod workflow;

pub use config::ContractConfig;
pub use contract::{CertificateContract, CommonContract, Contract, ContractHost};
pub use documents::{DocumentStore, Documents};
pub use history::HistoryReader;
pub use key::{IdLayout, KeyIndex, derive_key, derive_tombstone_key, prefix_range, split_key};
pub use model::{
    CERT_DOC_TYPE, Certificate, CertificateRequest, GetRequest, HistoryRecord, HistoryRequest, InvalidateRequest,
    PaginatedQueryResponse, PaginationRequest, Status, Tombstone, TombstoneRequest,
    ValidateRequest, ValidatorRole,
};
pub use query::QueryEngine;
pub use workflow::{SigningWorkflow, check_consistency, next_status};
