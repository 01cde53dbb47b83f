//! Core error types for CertLedger.
//!
//! Every failure of the ledger core is a [`LedgerError`]. Callers that need
//! to translate failures into transport responses match on [`ErrorKind`],
//! which groups the variants into the taxonomy the contracts expose.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Core result type
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Kind of a ledger failure, independent of the concrete variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A composite key could not be built or parsed
    KeyConstructionError,
    /// The requested document does not exist
    NotFound,
    /// The document already exists
    AlreadyExists,
    /// Stored bytes are not a well-formed document
    DecodeError,
    /// Substrate failure, including optimistic conflicts
    StorageError,
    /// Signature not allowed from the current status
    InvalidTransition,
    /// Signer fields do not match the status
    InconsistentStatus,
    /// Invalidation without a reason
    InconsistentInvalidation,
    /// The substrate rejected a structured query
    QueryError,
    /// A caller-supplied argument is unusable
    InvalidArgument,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::KeyConstructionError => "KeyConstructionError",
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::DecodeError => "DecodeError",
            Self::StorageError => "StorageError",
            Self::InvalidTransition => "InvalidTransition",
            Self::InconsistentStatus => "InconsistentStatus",
            Self::InconsistentInvalidation => "InconsistentInvalidation",
            Self::QueryError => "QueryError",
            Self::InvalidArgument => "InvalidArgument",
        };
        f.write_str(name)
    }
}

/// Ledger error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Invalid doc type or key segment
    #[error("cannot build key: {reason}")]
    KeyConstruction {
        /// What was wrong with the input
        reason: String,
    },

    /// Document absent from world state
    #[error("no state found for {kind} {id}")]
    NotFound {
        /// Document type tag
        kind: String,
        /// Logical id or key
        id: String,
    },

    /// Document already present in world state
    #[error("the value {id} already exists in the state database ({kind})")]
    AlreadyExists {
        /// Document type tag
        kind: String,
        /// Logical id
        id: String,
    },

    /// Stored bytes could not be decoded
    #[error("unmarshal error at {key}: {reason}")]
    Decode {
        /// Key holding the offending bytes
        key: String,
        /// Decoder message
        reason: String,
    },

    /// Document could not be encoded
    #[error("marshal error: {reason}")]
    Encode {
        /// Encoder message
        reason: String,
    },

    /// Substrate failure
    #[error("unable to interact with world state: {reason}")]
    Storage {
        /// Failure description
        reason: String,
    },

    /// Optimistic concurrency conflict detected at commit
    #[error("transaction {tx_id} conflicts on key {key}")]
    Conflict {
        /// Transaction that lost
        tx_id: String,
        /// Key whose version changed
        key: String,
    },

    /// Broken hash chain in the commit log
    #[error("broken commit log chain at position {position}")]
    BrokenChain {
        /// Index of the first bad record
        position: u64,
    },

    /// Role may not sign from the current status
    #[error("invalid transition for {id}: {role} cannot sign a certificate in status {status}")]
    InvalidTransition {
        /// Certificate id
        id: String,
        /// Current status
        status: String,
        /// Requesting role
        role: String,
    },

    /// A generic update tried to change a field owned by the signing workflow
    #[error("invalid transition for {id}: {field} changes only through signatures or invalidation")]
    WorkflowField {
        /// Certificate id
        id: String,
        /// Wire name of the field
        field: String,
    },

    /// Signer fields and status disagree
    #[error("inconsistent status for {id}: {reason}")]
    InconsistentStatus {
        /// Certificate id
        id: String,
        /// Which rule failed
        reason: String,
    },

    /// Invalid status without a reason
    #[error("inconsistent invalidation for {id}: an invalidation reason is required")]
    InconsistentInvalidation {
        /// Certificate id
        id: String,
    },

    /// Rejected structured query
    #[error("query error: {reason}")]
    Query {
        /// Why the query was rejected
        reason: String,
    },

    /// Unusable argument
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument {
        /// Argument name
        field: String,
        /// Why it was rejected
        reason: String,
    },
}

impl LedgerError {
    /// Get the taxonomy kind of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::KeyConstruction { .. } => ErrorKind::KeyConstructionError,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Decode { .. } => ErrorKind::DecodeError,
            Self::Encode { .. }
            | Self::Storage { .. }
            | Self::Conflict { .. }
            | Self::BrokenChain { .. } => ErrorKind::StorageError,
            Self::InvalidTransition { .. } | Self::WorkflowField { .. } => {
                ErrorKind::InvalidTransition
            }
            Self::InconsistentStatus { .. } => ErrorKind::InconsistentStatus,
            Self::InconsistentInvalidation { .. } => ErrorKind::InconsistentInvalidation,
            Self::Query { .. } => ErrorKind::QueryError,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
        }
    }

    /// Shorthand for a key construction failure
    pub fn key(reason: impl Into<String>) -> Self {
        Self::KeyConstruction {
            reason: reason.into(),
        }
    }

    /// Shorthand for a substrate failure
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    /// Shorthand for a rejected query
    pub fn query(reason: impl Into<String>) -> Self {
        Self::Query {
            reason: reason.into(),
        }
    }

    /// Shorthand for an unusable argument
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for optimistic concurrency conflicts, which callers may retry
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<postcard::Error> for LedgerError {
    fn from(err: postcard::Error) -> Self {
        Self::storage(format!("canonical encoding failed: {err}"))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(format!("io: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LedgerError::NotFound {
            kind: "CERT".to_string(),
            id: "CERT20221122103001".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "no state found for CERT CERT20221122103001"
        );
    }

    #[test]
    fn test_transition_error_names_everything() {
        let err = LedgerError::InvalidTransition {
            id: "CERT1".to_string(),
            status: "New".to_string(),
            role: "Dean".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("CERT1"));
        assert!(s.contains("New"));
        assert!(s.contains("Dean"));
    }

    #[test]
    fn test_workflow_field_is_transition_kind() {
        let err = LedgerError::WorkflowField {
            id: "CERT1".to_string(),
            field: "status".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert!(err.to_string().contains("status"));
    }

    #[test]
    fn test_conflict_is_storage_kind() {
        let err = LedgerError::Conflict {
            tx_id: "abc".to_string(),
            key: "k".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::StorageError);
        assert!(err.is_conflict());
        assert!(!LedgerError::storage("disk").is_conflict());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(LedgerError::key("empty").kind(), ErrorKind::KeyConstructionError);
        assert_eq!(LedgerError::query("bad").kind(), ErrorKind::QueryError);
        assert_eq!(
            LedgerError::invalid_argument("pageSize", "must be positive").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            LedgerError::InconsistentInvalidation { id: "x".into() }.kind(),
            ErrorKind::InconsistentInvalidation
        );
        assert_eq!(LedgerError::BrokenChain { position: 3 }.kind(), ErrorKind::StorageError);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::NotFound.to_string(), "NotFound");
        assert_eq!(ErrorKind::InvalidTransition.to_string(), "InvalidTransition");
    }
}
