//! Contract capabilities: the named operations a contract exposes to a host.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether an operation may mutate world state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    /// Read-only; the host discards the transaction afterwards
    Evaluate,
    /// Mutating; the host commits the transaction afterwards
    Submit,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Evaluate => write!(f, "evaluate"),
            Self::Submit => write!(f, "submit"),
        }
    }
}

/// The set of operations one contract exposes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSet {
    operations: BTreeMap<String, OperationKind>,
}

impl OperationSet {
    /// Create a new empty operation set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mutating operation
    #[must_use]
    pub fn submit(mut self, name: &str) -> Self {
        self.operations.insert(name.to_string(), OperationKind::Submit);
        self
    }

    /// Add a read-only operation
    #[must_use]
    pub fn evaluate(mut self, name: &str) -> Self {
        self.operations.insert(name.to_string(), OperationKind::Evaluate);
        self
    }

    /// Kind of a named operation, if exposed
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<OperationKind> {
        self.operations.get(name).copied()
    }

    /// Check if the operation is exposed
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Names of the read-only operations
    #[must_use]
    pub fn evaluate_transactions(&self) -> Vec<&str> {
        self.operations
            .iter()
            .filter(|(_, kind)| **kind == OperationKind::Evaluate)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// All operation names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Number of operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if no operations are exposed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
