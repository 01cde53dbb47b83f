//! Contracts and the host that invokes them.
//!
//! A contract exposes a named set of operations. The host wires each
//! invocation to exactly one transaction: submit operations are committed,
//! evaluate operations are always discarded, and a failed operation never
//! commits anything.

use crate::config::ContractConfig;
use crate::documents::DocumentStore;
use crate::history::HistoryReader;
use crate::model::{
    CertificateRequest, GetRequest, HistoryRequest, InvalidateRequest, PaginationRequest,
    TombstoneRequest, ValidateRequest,
};
use crate::query::QueryEngine;
use crate::workflow::SigningWorkflow;
use certledger_core::{LedgerError, LedgerResult, OperationKind, OperationSet, Timestamp};
use certledger_state::{TxContext, WorldState};
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// A named set of callable operations
pub trait Contract: Send + Sync {
    /// Contract name used by callers
    fn name(&self) -> &str;

    /// Operations this contract exposes
    fn operations(&self) -> &OperationSet;

    /// Run one operation inside `ctx`
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown operation or malformed
    /// arguments, otherwise whatever the operation fails with
    fn invoke(&self, ctx: &mut dyn TxContext, operation: &str, args: &Value) -> LedgerResult<Value>;
}

fn parse_args<T: DeserializeOwned>(operation: &str, args: &Value) -> LedgerResult<T> {
    T::deserialize(args).map_err(|e| LedgerError::invalid_argument(operation, e.to_string()))
}

fn output<T: Serialize>(value: &T) -> LedgerResult<Value> {
    serde_json::to_value(value).map_err(|e| LedgerError::Encode {
        reason: e.to_string(),
    })
}

fn unknown_operation(contract: &str, operation: &str) -> LedgerError {
    LedgerError::invalid_argument(
        "operation",
        format!("contract {contract} has no operation {operation}"),
    )
}

/// Certificate lifecycle operations
#[derive(Debug, Clone)]
pub struct CertificateContract {
    workflow: SigningWorkflow,
    operations: OperationSet,
}

impl CertificateContract {
    /// Contract name
    pub const NAME: &'static str = "certificate";

    /// Create the contract from configuration
    #[must_use]
    pub fn new(config: &ContractConfig) -> Self {
        Self {
            workflow: SigningWorkflow::new(config.document_store(), config.doc_type.clone()),
            operations: OperationSet::new()
                .submit("CreateAsset")
                .evaluate("ReadAsset")
                .submit("UpdateAsset")
                .submit("ValidateAsset")
                .submit("InvalidateAsset")
                .submit("DeleteAsset"),
        }
    }

    /// The underlying workflow
    #[must_use]
    pub fn workflow(&self) -> &SigningWorkflow {
        &self.workflow
    }
}

impl Contract for CertificateContract {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn operations(&self) -> &OperationSet {
        &self.operations
    }

    fn invoke(&self, ctx: &mut dyn TxContext, operation: &str, args: &Value) -> LedgerResult<Value> {
        match operation {
            "CreateAsset" => {
                let request: CertificateRequest = parse_args(operation, args)?;
                output(&self.workflow.create(ctx, request)?)
            }
            "ReadAsset" => {
                let request: GetRequest = parse_args(operation, args)?;
                output(&self.workflow.read(ctx, &request.id)?)
            }
            "UpdateAsset" => {
                let request: CertificateRequest = parse_args(operation, args)?;
                output(&self.workflow.update(ctx, request)?)
            }
            "ValidateAsset" => {
                let request: ValidateRequest = parse_args(operation, args)?;
                output(&self.workflow.apply_signature(
                    ctx,
                    &request.id,
                    request.validator_type,
                    &request.validator,
                )?)
            }
            "InvalidateAsset" => {
                let request: InvalidateRequest = parse_args(operation, args)?;
                output(&self.workflow.invalidate(ctx, &request.id, &request.description)?)
            }
            "DeleteAsset" => {
                let request: GetRequest = parse_args(operation, args)?;
                output(&self.workflow.delete(ctx, &request.id)?)
            }
            other => Err(unknown_operation(Self::NAME, other)),
        }
    }
}

/// Read-only operations shared by every doc type
#[derive(Debug, Clone)]
pub struct CommonContract {
    documents: DocumentStore,
    queries: QueryEngine,
    history: HistoryReader,
    operations: OperationSet,
}

impl CommonContract {
    /// Contract name
    pub const NAME: &'static str = "common";

    /// Create the contract from configuration
    #[must_use]
    pub fn new(config: &ContractConfig) -> Self {
        let codec = config.build_codec();
        Self {
            documents: DocumentStore::new(config.key_index(), Arc::clone(&codec)),
            queries: QueryEngine::new(Arc::clone(&codec)),
            history: HistoryReader::new(config.key_index(), codec),
            operations: OperationSet::new()
                .evaluate("QueryAssetsBy")
                .evaluate("QueryAssetsWithPagination")
                .evaluate("GetHistory")
                .evaluate("ListTombstones"),
        }
    }
}

impl Contract for CommonContract {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn operations(&self) -> &OperationSet {
        &self.operations
    }

    fn invoke(&self, ctx: &mut dyn TxContext, operation: &str, args: &Value) -> LedgerResult<Value> {
        match operation {
            "QueryAssetsBy" => {
                let records: Vec<Value> = self.queries.query_by_selector(ctx, args)?;
                Ok(Value::Array(records))
            }
            "QueryAssetsWithPagination" => {
                let request: PaginationRequest = parse_args(operation, args)?;
                // Clients may send the query as an object or as its JSON text
                let query = match request.query_string {
                    Value::String(text) if !text.trim().is_empty() => serde_json::from_str(&text)
                        .map_err(|e| LedgerError::query(format!("query is not JSON: {e}")))?,
                    other => other,
                };
                output(&self.queries.query_paginated(
                    ctx,
                    &query,
                    request.page_size,
                    &request.bookmark,
                )?)
            }
            "GetHistory" => {
                let request: HistoryRequest = parse_args(operation, args)?;
                output(&self.history.get_history(ctx, &request.doc_type, &request.id)?)
            }
            "ListTombstones" => {
                let request: TombstoneRequest = parse_args(operation, args)?;
                output(&self.documents.list_tombstones(ctx, &request.doc_type)?)
            }
            other => Err(unknown_operation(Self::NAME, other)),
        }
    }
}

/// Invokes registered contracts, one transaction per invocation
pub struct ContractHost {
    state: WorldState,
    contracts: IndexMap<String, Arc<dyn Contract>>,
}

impl std::fmt::Debug for ContractHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHost")
            .field("state", &self.state)
            .field("contracts", &self.contracts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ContractHost {
    /// Create a host with no contracts
    #[must_use]
    pub fn new(state: WorldState) -> Self {
        Self {
            state,
            contracts: IndexMap::new(),
        }
    }

    /// Create a host with the certificate and common contracts registered
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configuration is unusable
    pub fn with_contracts(state: WorldState, config: &ContractConfig) -> LedgerResult<Self> {
        config.validate()?;
        let mut host = Self::new(state);
        host.register(Arc::new(CertificateContract::new(config)))?;
        host.register(Arc::new(CommonContract::new(config)))?;
        Ok(host)
    }

    /// Register a contract under its name
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the name is already taken
    pub fn register(&mut self, contract: Arc<dyn Contract>) -> LedgerResult<()> {
        let name = contract.name().to_string();
        if self.contracts.contains_key(&name) {
            return Err(LedgerError::invalid_argument(
                "contract",
                format!("contract {name} already registered"),
            ));
        }
        self.contracts.insert(name, contract);
        Ok(())
    }

    /// Registered contract names, in registration order
    #[must_use]
    pub fn contract_names(&self) -> Vec<&str> {
        self.contracts.keys().map(String::as_str).collect()
    }

    /// Look up a registered contract
    #[must_use]
    pub fn contract(&self, name: &str) -> Option<Arc<dyn Contract>> {
        self.contracts.get(name).map(Arc::clone)
    }

    /// The world state invocations run against
    #[must_use]
    pub fn state(&self) -> &WorldState {
        &self.state
    }

    /// Invoke `contract.operation` stamped with the current time
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or `StorageError` if the commit
    /// conflicts
    pub fn invoke(&self, contract: &str, operation: &str, args: &Value) -> LedgerResult<Value> {
        self.invoke_at(Timestamp::now(), contract, operation, args)
    }

    /// Invoke `contract.operation` with a fixed transaction timestamp
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or `StorageError` if the commit
    /// conflicts
    pub fn invoke_at(
        &self,
        timestamp: Timestamp,
        contract: &str,
        operation: &str,
        args: &Value,
    ) -> LedgerResult<Value> {
        let target = self.contracts.get(contract).ok_or_else(|| {
            LedgerError::invalid_argument("contract", format!("no contract named {contract}"))
        })?;
        let kind = target
            .operations()
            .kind_of(operation)
            .ok_or_else(|| unknown_operation(contract, operation))?;

        let mut tx = self.state.begin_at(timestamp);
        let tx_id = tx.tx_id();
        match target.invoke(&mut tx, operation, args) {
            Ok(result) => {
                match kind {
                    OperationKind::Submit => {
                        tx.commit()?;
                    }
                    OperationKind::Evaluate => tx.discard(),
                }
                tracing::debug!(%tx_id, contract, operation, %kind, "invocation completed");
                Ok(result)
            }
            Err(err) => {
                tx.discard();
                tracing::warn!(%tx_id, contract, operation, error = %err, "invocation failed");
                Err(err)
            }
        }
    }
}
