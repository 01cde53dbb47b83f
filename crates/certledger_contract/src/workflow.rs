//! The certificate signing workflow.
//!
//! Signatures advance a certificate one stage at a time in strict role
//! order; invalidation is allowed from any stage. Every write path funnels
//! through [`check_consistency`] before the document is stored.

use crate::documents::DocumentStore;
use crate::model::{Certificate, CertificateRequest, Status, Tombstone, ValidatorRole};
use certledger_core::{LedgerError, LedgerResult};
use certledger_state::TxContext;

/// Status reached when `role` signs a certificate in `current`
#[must_use]
pub const fn next_status(current: Status, role: ValidatorRole) -> Option<Status> {
    match (current, role) {
        (Status::New, ValidatorRole::Secretary) => Some(Status::SignedS),
        (Status::SignedS, ValidatorRole::Dean) => Some(Status::SignedSD),
        (Status::SignedSD, ValidatorRole::Rector) => Some(Status::Valid),
        _ => None,
    }
}

/// Check that signer fields and invalid reason agree with the status
///
/// # Errors
///
/// Returns `InconsistentInvalidation` for an invalid certificate without a
/// reason and `InconsistentStatus` for any other mismatch
pub fn check_consistency(cert: &Certificate) -> LedgerResult<()> {
    let signed = (
        !cert.secretary_validating.is_empty(),
        !cert.dean_validating.is_empty(),
        !cert.rector_validating.is_empty(),
    );
    let inconsistent = |reason: &str| LedgerError::InconsistentStatus {
        id: cert.id.clone(),
        reason: reason.to_string(),
    };

    if cert.status == Status::Invalid {
        if cert.invalid_reason.is_empty() {
            return Err(LedgerError::InconsistentInvalidation { id: cert.id.clone() });
        }
        return Ok(());
    }
    if !cert.invalid_reason.is_empty() {
        return Err(inconsistent("only an invalid certificate carries an invalid reason"));
    }

    let expected = match cert.status {
        Status::New => (false, false, false),
        Status::SignedS => (true, false, false),
        Status::SignedSD => (true, true, false),
        Status::Valid | Status::Invalid => (true, true, true),
    };
    if signed != expected {
        return Err(inconsistent(&format!(
            "status {} requires signatures (secretary, dean, rector) = {:?}, found {:?}",
            cert.status, expected, signed
        )));
    }
    Ok(())
}

/// Certificate state machine over a [`DocumentStore`]
#[derive(Debug, Clone)]
pub struct SigningWorkflow {
    documents: DocumentStore,
    doc_type: String,
}

impl SigningWorkflow {
    /// Workflow for documents of `doc_type`
    #[must_use]
    pub fn new(documents: DocumentStore, doc_type: impl Into<String>) -> Self {
        Self {
            documents,
            doc_type: doc_type.into(),
        }
    }

    /// Doc type this workflow manages
    #[must_use]
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// Underlying document store
    #[must_use]
    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Issue a new certificate in status `New`
    ///
    /// Workflow members in the request are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the id is taken
    pub fn create(
        &self,
        ctx: &mut dyn TxContext,
        request: CertificateRequest,
    ) -> LedgerResult<Certificate> {
        let (key, raw) = self.documents.exists(ctx, &self.doc_type, &request.id)?;
        if raw.is_some() {
            tracing::warn!(id = %request.id, "create rejected, certificate exists");
            return Err(LedgerError::AlreadyExists {
                kind: self.doc_type.clone(),
                id: request.id,
            });
        }
        let blank = Certificate {
            doc_type: self.doc_type.clone(),
            ..Certificate::default()
        };
        let cert = request.apply_to(&blank);
        self.store(ctx, &key, &cert)?;
        tracing::info!(id = %cert.id, "certificate created");
        Ok(cert)
    }

    /// Read a certificate
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent
    pub fn read(&self, ctx: &mut dyn TxContext, id: &str) -> LedgerResult<Certificate> {
        self.documents.get(ctx, &self.doc_type, id)
    }

    /// Replace the descriptive fields of an existing certificate
    ///
    /// Status, signers and invalid reason stay as stored; a request that
    /// names them must repeat the stored values.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent and `InvalidTransition` if the request
    /// changes a workflow field
    pub fn update(
        &self,
        ctx: &mut dyn TxContext,
        request: CertificateRequest,
    ) -> LedgerResult<Certificate> {
        let (key, stored) = self.load(ctx, &request.id)?;
        if let Some(field) = request.workflow_change(&stored) {
            tracing::warn!(id = %stored.id, field, "update rejected, workflow field changed");
            return Err(LedgerError::WorkflowField {
                id: stored.id,
                field: field.to_string(),
            });
        }
        let cert = request.apply_to(&stored);
        self.store(ctx, &key, &cert)?;
        tracing::info!(id = %cert.id, status = %cert.status, "certificate updated");
        Ok(cert)
    }

    /// Countersign a certificate as `role`
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if `role` may not sign from the current
    /// status, and `InconsistentStatus` if the result would be inconsistent
    /// (for example an empty signer identity)
    pub fn apply_signature(
        &self,
        ctx: &mut dyn TxContext,
        id: &str,
        role: ValidatorRole,
        signer: &str,
    ) -> LedgerResult<Certificate> {
        let (key, mut cert) = self.load(ctx, id)?;
        let Some(next) = next_status(cert.status, role) else {
            tracing::warn!(id, status = %cert.status, role = %role, "signature rejected");
            return Err(LedgerError::InvalidTransition {
                id: id.to_string(),
                status: cert.status.to_string(),
                role: role.to_string(),
            });
        };

        let field = match role {
            ValidatorRole::Secretary => &mut cert.secretary_validating,
            ValidatorRole::Dean => &mut cert.dean_validating,
            ValidatorRole::Rector | ValidatorRole::None => &mut cert.rector_validating,
        };
        *field = signer.to_string();
        let previous = cert.status;
        cert.status = next;

        self.store(ctx, &key, &cert)?;
        tracing::info!(id, from = %previous, to = %next, role = %role, "certificate signed");
        Ok(cert)
    }

    /// Revoke a certificate from any status
    ///
    /// # Errors
    ///
    /// Returns `InconsistentInvalidation` if `reason` is empty
    pub fn invalidate(&self, ctx: &mut dyn TxContext, id: &str, reason: &str) -> LedgerResult<Certificate> {
        let (key, mut cert) = self.load(ctx, id)?;
        let previous = cert.status;
        cert.status = Status::Invalid;
        cert.invalid_reason = reason.to_string();

        self.store(ctx, &key, &cert)?;
        tracing::info!(id, from = %previous, "certificate invalidated");
        Ok(cert)
    }

    /// Delete a certificate, leaving a tombstone
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent
    pub fn delete(&self, ctx: &mut dyn TxContext, id: &str) -> LedgerResult<Tombstone> {
        self.documents.delete(ctx, &self.doc_type, id)
    }

    fn load(&self, ctx: &mut dyn TxContext, id: &str) -> LedgerResult<(String, Certificate)> {
        let key = self.documents.keys().key_for_id(&self.doc_type, id)?;
        let cert = self.read(ctx, id)?;
        Ok((key, cert))
    }

    fn store(&self, ctx: &mut dyn TxContext, key: &str, cert: &Certificate) -> LedgerResult<()> {
        if let Err(err) = check_consistency(cert) {
            tracing::warn!(id = %cert.id, error = %err, "write rejected");
            return Err(err);
        }
        self.documents.put(ctx, key, cert)
    }
}
