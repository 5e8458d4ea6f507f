//! Local provisioning backend
//!
//! Stands where a cloud API client would plug into the `Provisioner`
//! seam. Outputs are synthesized deterministically from the stack and
//! node identity, so planning and reapplying never depend on anything
//! outside the repository. Idempotency rides on the planned-form
//! fingerprint: a resource whose stored record matches the request is
//! left alone and answers with its stored outputs.

use crate::state::{ResourceRecord, StackState};
use std::collections::BTreeMap;
use topology::{
    Disposition, NodeState, ProvisionError, ProvisionRequest, ProvisionResponse, Provisioner,
    ResourceGraph, ResourceSpec, SecretSpec, SecretStore,
};

/// State-file backend for the `Provisioner` seam
///
/// Holds its own copies of the specs and prior records; the caller folds
/// the apply report back into the state afterwards.
pub struct LocalBackend {
    specs: BTreeMap<String, ResourceSpec>,
    prior: BTreeMap<String, ResourceRecord>,
}

impl LocalBackend {
    pub fn new(graph: &ResourceGraph, state: &StackState) -> Self {
        let specs = graph
            .nodes()
            .map(|n| (n.id.clone(), n.spec.clone()))
            .collect();
        Self {
            specs,
            prior: state.resources.clone(),
        }
    }
}

impl Provisioner for LocalBackend {
    fn provision(
        &mut self,
        request: &ProvisionRequest<'_>,
    ) -> Result<ProvisionResponse, ProvisionError> {
        let prior = self.prior.get(request.id);

        if let Some(record) = prior
            && record.state == NodeState::Synthesized
            && record.fingerprint == request.fingerprint
        {
            log::debug!("{} unchanged, reusing stored outputs", request.id);
            return Ok(ProvisionResponse {
                outputs: record.outputs.clone(),
                disposition: Disposition::Unchanged,
            });
        }

        let spec = self.specs.get(request.id).ok_or_else(|| {
            ProvisionError::Failed("not present in the current configuration".to_string())
        })?;

        let outputs = spec.synthesized_outputs(request.id, request.stack);
        let disposition = if prior.is_some_and(|r| r.applied_at.is_some()) {
            Disposition::Updated
        } else {
            Disposition::Created
        };
        log::debug!(
            "{} {} with {} outputs",
            request.id,
            disposition,
            outputs.len()
        );
        Ok(ProvisionResponse {
            outputs,
            disposition,
        })
    }
}

/// Create-or-reference secret store persisted through the state file
///
/// A generated value survives reapplies untouched; template keys are
/// rebuilt around it so template edits still land in the document.
pub struct LocalSecretStore {
    documents: BTreeMap<String, BTreeMap<String, String>>,
}

impl LocalSecretStore {
    pub fn new(state: &StackState) -> Self {
        Self {
            documents: state.secrets.clone(),
        }
    }

    /// Hand the documents back for persisting after a run
    pub fn into_documents(self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.documents
    }
}

impl SecretStore for LocalSecretStore {
    fn ensure(
        &mut self,
        id: &str,
        spec: &SecretSpec,
    ) -> topology::Result<BTreeMap<String, String>> {
        let kept = self
            .documents
            .get(id)
            .and_then(|doc| doc.get(&spec.generate_key))
            .cloned();

        let document = match kept {
            Some(value) => {
                log::debug!("Secret '{id}' already exists, referencing");
                spec.credential_document(&value)
            }
            None => {
                log::debug!("Generating credential document for '{id}'");
                let generated = spec.generate_value(&mut rand::rng());
                spec.credential_document(&generated)
            }
        };

        self.documents.insert(id.to_string(), document.clone());
        Ok(document)
    }
}
