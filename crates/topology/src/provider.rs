//! Collaborator seams the engine calls out through
//!
//! Planning and apply never talk to a backing service directly. They go
//! through these traits so a command-line frontend can wire in real
//! stores while tests substitute deterministic fakes.

use crate::error::{Error, Result};
use crate::node::{ResourceKind, Stack};
use crate::resource::SecretSpec;
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

/// Source of configuration parameters resolved at plan time
///
/// A failed lookup is a configuration error: the plan must not be
/// produced with a placeholder where a real value belongs.
pub trait ParameterStore {
    fn get(&self, key: &str) -> Result<String>;
}

/// In-memory parameter store
#[derive(Debug, Clone, Default)]
pub struct StaticParameters {
    values: BTreeMap<String, String>,
}

impl StaticParameters {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ParameterStore for StaticParameters {
    fn get(&self, key: &str) -> Result<String> {
        self.values.get(key).cloned().ok_or_else(|| Error::Parameter {
            key: key.to_string(),
            reason: "parameter not found".to_string(),
        })
    }
}

/// Store of generated credentials with create-or-reference semantics
///
/// `ensure` returns the full credential document. If the secret already
/// exists the stored document comes back unchanged, so repeated applies
/// never rotate a credential behind a consumer's back.
pub trait SecretStore {
    fn ensure(&mut self, id: &str, spec: &SecretSpec) -> Result<BTreeMap<String, String>>;
}

/// One resource handed to the backend for provisioning
#[derive(Debug)]
pub struct ProvisionRequest<'a> {
    pub id: &'a str,
    pub kind: ResourceKind,
    /// Properties with every reference token substituted
    pub properties: &'a serde_json::Value,
    /// Planned-form digest, for the backend's idempotency check
    pub fingerprint: &'a str,
    pub stack: &'a Stack,
}

/// What the backend did with the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Created,
    Updated,
    /// Already present with the same fingerprint; outputs are the stored ones
    Unchanged,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disposition::Created => write!(f, "created"),
            Disposition::Updated => write!(f, "updated"),
            Disposition::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Successful provisioning result for one resource
#[derive(Debug)]
pub struct ProvisionResponse {
    pub outputs: BTreeMap<String, String>,
    pub disposition: Disposition,
}

/// Backend failure while provisioning a single resource
#[derive(Debug, ThisError)]
pub enum ProvisionError {
    /// Transient pushback, safe to retry after a delay
    #[error("throttled: {0}")]
    Throttled(String),
    /// Hard failure, retrying will not help
    #[error("{0}")]
    Failed(String),
}

/// Backend that turns a resolved resource into live outputs
pub trait Provisioner {
    fn provision(
        &mut self,
        request: &ProvisionRequest<'_>,
    ) -> std::result::Result<ProvisionResponse, ProvisionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_parameters_hit_and_miss() {
        let mut params = StaticParameters::default();
        params.insert("/cloudflare/zone_id", "z-123");
        assert_eq!(params.get("/cloudflare/zone_id").unwrap(), "z-123");
        let err = params.get("/missing").unwrap_err();
        assert!(matches!(err, Error::Parameter { .. }));
    }
}
