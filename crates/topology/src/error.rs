//! Error types for the topology engine

use thiserror::Error;

/// Errors raised while building, resolving, or applying a resource graph
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing declared option on a resource
    #[error("invalid configuration for '{node}': {reason}")]
    Configuration { node: String, reason: String },

    /// A reference names a node that was never declared
    #[error("unresolved reference to '{target}' from '{node}' ({field})")]
    UnresolvedReference {
        node: String,
        target: String,
        field: String,
    },

    /// Explicit or implicit dependency edges form a cycle
    #[error("dependency cycle involving '{node}'")]
    Cycle { node: String },

    /// The parameter store could not supply a key (fatal at plan time)
    #[error("parameter '{key}' unavailable: {reason}")]
    Parameter { key: String, reason: String },

    /// The provisioning backend rejected a resource during apply
    #[error("provisioning '{node}' failed: {reason}")]
    Provisioning { node: String, reason: String },

    /// Artifact serialization failed
    #[error("artifact serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error on a named node
    pub fn config(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for topology operations
pub type Result<T> = std::result::Result<T, Error>;
