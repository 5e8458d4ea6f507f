//! Per-kind resource specifications
//!
//! Every declarable resource has a typed spec struct in its own module,
//! validated locally here and cross-node by the graph builder. The flat
//! tagged-variant [`ResourceSpec`] replaces any construct inheritance: one
//! enum, one small synthesis strategy per kind.

pub mod cluster;
pub mod database;
pub mod network;
pub mod repository;
pub mod secret;
pub mod service;
pub mod task;

pub use cluster::ClusterSpec;
pub use database::{DatabaseSpec, Engine, RemovalPolicy};
pub use network::{NetworkSpec, SubnetSpec, SubnetTier};
pub use repository::RepositorySpec;
pub use secret::SecretSpec;
pub use service::ServiceSpec;
pub use task::{ContainerSpec, Image, TaskSpec};

use crate::error::{Error, Result};
use crate::node::{ResourceKind, Stack};
use crate::provider::ParameterStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A declared edge from one node to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Field that declared the dependency (e.g. `credentials`,
    /// `environment.DB_HOST`, `depends_on`)
    pub field: String,
    /// Target node id
    pub target: String,
    /// Required kind of the target, for structural references
    pub expects: Option<ResourceKind>,
    /// Output the target must expose, for `${node.output}` references
    pub output: Option<String>,
}

impl Dependency {
    pub fn structural(
        field: impl Into<String>,
        target: impl Into<String>,
        expects: ResourceKind,
    ) -> Self {
        Self {
            field: field.into(),
            target: target.into(),
            expects: Some(expects),
            output: None,
        }
    }

    pub fn output(
        field: impl Into<String>,
        target: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            target: target.into(),
            expects: None,
            output: Some(output.into()),
        }
    }

    pub fn explicit(target: impl Into<String>) -> Self {
        Self {
            field: "depends_on".to_string(),
            target: target.into(),
            expects: None,
            output: None,
        }
    }
}

/// Declared properties of a node, tagged by kind
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ResourceSpec {
    Network(NetworkSpec),
    Cluster(ClusterSpec),
    Repository(RepositorySpec),
    Secret(SecretSpec),
    Database(DatabaseSpec),
    Task(TaskSpec),
    Service(ServiceSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Network(_) => ResourceKind::Network,
            Self::Cluster(_) => ResourceKind::Cluster,
            Self::Repository(_) => ResourceKind::Repository,
            Self::Secret(_) => ResourceKind::Secret,
            Self::Database(_) => ResourceKind::Database,
            Self::Task(_) => ResourceKind::TaskDefinition,
            Self::Service(_) => ResourceKind::Service,
        }
    }

    /// Validate options that need no other node to check
    pub fn validate(&self, id: &str) -> Result<()> {
        match self {
            Self::Network(s) => s.validate(id),
            Self::Cluster(s) => s.validate(id),
            Self::Repository(s) => s.validate(id),
            Self::Secret(s) => s.validate(id),
            Self::Database(s) => s.validate(id),
            Self::Task(s) => s.validate(id),
            Self::Service(s) => s.validate(id),
        }
    }

    /// All dependencies this node declares, implicit and explicit
    pub fn dependencies(&self) -> Vec<Dependency> {
        let mut deps = match self {
            Self::Network(_) | Self::Repository(_) | Self::Secret(_) => Vec::new(),
            Self::Cluster(s) => s.dependencies(),
            Self::Database(s) => s.dependencies(),
            Self::Task(s) => s.dependencies(),
            Self::Service(s) => s.dependencies(),
        };
        deps.extend(self.explicit_depends_on().iter().map(Dependency::explicit));
        deps
    }

    /// The `depends_on` list declared in configuration
    pub fn explicit_depends_on(&self) -> &[String] {
        match self {
            Self::Network(s) => &s.depends_on,
            Self::Cluster(s) => &s.depends_on,
            Self::Repository(s) => &s.depends_on,
            Self::Secret(s) => &s.depends_on,
            Self::Database(s) => &s.depends_on,
            Self::Task(s) => &s.depends_on,
            Self::Service(s) => &s.depends_on,
        }
    }

    /// The declaration as plain data, without the kind tag, so string
    /// fields can be scanned for stray `${node.output}` tokens
    pub(crate) fn declared_properties(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::Network(s) => serde_json::to_value(s),
            Self::Cluster(s) => serde_json::to_value(s),
            Self::Repository(s) => serde_json::to_value(s),
            Self::Secret(s) => serde_json::to_value(s),
            Self::Database(s) => serde_json::to_value(s),
            Self::Task(s) => serde_json::to_value(s),
            Self::Service(s) => serde_json::to_value(s),
        }
    }

    /// Plan-time properties: parameters resolved, references as tokens
    pub fn plan_properties(
        &self,
        id: &str,
        params: &dyn ParameterStore,
    ) -> Result<serde_json::Value> {
        match self {
            Self::Network(s) => s.plan_properties(),
            Self::Cluster(s) => s.plan_properties(),
            Self::Repository(s) => s.plan_properties(),
            Self::Secret(s) => s.plan_properties(),
            Self::Database(s) => s.plan_properties(),
            Self::Task(s) => s.plan_properties(id, params),
            Self::Service(s) => s.plan_properties(),
        }
    }

    /// Deterministic outputs a local backend synthesizes for this node
    pub fn synthesized_outputs(&self, id: &str, stack: &Stack) -> BTreeMap<String, String> {
        match self {
            Self::Network(s) => s.synthesized_outputs(id, stack),
            Self::Cluster(s) => s.synthesized_outputs(id, stack),
            Self::Repository(s) => s.synthesized_outputs(stack),
            Self::Secret(s) => s.synthesized_outputs(id, stack),
            Self::Database(s) => s.synthesized_outputs(id, stack),
            Self::Task(s) => s.synthesized_outputs(id, stack),
            Self::Service(s) => s.synthesized_outputs(id, stack),
        }
    }
}

/// An ingress rule on a database or service security boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngressRule {
    /// `any-ipv4` or a CIDR block
    pub peer: String,
    pub port: u16,
    #[serde(default)]
    pub description: String,
}

impl IngressRule {
    /// True when the rule admits the whole IPv4 internet
    pub fn is_open(&self) -> bool {
        self.peer == "any-ipv4" || self.peer == "0.0.0.0/0"
    }

    pub fn validate(&self, id: &str) -> Result<()> {
        if self.port == 0 {
            return Err(Error::config(id, "ingress port must be non-zero"));
        }
        if self.peer != "any-ipv4" && !is_valid_cidr(&self.peer) {
            return Err(Error::config(
                id,
                format!(
                    "ingress peer '{}' is neither 'any-ipv4' nor a CIDR block",
                    self.peer
                ),
            ));
        }
        Ok(())
    }
}

/// Check a dotted-quad CIDR block like `10.0.0.0/16`
pub(crate) fn is_valid_cidr(s: &str) -> bool {
    let Some((addr, prefix)) = s.split_once('/') else {
        return false;
    };
    let octets: Vec<_> = addr.split('.').collect();
    if octets.len() != 4 {
        return false;
    }
    if !octets.iter().all(|o| o.parse::<u8>().is_ok()) {
        return false;
    }
    prefix.parse::<u8>().is_ok_and(|p| p <= 32)
}

/// Deterministic pseudo-identifier for locally synthesized outputs
pub(crate) fn pseudo_id(stack: &Stack, id: &str, salt: &str, len: usize) -> String {
    let digest = blake3::hash(format!("{}:{}:{}", stack.name, id, salt).as_bytes());
    digest.to_hex()[..len].to_string()
}

/// Account id used when the stack declares none
pub(crate) fn account(stack: &Stack) -> &str {
    stack.account.as_deref().unwrap_or("000000000000")
}
