//! Core node types for the resource graph

use crate::resource::ResourceSpec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a declared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Network,
    Cluster,
    Repository,
    Secret,
    Database,
    TaskDefinition,
    Service,
}

impl ResourceKind {
    /// Output names a node of this kind exposes to references
    pub fn outputs(self) -> &'static [&'static str] {
        match self {
            Self::Network => &["vpc_id"],
            Self::Cluster => &["cluster_arn"],
            Self::Repository => &["repository_uri"],
            Self::Secret => &["secret_arn"],
            Self::Database => &["endpoint_address", "endpoint_port"],
            Self::TaskDefinition => &["task_definition_arn"],
            Self::Service => &["service_arn"],
        }
    }

    /// Check if this kind exposes a named output
    pub fn has_output(self, name: &str) -> bool {
        self.outputs().contains(&name)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Cluster => "cluster",
            Self::Repository => "repository",
            Self::Secret => "secret",
            Self::Database => "database",
            Self::TaskDefinition => "task-definition",
            Self::Service => "service",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle state of a node
///
/// `Declared → Resolving → Resolved → Synthesized`, with `Failed` reachable
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NodeState {
    /// Declared in configuration, not yet visited
    #[default]
    Declared,
    /// Resolution in progress
    Resolving,
    /// All bindings resolved; references carried as deferred tokens
    Resolved,
    /// Provisioned by the backend
    Synthesized,
    /// Terminal failure
    Failed,
}

impl NodeState {
    /// Check if this is a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Synthesized | Self::Failed)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Declared => "declared",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Synthesized => "synthesized",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A declared resource in the graph
///
/// The graph owns all nodes; a node never outlives the graph.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    /// Unique identifier across all kinds
    pub id: String,
    /// Declared properties, tagged by kind
    pub spec: ResourceSpec,
    /// Lifecycle state
    pub state: NodeState,
}

impl ResourceNode {
    pub fn new(id: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            id: id.into(),
            spec,
            state: NodeState::Declared,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }
}

/// Stack-level metadata carried into the plan artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stack {
    /// Stack name, used to namespace backend outputs
    pub name: String,
    /// Target region
    pub region: String,
    /// Optional account identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}
