//! # Topology
//!
//! A deployment topology engine: declare resources, resolve them into a
//! deterministic plan, apply the plan through a provisioning backend.
//!
//! ## Core Concepts
//!
//! - **ResourceNode**: One declared resource (network, cluster, repository,
//!   secret, database, task definition, service) with a lifecycle state
//! - **ResourceGraph**: Validated nodes plus dependency edges and a fixed
//!   resolution order (declaration order breaks ties, never hash order)
//! - **Plan**: The resolved, ordered, blake3-fingerprinted JSON artifact
//! - **ApplyEngine**: Walks the plan, substitutes upstream outputs into
//!   `${node.output}` tokens, and provisions one resource at a time
//!
//! ## Example
//!
//! ```ignore
//! use topology::{
//!     ApplyEngine, ApplyOptions, GraphBuilder, NetworkSpec, ResourceSpec,
//!     Stack, StaticParameters, SubnetSpec, SubnetTier, emit, resolve,
//! };
//!
//! let mut builder = GraphBuilder::new(Stack {
//!     name: "locator".into(),
//!     region: "eu-west-2".into(),
//!     account: None,
//! });
//! builder.add("net", ResourceSpec::Network(NetworkSpec {
//!     cidr: "10.0.0.0/16".into(),
//!     max_azs: 2,
//!     nat_gateways: 0,
//!     subnets: vec![SubnetSpec { name: "public".into(), tier: SubnetTier::Public }],
//!     depends_on: vec![],
//! }))?;
//!
//! let mut graph = builder.build()?;
//! let params = StaticParameters::default();
//! let resolution = resolve(&mut graph, &params)?;
//! let plan = emit(&graph, resolution)?;
//! println!("{}", plan.to_json()?);
//! ```
//!
//! ## Provider Traits
//!
//! The engine never talks to a backing service directly:
//!
//! - [`ParameterStore`]: Supplies configuration parameters at plan time
//! - [`SecretStore`]: Creates or references generated credentials
//! - [`Provisioner`]: Turns one resolved resource into live outputs
//!
//! A frontend wires real implementations in; tests substitute fakes.

pub mod apply;
pub mod emitter;
pub mod error;
pub mod graph;
pub mod node;
pub mod provider;
pub mod resolver;
pub mod resource;
pub mod value;

// Re-export main types at crate root
pub use apply::{ApplyEngine, ApplyOptions, ApplyReport, ApplyRow, CancelFlag, RetryPolicy};
pub use emitter::{PLAN_FORMAT_VERSION, Plan, emit};
pub use error::{Error, Result};
pub use graph::{GraphBuilder, ResourceGraph};
pub use node::{NodeState, ResourceKind, ResourceNode, Stack};
pub use provider::{
    Disposition, ParameterStore, ProvisionError, ProvisionRequest, ProvisionResponse, Provisioner,
    SecretStore, StaticParameters,
};
pub use resolver::{PlanWarning, Resolution, ResolvedNode, resolve};
pub use resource::{
    ClusterSpec, ContainerSpec, DatabaseSpec, Dependency, Engine, Image, IngressRule, NetworkSpec,
    RemovalPolicy, RepositorySpec, ResourceSpec, SecretSpec, ServiceSpec, SubnetSpec, SubnetTier,
    TaskSpec,
};
pub use value::{EnvValue, Reference, SecretKeyRef, Template, substitute_tokens};
