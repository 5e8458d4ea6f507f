//! Topology file loading and lowering into the engine's graph
//!
//! The file declares resources under per-kind tables keyed by node id:
//!
//! ```toml
//! [stack]
//! name = "locator"
//! region = "eu-west-2"
//!
//! [network.core]
//! cidr = "10.0.0.0/16"
//! subnets = [{ name = "public", tier = "public" }]
//!
//! [cluster.app]
//! network = "core"
//! ```
//!
//! Node ids are unique across kinds. Lowering feeds the builder in a
//! fixed kind order (network, cluster, repository, secret, database,
//! task, service) and alphabetically within each kind, so the engine's
//! declaration-order tie-break never depends on table order in the file.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use topology::{
    ClusterSpec, DatabaseSpec, GraphBuilder, NetworkSpec, RepositorySpec, ResourceGraph,
    ResourceSpec, SecretSpec, ServiceSpec, Stack, TaskSpec,
};

/// Stack-wide metadata
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StackSection {
    /// Stack name, prefixes synthesized identifiers
    pub name: String,
    pub region: String,
    /// Account identifier; `--account` / `GANTRY_ACCOUNT` override this
    #[serde(default)]
    pub account: Option<String>,
}

/// The whole topology file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TopologyConfig {
    #[serde(default)]
    pub stack: StackSection,

    #[serde(default)]
    pub network: BTreeMap<String, NetworkSpec>,

    #[serde(default)]
    pub cluster: BTreeMap<String, ClusterSpec>,

    #[serde(default)]
    pub repository: BTreeMap<String, RepositorySpec>,

    #[serde(default)]
    pub secret: BTreeMap<String, SecretSpec>,

    #[serde(default)]
    pub database: BTreeMap<String, DatabaseSpec>,

    #[serde(default)]
    pub task: BTreeMap<String, TaskSpec>,

    #[serde(default)]
    pub service: BTreeMap<String, ServiceSpec>,
}

impl TopologyConfig {
    /// Load a topology file, trying gantry.toml then gantry.json when no
    /// path is given. Returns the config and the path it came from.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, PathBuf)> {
        let path = match explicit {
            Some(p) => expand(p),
            None => {
                let toml_path = PathBuf::from("gantry.toml");
                let json_path = PathBuf::from("gantry.json");
                if toml_path.exists() {
                    toml_path
                } else if json_path.exists() {
                    json_path
                } else {
                    bail!("no gantry.toml or gantry.json in the current directory");
                }
            }
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;

        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?
        };

        config.validate()?;
        log::debug!("Loaded topology from {}", path.display());
        Ok((config, path))
    }

    /// File-level checks; per-node checks happen in the graph builder
    pub fn validate(&self) -> Result<()> {
        if self.stack.name.is_empty() {
            bail!("stack.name must be set");
        }
        if self.stack.region.is_empty() {
            bail!("stack.region must be set");
        }
        if self.node_count() == 0 {
            bail!("the topology declares no resources");
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.network.len()
            + self.cluster.len()
            + self.repository.len()
            + self.secret.len()
            + self.database.len()
            + self.task.len()
            + self.service.len()
    }

    /// Lower the file into a validated resource graph
    pub fn to_graph(&self, account_override: Option<&str>) -> Result<ResourceGraph> {
        let stack = Stack {
            name: self.stack.name.clone(),
            region: self.stack.region.clone(),
            account: account_override
                .map(str::to_string)
                .or_else(|| self.stack.account.clone()),
        };

        let mut builder = GraphBuilder::new(stack);
        for (id, spec) in &self.network {
            builder.add(id, ResourceSpec::Network(spec.clone()))?;
        }
        for (id, spec) in &self.cluster {
            builder.add(id, ResourceSpec::Cluster(spec.clone()))?;
        }
        for (id, spec) in &self.repository {
            builder.add(id, ResourceSpec::Repository(spec.clone()))?;
        }
        for (id, spec) in &self.secret {
            builder.add(id, ResourceSpec::Secret(spec.clone()))?;
        }
        for (id, spec) in &self.database {
            builder.add(id, ResourceSpec::Database(spec.clone()))?;
        }
        for (id, spec) in &self.task {
            builder.add(id, ResourceSpec::Task(spec.clone()))?;
        }
        for (id, spec) in &self.service {
            builder.add(id, ResourceSpec::Service(spec.clone()))?;
        }
        Ok(builder.build()?)
    }
}

/// Default state file location: `.gantry/state.toml` next to the config
pub fn default_state_path(config_path: &Path) -> PathBuf {
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(".gantry").join("state.toml")
}

/// Expand `~` in a user-supplied path
pub fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}
