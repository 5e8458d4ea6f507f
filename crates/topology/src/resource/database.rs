//! Database resource: a managed relational instance
//!
//! Placement and credentials are expressed as references to a network and
//! a secret node; both stay as tokens in the plan and are substituted
//! during apply once the upstream outputs exist.

use super::{Dependency, IngressRule, pseudo_id};
use crate::error::{Error, Result};
use crate::node::{ResourceKind, Stack};
use crate::resource::network::SubnetTier;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;

/// Supported database engines
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Engine {
    Postgres,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Postgres => write!(f, "postgres"),
        }
    }
}

/// What happens to the instance when its node is removed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalPolicy {
    #[default]
    Retain,
    Destroy,
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalPolicy::Retain => write!(f, "retain"),
            RemovalPolicy::Destroy => write!(f, "destroy"),
        }
    }
}

/// Declared database shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseSpec {
    pub engine: Engine,
    /// Engine major version, e.g. "15"
    pub engine_version: String,
    /// Network node the instance lives in
    pub network: String,
    /// Subnet tier within that network
    #[serde(default = "default_tier")]
    pub subnet_tier: SubnetTier,
    /// Secret node holding the master credentials
    pub credentials: String,
    pub database_name: String,
    #[serde(default = "default_instance_class")]
    pub instance_class: String,
    #[serde(default = "default_storage")]
    pub allocated_storage_gib: u32,
    #[serde(default)]
    pub multi_az: bool,
    #[serde(default)]
    pub publicly_accessible: bool,
    #[serde(default)]
    pub backup_retention_days: u32,
    #[serde(default)]
    pub deletion_protection: bool,
    #[serde(default = "default_encrypted")]
    pub storage_encrypted: bool,
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub ingress: Vec<IngressRule>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_tier() -> SubnetTier {
    SubnetTier::PrivateIsolated
}

fn default_instance_class() -> String {
    "t4g.micro".to_string()
}

fn default_storage() -> u32 {
    20
}

fn default_encrypted() -> bool {
    true
}

fn default_port() -> u16 {
    5432
}

impl DatabaseSpec {
    pub fn validate(&self, id: &str) -> Result<()> {
        if self.engine_version.is_empty() {
            return Err(Error::config(id, "engine_version must not be empty"));
        }
        if self.network.is_empty() {
            return Err(Error::config(id, "network must name a network node"));
        }
        if self.credentials.is_empty() {
            return Err(Error::config(id, "credentials must name a secret node"));
        }
        if self.database_name.is_empty() {
            return Err(Error::config(id, "database_name must not be empty"));
        }
        if !self
            .database_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::config(
                id,
                "database_name may only contain alphanumerics and underscores",
            ));
        }
        if self.allocated_storage_gib == 0 {
            return Err(Error::config(id, "allocated_storage_gib must be at least 1"));
        }
        if self.port == 0 {
            return Err(Error::config(id, "port must not be zero"));
        }
        for rule in &self.ingress {
            rule.validate(id)?;
        }
        Ok(())
    }

    pub fn dependencies(&self) -> Vec<Dependency> {
        vec![
            Dependency::structural("network", &self.network, ResourceKind::Network),
            Dependency::structural("credentials", &self.credentials, ResourceKind::Secret),
        ]
    }

    pub fn plan_properties(&self) -> Result<serde_json::Value> {
        Ok(json!({
            "engine": self.engine.to_string(),
            "engine_version": self.engine_version,
            "network": format!("${{{}.vpc_id}}", self.network),
            "subnet_tier": self.subnet_tier.to_string(),
            "credentials": format!("${{{}.secret_arn}}", self.credentials),
            "database_name": self.database_name,
            "instance_class": self.instance_class,
            "allocated_storage_gib": self.allocated_storage_gib,
            "multi_az": self.multi_az,
            "publicly_accessible": self.publicly_accessible,
            "backup_retention_days": self.backup_retention_days,
            "deletion_protection": self.deletion_protection,
            "storage_encrypted": self.storage_encrypted,
            "removal_policy": self.removal_policy.to_string(),
            "port": self.port,
            "ingress": self.ingress,
        }))
    }

    pub fn synthesized_outputs(&self, id: &str, stack: &Stack) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                "endpoint_address".to_string(),
                format!(
                    "{}.{}.{}.rds.amazonaws.com",
                    id,
                    pseudo_id(stack, id, "endpoint", 12),
                    stack.region,
                ),
            ),
            ("endpoint_port".to_string(), self.port.to_string()),
        ])
    }
}
