//! Cluster resource: the compute home for services

use super::{Dependency, account, pseudo_id};
use crate::error::{Error, Result};
use crate::node::{ResourceKind, Stack};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Declared cluster shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSpec {
    /// Network node the cluster lives in
    pub network: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ClusterSpec {
    pub fn validate(&self, id: &str) -> Result<()> {
        if self.network.is_empty() {
            return Err(Error::config(id, "network must name a network node"));
        }
        Ok(())
    }

    pub fn dependencies(&self) -> Vec<Dependency> {
        vec![Dependency::structural("network", &self.network, ResourceKind::Network)]
    }

    pub fn plan_properties(&self) -> Result<serde_json::Value> {
        Ok(json!({
            "network": format!("${{{}.vpc_id}}", self.network),
        }))
    }

    pub fn synthesized_outputs(&self, id: &str, stack: &Stack) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "cluster_arn".to_string(),
            format!(
                "arn:aws:ecs:{}:{}:cluster/{}-{}",
                stack.region,
                account(stack),
                stack.name,
                pseudo_id(stack, id, "cluster", 8),
            ),
        )])
    }
}
