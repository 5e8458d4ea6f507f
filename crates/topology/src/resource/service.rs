//! Service resource: long-running copies of a task on a cluster

use super::{Dependency, IngressRule};
use crate::error::{Error, Result};
use crate::node::{ResourceKind, Stack};
use crate::resource::network::SubnetTier;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Declared service shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSpec {
    /// Cluster node the service runs on
    pub cluster: String,
    /// Task definition node the service launches
    pub task: String,
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,
    #[serde(default)]
    pub assign_public_ip: bool,
    #[serde(default = "default_tier")]
    pub subnet_tier: SubnetTier,
    #[serde(default)]
    pub ingress: Vec<IngressRule>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_desired_count() -> u32 {
    1
}

fn default_tier() -> SubnetTier {
    SubnetTier::Public
}

impl ServiceSpec {
    pub fn validate(&self, id: &str) -> Result<()> {
        if self.cluster.is_empty() {
            return Err(Error::config(id, "cluster must name a cluster node"));
        }
        if self.task.is_empty() {
            return Err(Error::config(id, "task must name a task node"));
        }
        if self.assign_public_ip && self.subnet_tier != SubnetTier::Public {
            return Err(Error::config(
                id,
                "assign_public_ip requires placement in the public tier",
            ));
        }
        for rule in &self.ingress {
            rule.validate(id)?;
        }
        Ok(())
    }

    pub fn dependencies(&self) -> Vec<Dependency> {
        vec![
            Dependency::structural("cluster", &self.cluster, ResourceKind::Cluster),
            Dependency::structural("task", &self.task, ResourceKind::TaskDefinition),
        ]
    }

    pub fn plan_properties(&self) -> Result<serde_json::Value> {
        Ok(json!({
            "cluster": format!("${{{}.cluster_arn}}", self.cluster),
            "task": format!("${{{}.task_definition_arn}}", self.task),
            "desired_count": self.desired_count,
            "assign_public_ip": self.assign_public_ip,
            "subnet_tier": self.subnet_tier.to_string(),
            "ingress": self.ingress,
        }))
    }

    pub fn synthesized_outputs(&self, id: &str, stack: &Stack) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "service_arn".to_string(),
            format!(
                "arn:aws:ecs:{}:{}:service/{}/{}",
                stack.region,
                super::account(stack),
                stack.name,
                id,
            ),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ServiceSpec {
        ServiceSpec {
            cluster: "app-cluster".to_string(),
            task: "backend-task".to_string(),
            desired_count: 1,
            assign_public_ip: true,
            subnet_tier: SubnetTier::Public,
            ingress: vec![IngressRule {
                peer: "any-ipv4".to_string(),
                port: 80,
                description: "inbound http".to_string(),
            }],
            depends_on: Vec::new(),
        }
    }

    #[test]
    fn test_public_ip_requires_public_tier() {
        let mut s = spec();
        assert!(s.validate("backend").is_ok());
        s.subnet_tier = SubnetTier::PrivateIsolated;
        assert!(s.validate("backend").is_err());
    }

    #[test]
    fn test_dependencies_cover_cluster_and_task() {
        let deps = spec().dependencies();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].expects, Some(ResourceKind::Cluster));
        assert_eq!(deps[1].expects, Some(ResourceKind::TaskDefinition));
    }

    #[test]
    fn test_plan_properties_keep_reference_tokens() {
        let props = spec().plan_properties().unwrap();
        assert_eq!(props["cluster"], "${app-cluster.cluster_arn}");
        assert_eq!(props["task"], "${backend-task.task_definition_arn}");
        assert_eq!(props["ingress"][0]["peer"], "any-ipv4");
    }
}
