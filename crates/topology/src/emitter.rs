//! Plan artifact: serialization and fingerprinting
//!
//! The artifact is plain JSON with every map backed by a `BTreeMap`, so
//! the same resolution always serializes to the same bytes. The
//! fingerprint is a blake3 digest of those bytes with the fingerprint
//! field itself blanked, which lets `diff` detect drift by comparing two
//! fingerprints instead of two trees.

use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::resolver::{PlanWarning, Resolution, ResolvedNode};
use serde::{Deserialize, Serialize};

/// Bumped when the artifact layout changes shape
pub const PLAN_FORMAT_VERSION: u32 = 1;

/// A fully resolved, ordered, fingerprinted deployment plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub format_version: u32,
    pub stack: String,
    pub region: String,
    pub account: String,
    /// Nodes in resolution order
    pub nodes: Vec<ResolvedNode>,
    pub warnings: Vec<PlanWarning>,
    /// blake3 hex digest of the artifact with this field blanked
    pub fingerprint: String,
}

/// Assemble the artifact for a resolved graph
pub fn emit(graph: &ResourceGraph, resolution: Resolution) -> Result<Plan> {
    let stack = graph.stack();
    let mut plan = Plan {
        format_version: PLAN_FORMAT_VERSION,
        stack: stack.name.clone(),
        region: stack.region.clone(),
        account: crate::resource::account(stack).to_string(),
        nodes: resolution.nodes,
        warnings: resolution.warnings,
        fingerprint: String::new(),
    };
    plan.fingerprint = plan.compute_fingerprint()?;
    Ok(plan)
}

impl Plan {
    pub fn node(&self, id: &str) -> Option<&ResolvedNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Ids in resolution order
    pub fn ordered_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Digest over the canonical bytes, fingerprint field blanked
    fn compute_fingerprint(&self) -> Result<String> {
        let mut blank = self.clone();
        blank.fingerprint = String::new();
        let bytes = serde_json::to_vec(&blank)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    /// True when the stored fingerprint matches the artifact contents
    pub fn verify_fingerprint(&self) -> bool {
        self.compute_fingerprint()
            .map(|f| f == self.fingerprint)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::node::Stack;
    use crate::provider::StaticParameters;
    use crate::resolver::resolve;
    use crate::resource::{
        DatabaseSpec, Engine, NetworkSpec, RemovalPolicy, ResourceSpec, SecretSpec, SubnetSpec,
        SubnetTier,
    };
    use std::collections::BTreeMap;

    fn graph(port: u16) -> ResourceGraph {
        let mut b = GraphBuilder::new(Stack {
            name: "locator".to_string(),
            region: "eu-west-2".to_string(),
            account: Some("123456789012".to_string()),
        });
        b.add(
            "net",
            ResourceSpec::Network(NetworkSpec {
                cidr: "10.0.0.0/16".to_string(),
                max_azs: 2,
                nat_gateways: 0,
                subnets: vec![SubnetSpec {
                    name: "data".to_string(),
                    tier: SubnetTier::PrivateIsolated,
                }],
                depends_on: Vec::new(),
            }),
        )
        .unwrap();
        b.add(
            "db-creds",
            ResourceSpec::Secret(SecretSpec {
                name: "pg".to_string(),
                template: BTreeMap::new(),
                generate_key: "password".to_string(),
                length: 32,
                exclude_punctuation: true,
                include_space: false,
                depends_on: Vec::new(),
            }),
        )
        .unwrap();
        b.add(
            "db",
            ResourceSpec::Database(DatabaseSpec {
                engine: Engine::Postgres,
                engine_version: "15".to_string(),
                network: "net".to_string(),
                subnet_tier: SubnetTier::PrivateIsolated,
                credentials: "db-creds".to_string(),
                database_name: "appdb".to_string(),
                instance_class: "t4g.micro".to_string(),
                allocated_storage_gib: 20,
                multi_az: false,
                publicly_accessible: false,
                backup_retention_days: 1,
                deletion_protection: false,
                storage_encrypted: true,
                removal_policy: RemovalPolicy::Destroy,
                port,
                ingress: Vec::new(),
                depends_on: Vec::new(),
            }),
        )
        .unwrap();
        b.build().unwrap()
    }

    fn plan(port: u16) -> Plan {
        let mut g = graph(port);
        let params = StaticParameters::default();
        let resolution = resolve(&mut g, &params).unwrap();
        emit(&g, resolution).unwrap()
    }

    #[test]
    fn test_fingerprint_verifies() {
        let plan = plan(5432);
        assert!(!plan.fingerprint.is_empty());
        assert!(plan.verify_fingerprint());
    }

    #[test]
    fn test_tampering_breaks_fingerprint() {
        let mut plan = plan(5432);
        plan.stack = "other".to_string();
        assert!(!plan.verify_fingerprint());
    }

    #[test]
    fn test_emission_is_byte_identical() {
        let a = plan(5432);
        let b = plan(5432);
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        assert_ne!(plan(5432).fingerprint, plan(5433).fingerprint);
    }

    #[test]
    fn test_round_trip() {
        let plan = plan(5432);
        let restored = Plan::from_json(&plan.to_json().unwrap()).unwrap();
        assert_eq!(restored, plan);
        assert!(restored.verify_fingerprint());
        assert_eq!(restored.ordered_ids(), vec!["net", "db-creds", "db"]);
    }
}
