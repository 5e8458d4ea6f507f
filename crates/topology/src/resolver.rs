//! Resolution: walk the graph in order and produce planned nodes
//!
//! Each node passes Declared -> Resolving -> Resolved. Parameter lookups
//! are resolved here and their values land in the planned properties.
//! References to other nodes' outputs stay as `${node.output}` tokens
//! because the real values only exist once apply has run.

use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::node::{NodeState, ResourceKind};
use crate::provider::ParameterStore;
use crate::resource::ResourceSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One node with its plan-time properties fixed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedNode {
    pub id: String,
    pub kind: ResourceKind,
    /// Unique dependency targets, sorted for stable output
    pub depends_on: Vec<String>,
    pub properties: serde_json::Value,
    /// blake3 digest of this node's planned form, used for drift and
    /// idempotency checks
    pub fingerprint: String,
}

/// Advisory finding attached to the plan, never a hard stop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanWarning {
    pub node: String,
    pub message: String,
}

/// Output of a full resolution pass, in resolution order
#[derive(Debug, Clone)]
pub struct Resolution {
    pub nodes: Vec<ResolvedNode>,
    pub warnings: Vec<PlanWarning>,
}

/// Resolve every node of a validated graph
///
/// On failure the offending node is marked `Failed` and the error comes
/// back; nodes resolved before it keep their `Resolved` state.
pub fn resolve(graph: &mut ResourceGraph, params: &dyn ParameterStore) -> Result<Resolution> {
    let order: Vec<String> = graph.ordered_ids().iter().map(|s| s.to_string()).collect();
    let mut nodes = Vec::with_capacity(order.len());
    let mut warnings = Vec::new();

    for id in &order {
        graph.set_state(id, NodeState::Resolving);
        let node = match graph.node(id) {
            Some(n) => n,
            None => continue,
        };
        let kind = node.kind();
        let depends_on: Vec<String> = node
            .spec
            .dependencies()
            .into_iter()
            .map(|d| d.target)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let properties = match node.spec.plan_properties(id, params) {
            Ok(props) => props,
            Err(err) => {
                graph.set_state(id, NodeState::Failed);
                return Err(err);
            }
        };

        collect_warnings(id, &node.spec, &mut warnings);
        let fingerprint = node_fingerprint(id, kind, &depends_on, &properties)?;
        nodes.push(ResolvedNode {
            id: id.clone(),
            kind,
            depends_on,
            properties,
            fingerprint,
        });
        graph.set_state(id, NodeState::Resolved);
    }

    Ok(Resolution { nodes, warnings })
}

/// Digest of one node's planned form
fn node_fingerprint(
    id: &str,
    kind: ResourceKind,
    depends_on: &[String],
    properties: &serde_json::Value,
) -> Result<String> {
    let canonical = serde_json::to_vec(&serde_json::json!({
        "id": id,
        "kind": kind,
        "depends_on": depends_on,
        "properties": properties,
    }))?;
    Ok(blake3::hash(&canonical).to_hex().to_string())
}

/// Findings worth surfacing: anything that widens exposure beyond the
/// private-by-default posture.
fn collect_warnings(id: &str, spec: &ResourceSpec, warnings: &mut Vec<PlanWarning>) {
    let open_ingress = |rules: &[crate::resource::IngressRule], warnings: &mut Vec<PlanWarning>| {
        for rule in rules {
            if rule.is_open() {
                warnings.push(PlanWarning {
                    node: id.to_string(),
                    message: format!("ingress on port {} is open to the whole internet", rule.port),
                });
            }
        }
    };
    match spec {
        ResourceSpec::Database(db) => {
            if db.publicly_accessible {
                warnings.push(PlanWarning {
                    node: id.to_string(),
                    message: "database instance is publicly accessible".to_string(),
                });
            }
            if db.backup_retention_days == 0 {
                warnings.push(PlanWarning {
                    node: id.to_string(),
                    message: "backups are disabled (backup_retention_days = 0)".to_string(),
                });
            }
            open_ingress(&db.ingress, warnings);
        }
        ResourceSpec::Service(svc) => {
            open_ingress(&svc.ingress, warnings);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::graph::GraphBuilder;
    use crate::node::Stack;
    use crate::provider::StaticParameters;
    use crate::resource::{
        ContainerSpec, DatabaseSpec, Engine, Image, IngressRule, NetworkSpec, RemovalPolicy,
        SecretSpec, SubnetSpec, SubnetTier, TaskSpec,
    };
    use crate::value::EnvValue;
    use std::collections::BTreeMap;

    fn stack() -> Stack {
        Stack {
            name: "locator".to_string(),
            region: "eu-west-2".to_string(),
            account: None,
        }
    }

    fn graph_with_database(ingress: Vec<IngressRule>, public: bool) -> ResourceGraph {
        let mut b = GraphBuilder::new(stack());
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
                publicly_accessible: public,
                backup_retention_days: 1,
                deletion_protection: false,
                storage_encrypted: true,
                removal_policy: RemovalPolicy::Destroy,
                port: 5432,
                ingress,
                depends_on: Vec::new(),
            }),
        )
        .unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_resolution_marks_nodes_resolved() {
        let mut graph = graph_with_database(Vec::new(), false);
        let params = StaticParameters::default();
        let resolution = resolve(&mut graph, &params).unwrap();
        assert_eq!(resolution.nodes.len(), 3);
        assert!(resolution.warnings.is_empty());
        for node in graph.nodes() {
            assert_eq!(node.state, NodeState::Resolved);
        }
    }

    #[test]
    fn test_database_properties_carry_tokens() {
        let mut graph = graph_with_database(Vec::new(), false);
        let params = StaticParameters::default();
        let resolution = resolve(&mut graph, &params).unwrap();
        let db = resolution.nodes.iter().find(|n| n.id == "db").unwrap();
        assert_eq!(db.properties["network"], "${net.vpc_id}");
        assert_eq!(db.properties["credentials"], "${db-creds.secret_arn}");
        assert_eq!(db.depends_on, vec!["db-creds", "net"]);
        assert_eq!(db.fingerprint.len(), 64);
    }

    #[test]
    fn test_exposure_warnings() {
        let mut graph = graph_with_database(
            vec![IngressRule {
                peer: "any-ipv4".to_string(),
                port: 5432,
                description: String::new(),
            }],
            true,
        );
        let params = StaticParameters::default();
        let resolution = resolve(&mut graph, &params).unwrap();
        let messages: Vec<&str> = resolution
            .warnings
            .iter()
            .map(|w| w.message.as_str())
            .collect();
        assert_eq!(resolution.warnings.len(), 2);
        assert!(messages.iter().any(|m| m.contains("publicly accessible")));
        assert!(messages.iter().any(|m| m.contains("port 5432")));
        assert!(resolution.warnings.iter().all(|w| w.node == "db"));
    }

    #[test]
    fn test_missing_parameter_marks_node_failed() {
        let mut b = GraphBuilder::new(stack());
        b.add(
            "backend",
            ResourceSpec::Task(TaskSpec {
                cpu: 256,
                memory_mib: 512,
                container: ContainerSpec {
                    image: Image::Uri("public.ecr.aws/nginx:1.27".to_string()),
                    environment: BTreeMap::from([(
                        "CF_ZONE_ID".to_string(),
                        EnvValue::Lookup {
                            parameter: "/cloudflare/zone_id".to_string(),
                        },
                    )]),
                    secrets: BTreeMap::new(),
                    port: Some(80),
                    log_stream_prefix: None,
                },
                depends_on: Vec::new(),
            }),
        )
        .unwrap();
        let mut graph = b.build().unwrap();
        let params = StaticParameters::default();
        let err = resolve(&mut graph, &params).unwrap_err();
        assert!(matches!(err, Error::Parameter { .. }));
        assert_eq!(graph.node("backend").unwrap().state, NodeState::Failed);
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let params = StaticParameters::default();
        let a = resolve(&mut graph_with_database(Vec::new(), false), &params).unwrap();
        let b = resolve(&mut graph_with_database(Vec::new(), false), &params).unwrap();
        assert_eq!(a.nodes, b.nodes);
    }
}
