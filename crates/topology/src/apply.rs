//! Apply: provision a plan one resource at a time
//!
//! The engine walks the plan in its recorded order, substitutes upstream
//! outputs into each node's properties, and hands the node to the
//! provisioning backend. Transient pushback is retried with exponential
//! backoff; a hard failure stops the walk. Nodes never attempted stay
//! `Declared` in the report so a partial apply reads at a glance.

use crate::emitter::Plan;
use crate::error::Error;
use crate::graph::ResourceGraph;
use crate::node::{NodeState, ResourceKind};
use crate::provider::{
    Disposition, ProvisionError, ProvisionRequest, ProvisionResponse, Provisioner, SecretStore,
};
use crate::resource::ResourceSpec;
use crate::value::substitute_tokens;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cooperative cancellation shared with a signal handler
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Retry schedule for transient backend pushback
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before re-attempting after `attempt` failures, doubling each
    /// time up to the cap
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Knobs for a single apply run
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub retry: RetryPolicy,
    pub cancel: CancelFlag,
}

/// Per-node outcome of an apply run
#[derive(Debug, Clone)]
pub struct ApplyRow {
    pub id: String,
    pub kind: ResourceKind,
    pub state: NodeState,
    /// How the backend disposed of the node, for synthesized rows
    pub disposition: Option<Disposition>,
    /// Failure detail, empty for clean rows
    pub detail: Option<String>,
    pub duration: Duration,
}

/// Everything a frontend needs to render the result of an apply
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub rows: Vec<ApplyRow>,
    /// Outputs per node id, only for synthesized nodes
    pub outputs: BTreeMap<String, BTreeMap<String, String>>,
    pub cancelled: bool,
}

impl ApplyReport {
    pub fn synthesized_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.state == NodeState::Synthesized)
            .count()
    }

    pub fn failed(&self) -> Option<&ApplyRow> {
        self.rows.iter().find(|r| r.state == NodeState::Failed)
    }

    /// True when every planned node was synthesized
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.rows.iter().all(|r| r.state == NodeState::Synthesized)
    }

    /// The failed row as an error, for callers that want to bail
    pub fn failure_error(&self) -> Option<Error> {
        self.failed().map(|row| Error::Provisioning {
            node: row.id.clone(),
            reason: row.detail.clone().unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

/// Drives one apply run against a provisioning backend
pub struct ApplyEngine<'a> {
    provisioner: &'a mut dyn Provisioner,
    secrets: &'a mut dyn SecretStore,
    options: ApplyOptions,
}

impl<'a> ApplyEngine<'a> {
    pub fn new(
        provisioner: &'a mut dyn Provisioner,
        secrets: &'a mut dyn SecretStore,
        options: ApplyOptions,
    ) -> Self {
        Self {
            provisioner,
            secrets,
            options,
        }
    }

    /// Walk the plan in order, stopping at cancellation or hard failure
    pub fn run(&mut self, graph: &mut ResourceGraph, plan: &Plan) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut halted = false;

        for planned in &plan.nodes {
            if halted {
                report.rows.push(ApplyRow {
                    id: planned.id.clone(),
                    kind: planned.kind,
                    state: NodeState::Declared,
                    disposition: None,
                    detail: None,
                    duration: Duration::ZERO,
                });
                continue;
            }
            if self.options.cancel.is_cancelled() {
                report.cancelled = true;
                halted = true;
                report.rows.push(ApplyRow {
                    id: planned.id.clone(),
                    kind: planned.kind,
                    state: NodeState::Declared,
                    disposition: None,
                    detail: None,
                    duration: Duration::ZERO,
                });
                continue;
            }

            let started = Instant::now();
            match self.apply_one(graph, planned, &report.outputs) {
                Ok(response) => {
                    graph.set_state(&planned.id, NodeState::Synthesized);
                    report.outputs.insert(planned.id.clone(), response.outputs);
                    report.rows.push(ApplyRow {
                        id: planned.id.clone(),
                        kind: planned.kind,
                        state: NodeState::Synthesized,
                        disposition: Some(response.disposition),
                        detail: None,
                        duration: started.elapsed(),
                    });
                }
                Err(detail) => {
                    graph.set_state(&planned.id, NodeState::Failed);
                    halted = true;
                    report.rows.push(ApplyRow {
                        id: planned.id.clone(),
                        kind: planned.kind,
                        state: NodeState::Failed,
                        disposition: None,
                        detail: Some(detail),
                        duration: started.elapsed(),
                    });
                }
            }
        }

        report
    }

    /// Provision a single node; the error string is the failure detail
    fn apply_one(
        &mut self,
        graph: &ResourceGraph,
        planned: &crate::resolver::ResolvedNode,
        outputs: &BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<ProvisionResponse, String> {
        let node = graph
            .node(&planned.id)
            .ok_or_else(|| "not present in the current configuration".to_string())?;
        if node.kind() != planned.kind {
            return Err(format!(
                "planned as {} but the configuration declares {}",
                planned.kind,
                node.kind(),
            ));
        }

        let mut properties = planned.properties.clone();
        substitute_value(&planned.id, &mut properties, outputs)?;

        // Secrets materialize their document before the backend records
        // the resource, so reruns reference instead of regenerate.
        if let ResourceSpec::Secret(spec) = &node.spec {
            self.secrets
                .ensure(&planned.id, spec)
                .map_err(|e| e.to_string())?;
        }

        let request = ProvisionRequest {
            id: &planned.id,
            kind: planned.kind,
            properties: &properties,
            fingerprint: &planned.fingerprint,
            stack: graph.stack(),
        };

        let mut attempt = 0;
        loop {
            match self.provisioner.provision(&request) {
                Ok(response) => return Ok(response),
                Err(ProvisionError::Throttled(reason)) => {
                    attempt += 1;
                    if attempt >= self.options.retry.attempts || self.options.cancel.is_cancelled()
                    {
                        return Err(format!("throttled: {reason}"));
                    }
                    std::thread::sleep(self.options.retry.delay_for(attempt - 1));
                }
                Err(ProvisionError::Failed(reason)) => return Err(reason),
            }
        }
    }
}

/// Replace `${node.output}` tokens in every string of a JSON tree
fn substitute_value(
    node_id: &str,
    value: &mut serde_json::Value,
    outputs: &BTreeMap<String, BTreeMap<String, String>>,
) -> Result<(), String> {
    match value {
        serde_json::Value::String(s) => match substitute_tokens(s, outputs) {
            Ok(rendered) => {
                *s = rendered;
                Ok(())
            }
            Err(reference) => Err(Error::UnresolvedReference {
                node: node_id.to_string(),
                target: reference.node.clone(),
                field: reference.to_string(),
            }
            .to_string()),
        },
        serde_json::Value::Array(items) => {
            for item in items {
                substitute_value(node_id, item, outputs)?;
            }
            Ok(())
        }
        serde_json::Value::Object(map) => {
            for item in map.values_mut() {
                substitute_value(node_id, item, outputs)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::emit;
    use crate::error::Result;
    use crate::graph::GraphBuilder;
    use crate::node::Stack;
    use crate::provider::StaticParameters;
    use crate::resolver::resolve;
    use crate::resource::{
        ContainerSpec, DatabaseSpec, Engine, Image, NetworkSpec, RemovalPolicy, ResourceSpec,
        SecretSpec, SubnetSpec, SubnetTier, TaskSpec,
    };
    use crate::value::{EnvValue, SecretKeyRef};

    /// Synthesizes outputs locally and records behavior knobs per node
    #[derive(Default)]
    struct MockBackend {
        calls: Vec<String>,
        seen_properties: BTreeMap<String, serde_json::Value>,
        throttle: BTreeMap<String, u32>,
        fail: Option<String>,
        omit_outputs: Option<String>,
        unchanged: Option<String>,
    }

    impl Provisioner for MockBackend {
        fn provision(
            &mut self,
            request: &ProvisionRequest<'_>,
        ) -> std::result::Result<ProvisionResponse, ProvisionError> {
            self.calls.push(request.id.to_string());
            assert!(!request.fingerprint.is_empty());
            if let Some(remaining) = self.throttle.get_mut(request.id)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(ProvisionError::Throttled("rate exceeded".to_string()));
            }
            if self.fail.as_deref() == Some(request.id) {
                return Err(ProvisionError::Failed("backend rejected".to_string()));
            }
            self.seen_properties
                .insert(request.id.to_string(), request.properties.clone());
            let outputs = if self.omit_outputs.as_deref() == Some(request.id) {
                BTreeMap::new()
            } else {
                request
                    .kind
                    .outputs()
                    .iter()
                    .map(|o| (o.to_string(), format!("{}-of-{}", o, request.id)))
                    .collect()
            };
            let disposition = if self.unchanged.as_deref() == Some(request.id) {
                Disposition::Unchanged
            } else {
                Disposition::Created
            };
            Ok(ProvisionResponse {
                outputs,
                disposition,
            })
        }
    }

    #[derive(Default)]
    struct MockSecrets {
        ensured: Vec<String>,
    }

    impl SecretStore for MockSecrets {
        fn ensure(&mut self, id: &str, spec: &SecretSpec) -> Result<BTreeMap<String, String>> {
            self.ensured.push(id.to_string());
            Ok(spec.credential_document("generated"))
        }
    }

    fn sample_graph() -> ResourceGraph {
        let mut b = GraphBuilder::new(Stack {
            name: "locator".to_string(),
            region: "eu-west-2".to_string(),
            account: None,
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
                template: BTreeMap::from([("username".to_string(), "postgres".to_string())]),
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
                port: 5432,
                ingress: Vec::new(),
                depends_on: Vec::new(),
            }),
        )
        .unwrap();
        b.add(
            "backend",
            ResourceSpec::Task(TaskSpec {
                cpu: 256,
                memory_mib: 512,
                container: ContainerSpec {
                    image: Image::Uri("public.ecr.aws/nginx:1.27".to_string()),
                    environment: BTreeMap::from([(
                        "DB_HOST".to_string(),
                        EnvValue::Literal("${db.endpoint_address}".to_string()),
                    )]),
                    secrets: BTreeMap::from([(
                        "DB_PASSWORD".to_string(),
                        SecretKeyRef {
                            secret: "db-creds".to_string(),
                            key: "password".to_string(),
                        },
                    )]),
                    port: Some(80),
                    log_stream_prefix: Some("AppLogs".to_string()),
                },
                depends_on: Vec::new(),
            }),
        )
        .unwrap();
        b.build().unwrap()
    }

    fn planned() -> (ResourceGraph, Plan) {
        let mut graph = sample_graph();
        let params = StaticParameters::default();
        let resolution = resolve(&mut graph, &params).unwrap();
        let plan = emit(&graph, resolution).unwrap();
        (graph, plan)
    }

    fn zero_delay() -> ApplyOptions {
        ApplyOptions {
            retry: RetryPolicy {
                attempts: 4,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            },
            cancel: CancelFlag::new(),
        }
    }

    #[test]
    fn test_apply_synthesizes_in_order() {
        let (mut graph, plan) = planned();
        let mut backend = MockBackend::default();
        let mut secrets = MockSecrets::default();
        let report =
            ApplyEngine::new(&mut backend, &mut secrets, zero_delay()).run(&mut graph, &plan);

        assert!(report.is_complete());
        assert_eq!(report.synthesized_count(), 4);
        assert_eq!(backend.calls, vec!["net", "db-creds", "db", "backend"]);
        assert_eq!(secrets.ensured, vec!["db-creds"]);
        for node in graph.nodes() {
            assert_eq!(node.state, NodeState::Synthesized);
        }
        for row in &report.rows {
            assert_eq!(row.disposition, Some(Disposition::Created));
        }
    }

    #[test]
    fn test_unchanged_resources_report_as_such() {
        let (mut graph, plan) = planned();
        let mut backend = MockBackend {
            unchanged: Some("net".to_string()),
            ..Default::default()
        };
        let mut secrets = MockSecrets::default();
        let report =
            ApplyEngine::new(&mut backend, &mut secrets, zero_delay()).run(&mut graph, &plan);

        assert!(report.is_complete());
        let net = report.rows.iter().find(|r| r.id == "net").unwrap();
        assert_eq!(net.disposition, Some(Disposition::Unchanged));
    }

    #[test]
    fn test_outputs_flow_downstream() {
        let (mut graph, plan) = planned();
        let mut backend = MockBackend::default();
        let mut secrets = MockSecrets::default();
        let report =
            ApplyEngine::new(&mut backend, &mut secrets, zero_delay()).run(&mut graph, &plan);

        let db_props = &backend.seen_properties["db"];
        assert_eq!(db_props["network"], "vpc_id-of-net");
        assert_eq!(db_props["credentials"], "secret_arn-of-db-creds");
        let task_props = &backend.seen_properties["backend"];
        assert_eq!(
            task_props["container"]["environment"]["DB_HOST"],
            "endpoint_address-of-db"
        );
        assert_eq!(
            task_props["container"]["secrets"]["DB_PASSWORD"],
            "secret_arn-of-db-creds:password"
        );
        assert_eq!(report.outputs["net"]["vpc_id"], "vpc_id-of-net");
    }

    #[test]
    fn test_hard_failure_stops_the_walk() {
        let (mut graph, plan) = planned();
        let mut backend = MockBackend {
            fail: Some("db".to_string()),
            ..Default::default()
        };
        let mut secrets = MockSecrets::default();
        let report =
            ApplyEngine::new(&mut backend, &mut secrets, zero_delay()).run(&mut graph, &plan);

        assert!(!report.is_complete());
        let states: Vec<NodeState> = report.rows.iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![
                NodeState::Synthesized,
                NodeState::Synthesized,
                NodeState::Failed,
                NodeState::Declared,
            ]
        );
        assert_eq!(report.failed().unwrap().id, "db");
        assert!(!backend.calls.contains(&"backend".to_string()));
        let err = report.failure_error().unwrap();
        assert!(matches!(err, Error::Provisioning { ref node, .. } if node == "db"));
    }

    #[test]
    fn test_throttled_calls_are_retried() {
        let (mut graph, plan) = planned();
        let mut backend = MockBackend {
            throttle: BTreeMap::from([("net".to_string(), 2)]),
            ..Default::default()
        };
        let mut secrets = MockSecrets::default();
        let report =
            ApplyEngine::new(&mut backend, &mut secrets, zero_delay()).run(&mut graph, &plan);

        assert!(report.is_complete());
        let net_calls = backend.calls.iter().filter(|c| *c == "net").count();
        assert_eq!(net_calls, 3);
    }

    #[test]
    fn test_throttling_exhausts_into_failure() {
        let (mut graph, plan) = planned();
        let mut backend = MockBackend {
            throttle: BTreeMap::from([("net".to_string(), 99)]),
            ..Default::default()
        };
        let mut secrets = MockSecrets::default();
        let report =
            ApplyEngine::new(&mut backend, &mut secrets, zero_delay()).run(&mut graph, &plan);

        let row = report.failed().unwrap();
        assert_eq!(row.id, "net");
        assert!(row.detail.as_deref().unwrap().contains("throttled"));
        assert_eq!(backend.calls.len(), 4);
    }

    #[test]
    fn test_cancellation_leaves_rest_declared() {
        let (mut graph, plan) = planned();
        let mut backend = MockBackend::default();
        let mut secrets = MockSecrets::default();
        let options = zero_delay();
        options.cancel.cancel();
        let report = ApplyEngine::new(&mut backend, &mut secrets, options).run(&mut graph, &plan);

        assert!(report.cancelled);
        assert!(backend.calls.is_empty());
        assert!(report.rows.iter().all(|r| r.state == NodeState::Declared));
    }

    #[test]
    fn test_missing_upstream_output_fails_downstream() {
        let (mut graph, plan) = planned();
        let mut backend = MockBackend {
            omit_outputs: Some("db".to_string()),
            ..Default::default()
        };
        let mut secrets = MockSecrets::default();
        let report =
            ApplyEngine::new(&mut backend, &mut secrets, zero_delay()).run(&mut graph, &plan);

        let row = report.failed().unwrap();
        assert_eq!(row.id, "backend");
        assert!(row.detail.as_deref().unwrap().contains("db.endpoint_address"));
    }

    #[test]
    fn test_backoff_schedule_caps() {
        let policy = RetryPolicy {
            attempts: 6,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(10), Duration::from_millis(500));
    }
}
