//! Per-stack apply state
//!
//! gantry records what it last applied in a TOML file next to the
//! topology (default `.gantry/state.toml`). The file carries the
//! fingerprint of the last plan that applied completely, one record per
//! resource, and the credential documents the local secret store
//! generated. Diff and status read it; apply rewrites it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use topology::{ApplyReport, NodeState, Plan, ResourceKind};

// ============================================================================
// State Structures
// ============================================================================

/// Everything known about a stack that has been applied before
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StackState {
    pub stack: String,
    pub region: String,
    /// Fingerprint of the last plan that applied completely
    #[serde(default)]
    pub plan_fingerprint: Option<String>,
    /// Last time the state was updated
    pub updated_at: DateTime<Utc>,
    /// One record per resource, keyed by node id
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
    /// Credential documents generated by the local secret store
    #[serde(default)]
    pub secrets: BTreeMap<String, BTreeMap<String, String>>,
}

/// Last-known state of a single resource
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    #[serde(default)]
    pub state: NodeState,
    /// Planned-form digest at the time of the last successful apply
    #[serde(default)]
    pub fingerprint: String,
    /// Set on success, kept across later failures
    pub applied_at: Option<DateTime<Utc>>,
    /// Failure detail from the last attempt, cleared on success
    pub error: Option<String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

// ============================================================================
// StackState Implementation
// ============================================================================

impl StackState {
    pub fn new(stack: &str, region: &str) -> Self {
        Self {
            stack: stack.to_string(),
            region: region.to_string(),
            plan_fingerprint: None,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
            secrets: BTreeMap::new(),
        }
    }

    /// Load state from disk; `Ok(None)` when no state file exists yet
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            log::debug!("No state file at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(Some(state))
    }

    /// Load existing state or start fresh for the given stack
    pub fn load_or_new(path: &Path, stack: &str, region: &str) -> Result<Self> {
        Ok(Self::load(path)?.unwrap_or_else(|| Self::new(stack, region)))
    }

    /// Save state to disk, creating the parent directory
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize state to TOML")?;

        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    // ========================================================================
    // Resource Record Helpers
    // ========================================================================

    pub fn resource(&self, id: &str) -> Option<&ResourceRecord> {
        self.resources.get(id)
    }

    /// Stored fingerprint for a resource, only while it stands
    /// synthesized. A failed record never counts as applied, so the
    /// resource shows up as pending work even when its planned form
    /// has not moved.
    pub fn fingerprint_of(&self, id: &str) -> Option<&str> {
        self.resources
            .get(id)
            .filter(|r| r.state == NodeState::Synthesized)
            .map(|r| r.fingerprint.as_str())
            .filter(|fp| !fp.is_empty())
    }

    /// Record a successful provisioning of one resource
    pub fn mark_synthesized(
        &mut self,
        id: &str,
        kind: ResourceKind,
        fingerprint: &str,
        outputs: BTreeMap<String, String>,
    ) {
        self.resources.insert(
            id.to_string(),
            ResourceRecord {
                kind,
                state: NodeState::Synthesized,
                fingerprint: fingerprint.to_string(),
                applied_at: Some(Utc::now()),
                error: None,
                outputs,
            },
        );
        self.updated_at = Utc::now();
    }

    /// Record a failed attempt, keeping outputs from earlier applies
    pub fn mark_failed(&mut self, id: &str, kind: ResourceKind, detail: &str) {
        let record = self
            .resources
            .entry(id.to_string())
            .or_insert_with(|| ResourceRecord {
                kind,
                state: NodeState::Declared,
                fingerprint: String::new(),
                applied_at: None,
                error: None,
                outputs: BTreeMap::new(),
            });
        record.kind = kind;
        record.state = NodeState::Failed;
        record.error = Some(detail.to_string());
        self.updated_at = Utc::now();
    }

    /// Fold the outcome of an apply run into the state
    ///
    /// Unattempted rows leave their records untouched. The plan-level
    /// fingerprint only advances on a complete run, so a partial apply
    /// keeps showing as drift.
    pub fn absorb_report(&mut self, plan: &Plan, report: &ApplyReport) {
        for row in &report.rows {
            match row.state {
                NodeState::Synthesized => {
                    let fingerprint = plan
                        .node(&row.id)
                        .map(|n| n.fingerprint.as_str())
                        .unwrap_or_default();
                    let outputs = report.outputs.get(&row.id).cloned().unwrap_or_default();
                    self.mark_synthesized(&row.id, row.kind, fingerprint, outputs);
                }
                NodeState::Failed => {
                    self.mark_failed(
                        &row.id,
                        row.kind,
                        row.detail.as_deref().unwrap_or("unknown"),
                    );
                }
                _ => {}
            }
        }
        if report.is_complete() {
            self.plan_fingerprint = Some(plan.fingerprint.clone());
        }
        self.updated_at = Utc::now();
    }

    /// Adopt a plan whose per-resource forms already match the recorded
    /// state. Stack metadata feeds the plan fingerprint but no resource
    /// fingerprint, so a metadata-only edit leaves nothing to provision
    /// while the recorded digest goes stale. Returns true when the state
    /// moved.
    pub fn reconcile_plan(&mut self, plan: &Plan) -> bool {
        if self.plan_fingerprint.as_deref() == Some(plan.fingerprint.as_str())
            && self.stack == plan.stack
            && self.region == plan.region
        {
            return false;
        }
        self.stack = plan.stack.clone();
        self.region = plan.region.clone();
        self.plan_fingerprint = Some(plan.fingerprint.clone());
        self.updated_at = Utc::now();
        true
    }

    // ========================================================================
    // Secret Document Helpers
    // ========================================================================

    pub fn secret_document(&self, id: &str) -> Option<&BTreeMap<String, String>> {
        self.secrets.get(id)
    }

    pub fn store_secret_documents(
        &mut self,
        documents: BTreeMap<String, BTreeMap<String, String>>,
    ) {
        self.secrets = documents;
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use topology::{
        GraphBuilder, NetworkSpec, ResourceSpec, Stack, StaticParameters, SubnetSpec, SubnetTier,
        emit, resolve,
    };

    fn network_plan(region: &str) -> Plan {
        let mut b = GraphBuilder::new(Stack {
            name: "locator".to_string(),
            region: region.to_string(),
            account: None,
        });
        b.add(
            "net",
            ResourceSpec::Network(NetworkSpec {
                cidr: "10.0.0.0/16".to_string(),
                max_azs: 2,
                nat_gateways: 0,
                subnets: vec![SubnetSpec {
                    name: "public".to_string(),
                    tier: SubnetTier::Public,
                }],
                depends_on: Vec::new(),
            }),
        )
        .unwrap();
        let mut graph = b.build().unwrap();
        let resolution = resolve(&mut graph, &StaticParameters::default()).unwrap();
        emit(&graph, resolution).unwrap()
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        assert!(StackState::load(&path).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".gantry").join("state.toml");

        let mut state = StackState::new("locator", "eu-west-2");
        state.mark_synthesized(
            "net",
            ResourceKind::Network,
            "abc123",
            BTreeMap::from([("vpc_id".to_string(), "vpc-0a1b2c".to_string())]),
        );
        state.save(&path).unwrap();

        let loaded = StackState::load(&path).unwrap().unwrap();
        assert_eq!(loaded.stack, "locator");
        let record = loaded.resource("net").unwrap();
        assert_eq!(record.kind, ResourceKind::Network);
        assert_eq!(record.state, NodeState::Synthesized);
        assert_eq!(record.outputs["vpc_id"], "vpc-0a1b2c");
        assert!(record.applied_at.is_some());
    }

    #[test]
    fn test_failure_keeps_earlier_outputs() {
        let mut state = StackState::new("locator", "eu-west-2");
        state.mark_synthesized(
            "db",
            ResourceKind::Database,
            "fp-old",
            BTreeMap::from([("endpoint_port".to_string(), "5432".to_string())]),
        );
        state.mark_failed("db", ResourceKind::Database, "backend rejected");

        let record = state.resource("db").unwrap();
        assert_eq!(record.state, NodeState::Failed);
        assert_eq!(record.error.as_deref(), Some("backend rejected"));
        assert_eq!(record.outputs["endpoint_port"], "5432");
        assert_eq!(record.fingerprint, "fp-old");
        // A failed record no longer counts as applied
        assert!(state.fingerprint_of("db").is_none());
    }

    #[test]
    fn test_fingerprint_of_never_applied_is_none() {
        let mut state = StackState::new("locator", "eu-west-2");
        state.mark_failed("db", ResourceKind::Database, "first attempt failed");
        assert!(state.fingerprint_of("db").is_none());
    }

    #[test]
    fn test_success_clears_error() {
        let mut state = StackState::new("locator", "eu-west-2");
        state.mark_failed("db", ResourceKind::Database, "transient");
        state.mark_synthesized("db", ResourceKind::Database, "fp-new", BTreeMap::new());

        let record = state.resource("db").unwrap();
        assert_eq!(record.state, NodeState::Synthesized);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_region_change_reconciles_without_reapply() {
        let before = network_plan("eu-west-2");
        let after = network_plan("us-east-1");
        // The region moves the plan fingerprint but no resource form
        assert_eq!(
            before.node("net").unwrap().fingerprint,
            after.node("net").unwrap().fingerprint
        );
        assert_ne!(before.fingerprint, after.fingerprint);

        let mut state = StackState::new("locator", "eu-west-2");
        state.mark_synthesized(
            "net",
            ResourceKind::Network,
            &before.node("net").unwrap().fingerprint,
            BTreeMap::new(),
        );
        state.plan_fingerprint = Some(before.fingerprint.clone());

        assert!(state.reconcile_plan(&after));
        assert_eq!(state.plan_fingerprint.as_deref(), Some(after.fingerprint.as_str()));
        assert_eq!(state.region, "us-east-1");
        // Nothing left to adopt on a second pass
        assert!(!state.reconcile_plan(&after));
    }

    #[test]
    fn test_secret_documents_survive_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");

        let mut state = StackState::new("locator", "eu-west-2");
        state.store_secret_documents(BTreeMap::from([(
            "db-credentials".to_string(),
            BTreeMap::from([
                ("username".to_string(), "postgres".to_string()),
                ("password".to_string(), "s3cr3t-s3cr3t".to_string()),
            ]),
        )]));
        state.save(&path).unwrap();

        let loaded = StackState::load(&path).unwrap().unwrap();
        let doc = loaded.secret_document("db-credentials").unwrap();
        assert_eq!(doc["username"], "postgres");
        assert_eq!(doc["password"], "s3cr3t-s3cr3t");
    }

    #[test]
    fn test_serialization_is_stable_toml() {
        let mut state = StackState::new("locator", "eu-west-2");
        state.mark_synthesized("net", ResourceKind::Network, "abc123", BTreeMap::new());
        state.mark_failed("db", ResourceKind::Database, "boom");

        let toml_str = toml::to_string_pretty(&state).unwrap();
        assert!(toml_str.contains("[resources.net]"));
        assert!(toml_str.contains("[resources.db]"));
        assert!(toml_str.contains("kind = \"network\""));

        let restored: StackState = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.resources.len(), 2);
    }
}
