//! Plan-versus-state comparison and its display

use crate::state::StackState;
use colored::Colorize;
use std::collections::BTreeMap;
use topology::{Plan, ResourceKind};

/// How one resource would change if the plan were applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Change {
    pub id: String,
    pub kind: ResourceKind,
    pub change: ChangeKind,
    /// Digest transition shown dimmed next to the id
    pub detail: String,
}

/// Compare every planned resource against the recorded state, in plan order
pub fn compute(plan: &Plan, state: Option<&StackState>) -> Vec<Change> {
    plan.nodes
        .iter()
        .map(|node| {
            let stored = state.and_then(|s| s.fingerprint_of(&node.id));
            let record = state.and_then(|s| s.resource(&node.id));
            let (change, detail) = match stored {
                Some(fp) if fp == node.fingerprint => {
                    (ChangeKind::Unchanged, short(fp).to_string())
                }
                Some(fp) => (
                    ChangeKind::Update,
                    format!("{} → {}", short(fp), short(&node.fingerprint)),
                ),
                // No applied fingerprint. A record that applied before
                // (say it failed afterwards) is an update, matching what
                // the backend will report; anything else is a create.
                None => match record {
                    Some(r) if r.applied_at.is_some() => {
                        (ChangeKind::Update, "(reapply)".to_string())
                    }
                    _ => (ChangeKind::Create, "(new)".to_string()),
                },
            };
            Change {
                id: node.id.clone(),
                kind: node.kind,
                change,
                detail,
            }
        })
        .collect()
}

/// (create, update, unchanged) totals
pub fn counts(changes: &[Change]) -> (usize, usize, usize) {
    let create = changes.iter().filter(|c| c.change == ChangeKind::Create).count();
    let update = changes.iter().filter(|c| c.change == ChangeKind::Update).count();
    (create, update, changes.len() - create - update)
}

pub fn has_changes(changes: &[Change]) -> bool {
    changes.iter().any(|c| c.change != ChangeKind::Unchanged)
}

/// Display the diff grouped by resource kind
pub fn display(changes: &[Change]) {
    if changes.is_empty() {
        println!();
        println!("  {} Nothing to apply", "✓".green());
        return;
    }

    let mut by_kind: BTreeMap<ResourceKind, Vec<&Change>> = BTreeMap::new();
    for change in changes {
        by_kind.entry(change.kind).or_default().push(change);
    }

    println!();
    println!(
        "┌─ {} ────────────────────────────────────────────┐",
        "Topology Diff".bold()
    );
    println!("│");

    for (kind, kind_changes) in &by_kind {
        println!("│ {}", heading(*kind).bold());

        for change in kind_changes {
            let symbol = match change.change {
                ChangeKind::Create => "+".green(),
                ChangeKind::Update => "~".yellow(),
                ChangeKind::Unchanged => "=".dimmed(),
            };
            println!(
                "│   {} {:<30} {}",
                symbol,
                change.id,
                change.detail.dimmed()
            );
        }
        println!("│");
    }

    let (create, update, unchanged) = counts(changes);
    println!("├──────────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} unchanged",
        create.to_string().green(),
        update.to_string().yellow(),
        unchanged.to_string().dimmed(),
    );
    println!("└──────────────────────────────────────────────────────────┘");
}

fn heading(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Network => "Networks",
        ResourceKind::Cluster => "Clusters",
        ResourceKind::Repository => "Repositories",
        ResourceKind::Secret => "Secrets",
        ResourceKind::Database => "Databases",
        ResourceKind::TaskDefinition => "Task definitions",
        ResourceKind::Service => "Services",
    }
}

/// First eight hex characters, enough to eyeball a digest
fn short(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(8)]
}
