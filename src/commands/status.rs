use crate::Context;
use crate::commands;
use crate::state::StackState;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeSet;
use topology::NodeState;

/// Show the recorded state of every resource and whether it drifted
/// from the current topology.
pub fn run(ctx: &Context) -> Result<()> {
    ui::header("Topology Status");

    let mut workspace = commands::load(ctx)?;
    let Some(state) = StackState::load(&workspace.state_path)? else {
        ui::info(&format!(
            "No state at {}, run 'gantry apply' first",
            workspace.state_path.display()
        ));
        return Ok(());
    };

    ui::kv("Stack", &state.stack);
    ui::kv("Region", &state.region);
    ui::kv(
        "Updated",
        &state.updated_at.format("%Y-%m-%d %H:%M UTC").to_string(),
    );

    // Drift needs the current plan; state is still worth showing when
    // resolution fails, so a broken parameter store only degrades this.
    let plan = match commands::resolve_plan(ctx, &mut workspace) {
        Ok(plan) => Some(plan),
        Err(err) => {
            ui::warn(&format!("Could not resolve the current topology: {err:#}"));
            None
        }
    };

    println!();
    match (&plan, &state.plan_fingerprint) {
        (Some(p), Some(fp)) if *fp == p.fingerprint => {
            ui::success("State matches the current topology")
        }
        (Some(_), Some(_)) => ui::warn("Drift: state does not match the current topology"),
        (Some(_), None) => ui::info("No complete apply recorded yet"),
        (None, _) => {}
    }

    ui::section("Resources");
    match &plan {
        Some(plan) => {
            for node in &plan.nodes {
                match state.resource(&node.id) {
                    Some(record) => print_record(ctx, &node.id, record),
                    None => println!(
                        "  {} {:<24} {} {}",
                        ui::state_glyph(NodeState::Declared),
                        node.id,
                        format!("{:<16}", node.kind.to_string()).dimmed(),
                        "never applied".dimmed()
                    ),
                }
            }

            let planned: BTreeSet<&str> = plan.nodes.iter().map(|n| n.id.as_str()).collect();
            let orphans: Vec<_> = state
                .resources
                .iter()
                .filter(|(id, _)| !planned.contains(id.as_str()))
                .collect();
            if !orphans.is_empty() {
                ui::section("No longer declared");
                for (id, record) in orphans {
                    println!(
                        "  {} {:<24} {}",
                        "!".yellow(),
                        id,
                        format!("{:<16}", record.kind.to_string()).dimmed()
                    );
                }
                ui::dim("  These stay in state; gantry does not tear resources down");
            }
        }
        None => {
            for (id, record) in &state.resources {
                print_record(ctx, id, record);
            }
        }
    }

    Ok(())
}

fn print_record(ctx: &Context, id: &str, record: &crate::state::ResourceRecord) {
    let when = record
        .applied_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "  {} {:<24} {} {}",
        ui::state_glyph(record.state),
        id,
        format!("{:<16}", record.kind.to_string()).dimmed(),
        when.dimmed()
    );
    if let Some(error) = &record.error {
        ui::dim(&format!("        {}", error));
    }
    if ctx.verbose > 0 {
        for (key, value) in &record.outputs {
            println!("        {} = {}", key.dimmed(), value);
        }
    }
}
