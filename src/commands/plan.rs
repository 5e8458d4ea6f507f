use crate::Context;
use crate::cli::PlanArgs;
use crate::commands;
use crate::ui;
use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use std::fs;

/// Resolve the topology and print the plan, optionally writing the
/// JSON artifact.
pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    ui::header("Topology Plan");

    let mut workspace = commands::load(ctx)?;
    let plan = commands::resolve_plan(ctx, &mut workspace)?;

    ui::kv("Stack", &plan.stack);
    ui::kv("Region", &plan.region);
    ui::kv("Account", &plan.account);

    ui::section("Resolution order");
    let total = plan.nodes.len();
    for (i, node) in plan.nodes.iter().enumerate() {
        println!(
            "  {} {:<24} {:<16} {}",
            format!("[{}/{}]", i + 1, total).dimmed(),
            node.id.bold(),
            node.kind.to_string(),
            node.fingerprint[..8].dimmed()
        );
        if ctx.verbose > 0 && !node.depends_on.is_empty() {
            ui::dim(&format!("        after {}", node.depends_on.join(", ")));
        }
    }

    if !plan.warnings.is_empty() {
        ui::section("Warnings");
        for warning in &plan.warnings {
            ui::warn(&format!("{}: {}", warning.node, warning.message));
        }
    }

    println!();
    ui::kv("Fingerprint", &plan.fingerprint);

    if let Some(out) = &args.out {
        let json = plan.to_json()?;
        fs::write(out, json + "\n")
            .with_context(|| format!("Could not write plan to {}", out.display()))?;
        println!();
        ui::success(&format!("Plan written to {}", out.display()));
    }

    Ok(())
}
