use crate::Context;
use crate::backend::{LocalBackend, LocalSecretStore};
use crate::cli::ApplyArgs;
use crate::commands;
use crate::diff;
use crate::progress::{self, ProgressProvisioner};
use crate::state::StackState;
use crate::ui;
use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use topology::{ApplyEngine, ApplyOptions, ApplyReport, CancelFlag, NodeState, RetryPolicy};

/// Resolve the topology, preview the changes, and provision them in
/// dependency order. State is saved after every run, complete or not.
pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    ui::header("Applying Topology");

    let mut workspace = commands::load(ctx)?;
    let plan = commands::resolve_plan(ctx, &mut workspace)?;
    let mut state = StackState::load_or_new(&workspace.state_path, &plan.stack, &plan.region)?;

    let changes = diff::compute(&plan, Some(&state));
    diff::display(&changes);

    for warning in &plan.warnings {
        ui::warn(&format!("{}: {}", warning.node, warning.message));
    }

    if !diff::has_changes(&changes) {
        // Stack metadata moves the plan fingerprint without touching any
        // resource form; adopt it here or status reports drift forever.
        if !args.dry_run && state.reconcile_plan(&plan) {
            state.save(&workspace.state_path)?;
        }
        println!();
        ui::success("State already matches the topology");
        return Ok(());
    }

    if args.dry_run {
        println!();
        ui::info("Dry run, nothing was provisioned");
        return Ok(());
    }

    if !args.yes {
        println!();
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Apply these changes to stack '{}'?", plan.stack))
            .default(false)
            .interact()?;
        if !confirmed {
            ui::info("Apply aborted");
            return Ok(());
        }
    }

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel())
            .context("Failed to install the Ctrl-C handler")?;
    }

    let mut backend = LocalBackend::new(&workspace.graph, &state);
    let mut secrets = LocalSecretStore::new(&state);
    let bar = progress::apply_bar(plan.nodes.len() as u64);
    let mut provisioner = ProgressProvisioner::new(&mut backend, bar);
    let options = ApplyOptions {
        retry: RetryPolicy::default(),
        cancel: cancel.clone(),
    };

    let report =
        ApplyEngine::new(&mut provisioner, &mut secrets, options).run(&mut workspace.graph, &plan);
    provisioner.finish();

    state.absorb_report(&plan, &report);
    state.store_secret_documents(secrets.into_documents());
    state.save(&workspace.state_path)?;

    render_report(&report);

    println!();
    if report.cancelled {
        ui::warn("Cancelled, remaining resources were left untouched");
    }
    if let Some(err) = report.failure_error() {
        ui::error("Apply did not finish");
        return Err(err.into());
    }
    ui::success(&format!(
        "{} resources in sync, state saved to {}",
        report.synthesized_count(),
        workspace.state_path.display()
    ));
    Ok(())
}

fn render_report(report: &ApplyReport) {
    ui::section("Resources");
    for row in &report.rows {
        let tag = match (row.state, row.disposition) {
            (_, Some(d)) => ui::disposition_tag(d),
            (NodeState::Failed, None) => "failed".red(),
            _ => "skipped".dimmed(),
        };
        let mut line = format!(
            "  {} {:<24} {} {}",
            ui::state_glyph(row.state),
            row.id,
            format!("{:<16}", row.kind.to_string()).dimmed(),
            tag
        );
        if !row.duration.is_zero() {
            line.push_str(&format!(" {}", ui::format_duration(row.duration).dimmed()));
        }
        println!("{}", line);
        if let Some(detail) = &row.detail {
            ui::dim(&format!("        {}", detail));
        }
    }
}
