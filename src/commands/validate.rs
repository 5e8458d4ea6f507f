use crate::Context;
use crate::commands;
use crate::ui;
use anyhow::Result;

/// Parse the topology, lower it, and report what it declares.
///
/// Reference and cycle errors surface here without touching state or
/// the parameter store.
pub fn run(ctx: &Context) -> Result<()> {
    let workspace = commands::load(ctx)?;
    let stack = workspace.graph.stack();

    if !ctx.quiet {
        ui::header("Topology Check");
        ui::kv("Config", &workspace.config_path.display().to_string());
        ui::kv("Stack", &stack.name);
        ui::kv("Region", &stack.region);
        ui::kv("Resources", &workspace.graph.len().to_string());
        println!();
    }

    ui::success(&format!(
        "{} is valid: {} resources, all references resolve",
        workspace.config_path.display(),
        workspace.graph.len()
    ));
    Ok(())
}
