use crate::Context;
use crate::commands;
use crate::diff;
use crate::state::StackState;
use crate::ui;
use anyhow::Result;

/// Preview what apply would change, without touching anything.
pub fn run(ctx: &Context) -> Result<()> {
    ui::header("Topology Diff");

    let mut workspace = commands::load(ctx)?;
    let plan = commands::resolve_plan(ctx, &mut workspace)?;
    let state = StackState::load(&workspace.state_path)?;

    if state.is_none() {
        ui::info(&format!(
            "No state at {}, every resource is new",
            workspace.state_path.display()
        ));
    }

    let changes = diff::compute(&plan, state.as_ref());
    diff::display(&changes);

    for warning in &plan.warnings {
        ui::warn(&format!("{}: {}", warning.node, warning.message));
    }

    Ok(())
}
