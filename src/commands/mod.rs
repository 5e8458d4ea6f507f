// Topology commands
pub mod apply;
pub mod diff;
pub mod graph;
pub mod plan;
pub mod status;
pub mod validate;

use crate::Context;
use crate::config::{self, TopologyConfig};
use crate::params;
use anyhow::Result;
use std::path::PathBuf;
use topology::{Plan, ResourceGraph, emit, resolve};

/// Topology file lowered into a graph, plus the paths derived from
/// its location
pub struct Workspace {
    pub config_path: PathBuf,
    pub state_path: PathBuf,
    pub graph: ResourceGraph,
}

/// Load the topology file and lower it into a validated graph
pub fn load(ctx: &Context) -> Result<Workspace> {
    let (config, config_path) = TopologyConfig::load(ctx.config.as_deref())?;
    let graph = config.to_graph(ctx.account.as_deref())?;
    let state_path = match &ctx.state {
        Some(path) => config::expand(path),
        None => config::default_state_path(&config_path),
    };
    log::debug!(
        "Lowered {} resources, state file {}",
        graph.len(),
        state_path.display()
    );
    Ok(Workspace {
        config_path,
        state_path,
        graph,
    })
}

/// Resolve the graph against the parameter store and emit a plan
pub fn resolve_plan(ctx: &Context, workspace: &mut Workspace) -> Result<Plan> {
    let params = params::open(ctx.params.as_deref())?;
    let resolution = resolve(&mut workspace.graph, params.as_ref())?;
    Ok(emit(&workspace.graph, resolution)?)
}
