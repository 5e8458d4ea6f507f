use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(version)]
#[command(about = "Declarative deployment topologies - plan, diff, apply", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Topology file (defaults to gantry.toml, then gantry.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// State file (defaults to .gantry/state.toml next to the config)
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// Parameter source: a TOML file or an http(s) URL
    #[arg(long, global = true)]
    pub params: Option<String>,

    /// Account identifier stamped into synthesized identifiers
    #[arg(long, global = true, env = "GANTRY_ACCOUNT")]
    pub account: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check the topology for configuration and reference errors
    Validate,

    /// Resolve the topology into an ordered, fingerprinted plan
    Plan(PlanArgs),

    /// Compare the current plan against recorded state
    Diff,

    /// Provision every planned resource through the backend
    Apply(ApplyArgs),

    /// Show the recorded state of every resource
    Status,

    /// Print nodes, edges, and the resolution order
    Graph(GraphArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Per-command arguments
// ============================================================================

#[derive(Parser)]
pub struct PlanArgs {
    /// Write the plan artifact JSON to this path
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show what would change without provisioning anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser)]
pub struct GraphArgs {
    /// Emit Graphviz dot instead of the plain listing
    #[arg(long)]
    pub dot: bool,
}
