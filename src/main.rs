mod backend;
mod cli;
mod commands;
mod config;
mod diff;
mod params;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Explicit topology file, otherwise gantry.toml / gantry.json
    pub config: Option<PathBuf>,
    /// Explicit state file, otherwise `.gantry/state.toml` next to
    /// the topology
    pub state: Option<PathBuf>,
    /// Parameter store location, a file path or an http(s) URL
    pub params: Option<String>,
    pub account: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
        state: cli.state,
        params: cli.params,
        account: cli.account,
    };

    match cli.command {
        Command::Validate => commands::validate::run(&ctx),
        Command::Plan(args) => commands::plan::run(&ctx, &args),
        Command::Diff => commands::diff::run(&ctx),
        Command::Apply(args) => commands::apply::run(&ctx, &args),
        Command::Status => commands::status::run(&ctx),
        Command::Graph(args) => commands::graph::run(&ctx, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "gantry", &mut io::stdout());
            Ok(())
        }
    }
}
