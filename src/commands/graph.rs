use crate::Context;
use crate::cli::GraphArgs;
use crate::commands;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeSet;
use topology::ResourceGraph;

/// Show the dependency graph and the order resolution will walk it.
///
/// `--dot` emits Graphviz on stdout and nothing else, for piping.
pub fn run(ctx: &Context, args: &GraphArgs) -> Result<()> {
    let workspace = commands::load(ctx)?;

    if args.dot {
        print_dot(&workspace.graph);
        return Ok(());
    }

    ui::header("Topology Graph");
    ui::kv("Stack", &workspace.graph.stack().name);
    ui::kv("Resources", &workspace.graph.len().to_string());

    ui::section("Dependencies");
    for node in workspace.graph.nodes() {
        println!(
            "  {:<24} {}",
            node.id.bold(),
            node.kind().to_string().dimmed()
        );
        let targets = dependency_targets(&workspace.graph, &node.id);
        if !targets.is_empty() {
            ui::dim(&format!(
                "      needs {}",
                targets.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
    }

    ui::section("Resolution order");
    let total = workspace.graph.len();
    for (i, id) in workspace.graph.ordered_ids().into_iter().enumerate() {
        ui::step(i + 1, total, id);
    }

    Ok(())
}

/// Unique dependency targets of one node; a node can reference the
/// same target through several fields
fn dependency_targets(graph: &ResourceGraph, id: &str) -> BTreeSet<String> {
    graph
        .dependencies(id)
        .into_iter()
        .map(|d| d.target)
        .collect()
}

fn print_dot(graph: &ResourceGraph) {
    println!("digraph \"{}\" {{", graph.stack().name);
    println!("  rankdir=LR;");
    for node in graph.nodes() {
        println!(
            "  \"{}\" [label=\"{}\\n{}\"];",
            node.id,
            node.id,
            node.kind()
        );
    }
    // Edges point the way outputs flow, producer to consumer
    for node in graph.nodes() {
        for dependent in graph.dependents(&node.id) {
            println!("  \"{}\" -> \"{}\";", node.id, dependent);
        }
    }
    println!("}}");
}
