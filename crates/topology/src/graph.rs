//! Resource graph construction and deterministic ordering
//!
//! The builder collects declared nodes, then `build` validates every spec,
//! checks each reference against the node it names, and fixes the
//! resolution order. Given the same declarations the order is always the
//! same: ready nodes are taken in declaration order, never by hash or by
//! whatever an iterator happens to yield.

use crate::error::{Error, Result};
use crate::node::{NodeState, ResourceNode, Stack};
use crate::resource::{Dependency, ResourceSpec};
use crate::value::{Reference, Template, is_valid_node_id};
use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use std::collections::{BTreeMap, BTreeSet};

/// Collects declared resources before validation
#[derive(Debug)]
pub struct GraphBuilder {
    stack: Stack,
    nodes: Vec<ResourceNode>,
    index: BTreeMap<String, usize>,
}

impl GraphBuilder {
    pub fn new(stack: Stack) -> Self {
        Self {
            stack,
            nodes: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    /// Declare a node. Ids are unique across all kinds and must stay
    /// inside the grammar a `${node.output}` token can name.
    pub fn add(&mut self, id: impl Into<String>, spec: ResourceSpec) -> Result<&mut Self> {
        let id = id.into();
        if !is_valid_node_id(&id) {
            return Err(Error::config(
                &id,
                "node id must be letters, digits, '-' or '_', starting with a letter or digit",
            ));
        }
        if self.index.contains_key(&id) {
            return Err(Error::config(&id, "node id declared more than once"));
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(ResourceNode::new(id, spec));
        Ok(self)
    }

    /// Validate every node and reference, then fix the resolution order
    pub fn build(self) -> Result<ResourceGraph> {
        let Self { stack, nodes, index } = self;

        for node in &nodes {
            node.spec.validate(&node.id)?;
        }

        let mut edges: DiGraphMap<usize, ()> = DiGraphMap::new();
        for i in 0..nodes.len() {
            edges.add_node(i);
        }

        for (i, node) in nodes.iter().enumerate() {
            let deps = node.spec.dependencies();
            for dep in &deps {
                if dep.target == node.id {
                    return Err(Error::Cycle {
                        node: node.id.clone(),
                    });
                }
                let Some(&target_idx) = index.get(&dep.target) else {
                    return Err(Error::UnresolvedReference {
                        node: node.id.clone(),
                        target: dep.target.clone(),
                        field: dep.field.clone(),
                    });
                };
                let target = &nodes[target_idx];
                if let Some(expected) = dep.expects
                    && target.kind() != expected
                {
                    return Err(Error::config(
                        &node.id,
                        format!(
                            "{} must reference a {} node, but '{}' is a {}",
                            dep.field,
                            expected,
                            dep.target,
                            target.kind(),
                        ),
                    ));
                }
                if let Some(output) = &dep.output
                    && !target.kind().has_output(output)
                {
                    return Err(Error::config(
                        &node.id,
                        format!(
                            "{} references '${{{}.{}}}' but {} nodes expose no output '{}'",
                            dep.field,
                            dep.target,
                            output,
                            target.kind(),
                            output,
                        ),
                    ));
                }
                check_placement(node, target, &nodes, &index)?;
                edges.add_edge(target_idx, i, ());
            }
            check_embedded_tokens(node, &deps, &nodes, &index)?;
        }

        let order = resolution_order(&nodes, &edges)?;

        Ok(ResourceGraph {
            stack,
            nodes,
            index,
            edges,
            order,
        })
    }
}

/// Checks that need the target's spec, not just its kind
fn check_placement(
    node: &ResourceNode,
    target: &ResourceNode,
    nodes: &[ResourceNode],
    index: &BTreeMap<String, usize>,
) -> Result<()> {
    match (&node.spec, &target.spec) {
        // A database sits in a subnet tier its network must declare.
        (ResourceSpec::Database(db), ResourceSpec::Network(net)) => {
            if !net.has_tier(db.subnet_tier) {
                return Err(Error::config(
                    &node.id,
                    format!(
                        "network '{}' declares no {} subnet to place the database in",
                        target.id, db.subnet_tier,
                    ),
                ));
            }
        }
        // A service's tier lives in the network behind its cluster.
        (ResourceSpec::Service(svc), ResourceSpec::Cluster(cluster)) => {
            if let Some(&net_idx) = index.get(&cluster.network)
                && let ResourceSpec::Network(net) = &nodes[net_idx].spec
                && !net.has_tier(svc.subnet_tier)
            {
                return Err(Error::config(
                    &node.id,
                    format!(
                        "network '{}' declares no {} subnet to place the service in",
                        cluster.network, svc.subnet_tier,
                    ),
                ));
            }
        }
        // A secret handle must name a key the document will contain.
        (ResourceSpec::Task(task), ResourceSpec::Secret(secret)) => {
            for (name, handle) in &task.container.secrets {
                if handle.secret == target.id && !secret.has_key(&handle.key) {
                    return Err(Error::config(
                        &node.id,
                        format!(
                            "secrets.{} names key '{}' which secret '{}' does not contain",
                            name, handle.key, target.id,
                        ),
                    ));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Apply substitutes `${node.output}` tokens wherever a string carries
/// one, so every embedded token must be backed by a declared edge and
/// must name an output its target exposes.
fn check_embedded_tokens(
    node: &ResourceNode,
    deps: &[Dependency],
    nodes: &[ResourceNode],
    index: &BTreeMap<String, usize>,
) -> Result<()> {
    let declared = node.spec.declared_properties()?;
    let mut hits = Vec::new();
    collect_token_refs(&declared, &mut Vec::new(), &mut hits);
    for (field, reference) in hits {
        if !deps.iter().any(|d| d.target == reference.node) {
            if index.contains_key(&reference.node) {
                return Err(Error::config(
                    &node.id,
                    format!(
                        "{} references '${{{}.{}}}' but declares no dependency on '{}'",
                        field, reference.node, reference.output, reference.node,
                    ),
                ));
            }
            return Err(Error::UnresolvedReference {
                node: node.id.clone(),
                target: reference.node,
                field,
            });
        }
        let target = &nodes[index[&reference.node]];
        if !target.kind().has_output(&reference.output) {
            return Err(Error::config(
                &node.id,
                format!(
                    "{} references '${{{}.{}}}' but {} nodes expose no output '{}'",
                    field,
                    reference.node,
                    reference.output,
                    target.kind(),
                    reference.output,
                ),
            ));
        }
    }
    Ok(())
}

/// Walk a serialized spec, recording every string-borne reference with
/// the dotted path of the field that carries it
fn collect_token_refs(
    value: &serde_json::Value,
    path: &mut Vec<String>,
    hits: &mut Vec<(String, Reference)>,
) {
    match value {
        serde_json::Value::String(s) => {
            for reference in Template::parse(s).refs() {
                hits.push((path.join("."), reference.clone()));
            }
        }
        serde_json::Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(i.to_string());
                collect_token_refs(item, path, hits);
                path.pop();
            }
        }
        serde_json::Value::Object(map) => {
            for (key, item) in map {
                path.push(key.clone());
                collect_token_refs(item, path, hits);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Kahn's algorithm with the ready set kept in declaration order
fn resolution_order(nodes: &[ResourceNode], edges: &DiGraphMap<usize, ()>) -> Result<Vec<usize>> {
    let mut indegree = vec![0usize; nodes.len()];
    for i in 0..nodes.len() {
        indegree[i] = edges.neighbors_directed(i, Direction::Incoming).count();
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(&next) = ready.first() {
        ready.remove(&next);
        order.push(next);
        for dependent in edges.neighbors_directed(next, Direction::Outgoing) {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != nodes.len() {
        // Earliest-declared node still blocked names the cycle.
        let blocked = (0..nodes.len())
            .find(|i| !order.contains(i))
            .map(|i| nodes[i].id.clone())
            .unwrap_or_default();
        return Err(Error::Cycle { node: blocked });
    }

    Ok(order)
}

/// Validated topology with a fixed resolution order
#[derive(Debug)]
pub struct ResourceGraph {
    stack: Stack,
    nodes: Vec<ResourceNode>,
    index: BTreeMap<String, usize>,
    edges: DiGraphMap<usize, ()>,
    order: Vec<usize>,
}

impl ResourceGraph {
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    /// Node ids in resolution order
    pub fn ordered_ids(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.nodes[i].id.as_str()).collect()
    }

    /// Declared dependencies of a node, implicit and explicit
    pub fn dependencies(&self, id: &str) -> Vec<Dependency> {
        self.node(id)
            .map(|n| n.spec.dependencies())
            .unwrap_or_default()
    }

    /// Ids of nodes that depend on `id`, in declaration order
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<usize> = self
            .edges
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        out.sort_unstable();
        out.into_iter().map(|i| self.nodes[i].id.as_str()).collect()
    }

    pub fn set_state(&mut self, id: &str, state: NodeState) {
        if let Some(&i) = self.index.get(id) {
            self.nodes[i].state = state;
        }
    }
}
