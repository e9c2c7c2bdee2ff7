// src/graph/mod.rs

//! Feedstock dependency graph
//!
//! A directed graph over feedstocks where an edge `a -> b` means "`b`
//! depends on `a`": `a` is a predecessor (upstream) of `b`. Each node
//! carries the [`NodeAttrs`] payload produced by the graph builder.
//!
//! The graph is built once per scheduling pass and shared read-only between
//! jobs (usually behind an `Arc`). Jobs that need a different shape, such as
//! the architecture rebuilds, derive their own copy instead of mutating the
//! shared one.
//!
//! # Snapshot format
//!
//! ```json
//! {
//!   "nodes": {"numpy": {"feedstock_name": "numpy", ...}, "scipy": {...}},
//!   "edges": [["numpy", "scipy"]],
//!   "outputs_lut": {"numpy-base": ["numpy"]}
//! }
//! ```
//!
//! A node named in `edges` but absent from `nodes`, or listed with a `null`
//! payload, is kept without a payload; evaluating it is a graph
//! inconsistency.

pub mod prune;

use crate::attrs::NodeAttrs;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use tracing::{debug, error};

/// Map from a build output or import name to the feedstocks producing it
pub type OutputsLut = BTreeMap<String, BTreeSet<String>>;

/// Directed dependency graph over feedstocks
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Node name -> payload (None when the payload is missing)
    nodes: BTreeMap<String, Option<NodeAttrs>>,
    /// Node -> the nodes it depends on
    predecessors: BTreeMap<String, BTreeSet<String>>,
    /// Node -> the nodes depending on it
    successors: BTreeMap<String, BTreeSet<String>>,
    outputs_lut: OutputsLut,
}

#[derive(Deserialize)]
struct GraphSnapshot {
    #[serde(default)]
    nodes: BTreeMap<String, Option<NodeAttrs>>,
    #[serde(default)]
    edges: Vec<(String, String)>,
    #[serde(default)]
    outputs_lut: OutputsLut,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a graph from a JSON snapshot string
    pub fn from_json(content: &str) -> Result<Self> {
        let snapshot: GraphSnapshot = serde_json::from_str(content)?;
        let mut graph = Self::new();

        for (name, payload) in snapshot.nodes {
            match payload {
                Some(attrs) => graph.add_node(&name, attrs),
                None => graph.add_node_without_payload(&name),
            }
        }
        for (from, to) in &snapshot.edges {
            graph.add_edge(from, to);
        }

        graph.outputs_lut = if snapshot.outputs_lut.is_empty() {
            graph.make_outputs_lut()
        } else {
            snapshot.outputs_lut
        };

        debug!(
            "loaded graph with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Load a graph from a JSON snapshot file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read graph {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Add a node with its payload, replacing any previous payload
    pub fn add_node(&mut self, name: &str, attrs: NodeAttrs) {
        self.ensure_node(name);
        self.nodes.insert(name.to_string(), Some(attrs));
    }

    /// Add a node that has no payload
    pub fn add_node_without_payload(&mut self, name: &str) {
        self.ensure_node(name);
    }

    fn ensure_node(&mut self, name: &str) {
        self.nodes.entry(name.to_string()).or_insert(None);
        self.predecessors.entry(name.to_string()).or_default();
        self.successors.entry(name.to_string()).or_default();
    }

    /// Add the edge `from -> to` (`to` depends on `from`)
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.ensure_node(from);
        self.ensure_node(to);
        if let Some(succ) = self.successors.get_mut(from) {
            succ.insert(to.to_string());
        }
        if let Some(pred) = self.predecessors.get_mut(to) {
            pred.insert(from.to_string());
        }
    }

    /// Remove the edge `from -> to` if present
    pub fn remove_edge(&mut self, from: &str, to: &str) {
        if let Some(succ) = self.successors.get_mut(from) {
            succ.remove(to);
        }
        if let Some(pred) = self.predecessors.get_mut(to) {
            pred.remove(from);
        }
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, name: &str) {
        for pred in self.predecessors.remove(name).unwrap_or_default() {
            if let Some(succ) = self.successors.get_mut(&pred) {
                succ.remove(name);
            }
        }
        for succ in self.successors.remove(name).unwrap_or_default() {
            if let Some(pred) = self.predecessors.get_mut(&succ) {
                pred.remove(name);
            }
        }
        self.nodes.remove(name);
    }

    /// Drop every `n -> n` edge
    pub fn remove_self_loops(&mut self) {
        let looped: Vec<String> = self
            .successors
            .iter()
            .filter(|(name, succ)| succ.contains(*name))
            .map(|(name, _)| name.clone())
            .collect();
        for name in looped {
            self.remove_edge(&name, &name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// The graph's own copy of a node name
    pub fn node_name(&self, name: &str) -> Option<&str> {
        self.nodes.get_key_value(name).map(|(k, _)| k.as_str())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.successors.values().map(BTreeSet::len).sum()
    }

    /// Node names in sorted order
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Nodes with their payloads, in sorted order
    pub fn payloads(&self) -> impl Iterator<Item = (&str, Option<&NodeAttrs>)> {
        self.nodes.iter().map(|(n, p)| (n.as_str(), p.as_ref()))
    }

    /// All edges as `(from, to)` pairs
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.successors
            .iter()
            .flat_map(|(from, succ)| succ.iter().map(move |to| (from.as_str(), to.as_str())))
    }

    /// Payload of a node, `None` if the node or its payload is missing
    pub fn payload(&self, name: &str) -> Option<&NodeAttrs> {
        self.nodes.get(name).and_then(Option::as_ref)
    }

    /// Payload of a node that the graph references
    ///
    /// A missing payload means the shared graph is corrupt; it is logged
    /// and returned as [`Error::GraphInconsistency`].
    pub fn payload_checked(&self, name: &str) -> Result<&NodeAttrs> {
        self.payload(name).ok_or_else(|| {
            error!("node {} is referenced by the graph but has no payload", name);
            Error::GraphInconsistency {
                node: name.to_string(),
            }
        })
    }

    /// Direct upstreams of a node
    pub fn predecessors(&self, name: &str) -> impl Iterator<Item = &str> {
        self.predecessors
            .get(name)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Direct downstreams of a node
    pub fn successors(&self, name: &str) -> impl Iterator<Item = &str> {
        self.successors
            .get(name)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Nodes without predecessors, or whose only predecessor is themselves
    pub fn top_level(&self) -> BTreeSet<String> {
        self.predecessors
            .iter()
            .filter(|(name, preds)| preds.is_empty() || (preds.len() == 1 && preds.contains(*name)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Every node reachable downstream of `name`, excluding `name` itself
    pub fn descendants(&self, name: &str) -> BTreeSet<String> {
        Self::reachable(name, &self.successors)
    }

    /// Every node reachable upstream of `name`, excluding `name` itself
    pub fn ancestors(&self, name: &str) -> BTreeSet<String> {
        Self::reachable(name, &self.predecessors)
    }

    fn reachable(name: &str, adjacency: &BTreeMap<String, BTreeSet<String>>) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = adjacency
            .get(name)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();

        while let Some(node) = queue.pop_front() {
            if node != name && seen.insert(node.to_string()) {
                if let Some(next) = adjacency.get(node) {
                    queue.extend(next.iter().map(String::as_str));
                }
            }
        }

        seen
    }

    /// Same nodes and payloads, no edges
    pub fn empty_copy(&self) -> Self {
        let mut copy = Self::new();
        for (name, payload) in &self.nodes {
            match payload {
                Some(attrs) => copy.add_node(name, attrs.clone()),
                None => copy.add_node_without_payload(name),
            }
        }
        copy.outputs_lut = self.outputs_lut.clone();
        copy
    }

    /// Induced subgraph over `keep`; names absent from the graph are ignored
    pub fn subgraph<'a>(&self, keep: impl IntoIterator<Item = &'a str>) -> Self {
        let keep: BTreeSet<&str> = keep.into_iter().filter(|n| self.contains(n)).collect();
        let mut sub = Self::new();

        for name in &keep {
            match self.payload(name) {
                Some(attrs) => sub.add_node(name, attrs.clone()),
                None => sub.add_node_without_payload(name),
            }
        }
        for (from, to) in self.edges() {
            if keep.contains(from) && keep.contains(to) {
                sub.add_edge(from, to);
            }
        }
        sub.outputs_lut = self.outputs_lut.clone();
        sub
    }

    pub fn outputs_lut(&self) -> &OutputsLut {
        &self.outputs_lut
    }

    pub fn set_outputs_lut(&mut self, lut: OutputsLut) {
        self.outputs_lut = lut;
    }

    /// Build the outputs lookup table from each node's `outputs_names`
    pub fn make_outputs_lut(&self) -> OutputsLut {
        let mut lut = OutputsLut::new();
        for (name, payload) in &self.nodes {
            if let Some(attrs) = payload {
                for output in &attrs.outputs_names {
                    lut.entry(output.clone()).or_default().insert(name.clone());
                }
            }
        }
        lut
    }
}

/// Resolve requirement names to the feedstocks producing them
///
/// Names missing from the table resolve to themselves.
pub fn deps_from_outputs_lut<'a>(
    requirements: impl IntoIterator<Item = &'a str>,
    lut: &OutputsLut,
) -> BTreeSet<String> {
    requirements
        .into_iter()
        .flat_map(|req| match lut.get(req) {
            Some(producers) => producers.iter().cloned().collect::<Vec<_>>(),
            None => vec![req.to_string()],
        })
        .collect()
}
