// src/graph/prune.rs

//! Graph pruning passes
//!
//! Used by jobs that work on a derived copy of the feedstock graph. Every
//! pass operates in place and finishes by dropping self-loops that
//! reconnection may have introduced.

use super::DependencyGraph;
use std::collections::BTreeSet;
use tracing::debug;

/// Remove a node while keeping its upstreams connected to its downstreams
pub fn pluck(graph: &mut DependencyGraph, name: &str) {
    if !graph.contains(name) {
        return;
    }

    let preds: Vec<String> = graph.predecessors(name).map(str::to_string).collect();
    let succs: Vec<String> = graph.successors(name).map(str::to_string).collect();
    graph.remove_node(name);

    for pred in preds.iter().filter(|p| *p != name) {
        for succ in succs.iter().filter(|s| *s != name) {
            graph.add_edge(pred, succ);
        }
    }
}

/// Remove excluded packages together with everything downstream of them
pub fn filter_excluded_deps(graph: &mut DependencyGraph, excluded: &BTreeSet<String>) {
    let mut to_remove: BTreeSet<String> = excluded.clone();
    for dep in excluded {
        if graph.contains(dep) {
            to_remove.extend(graph.descendants(dep));
        }
    }

    debug!("excluding {} nodes from graph", to_remove.len());
    for node in &to_remove {
        pluck(graph, node);
    }
    graph.remove_self_loops();
}

/// Keep only the target packages and their upstreams
pub fn cut_to_target_packages(graph: &mut DependencyGraph, targets: &BTreeSet<String>) {
    let mut keep = targets.clone();
    for target in targets {
        if graph.contains(target) {
            keep.extend(graph.ancestors(target));
        }
    }

    let doomed: Vec<String> = graph
        .nodes()
        .filter(|n| !keep.contains(*n))
        .map(str::to_string)
        .collect();
    for node in &doomed {
        pluck(graph, node);
    }
    graph.remove_self_loops();
}

/// Whether a node name belongs to a stub or toolchain-internal package
fn is_stubby(name: &str) -> bool {
    name.ends_with("_stub")
        || name.starts_with("m2-")
        || name.starts_with("m2w64-")
        || name.starts_with("__")
}

/// Remove payload-less, stub, ignored and all-noarch nodes
pub fn filter_stubby_and_ignored_nodes(graph: &mut DependencyGraph, ignored: &BTreeSet<String>) {
    let doomed: Vec<String> = graph
        .payloads()
        .filter(|(name, payload)| match payload {
            None => true,
            Some(attrs) => is_stubby(name) || ignored.contains(*name) || attrs.all_noarch(),
        })
        .map(|(name, _)| name.to_string())
        .collect();

    for node in &doomed {
        pluck(graph, node);
    }
    graph.remove_self_loops();
}
