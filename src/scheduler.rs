// src/scheduler.rs

//! Dependency-aware visiting order
//!
//! Feedstocks are visited upstream-first wherever the graph allows it. Each
//! node is emitted once all of its predecessors have been, found by a
//! depth-first walk up the predecessor edges. Cycles do not stop the walk:
//! a node already on the path is simply not revisited, so members of a
//! cycle are emitted in some order without waiting on each other.
//!
//! Seeds are tried in three tiers, each sorted by name:
//!
//! 1. top-level nodes (no upstream, or only themselves)
//! 2. members of declared cycle groups not emitted yet
//! 3. anything still unvisited
//!
//! so every node of the input graph is emitted exactly once.

use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::migrator::{Eligibility, Migrator, SkipReason};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// Predecessors of a node, reversed so that popping yields sorted order
fn pending_predecessors<'g>(graph: &'g DependencyGraph, node: &str) -> Vec<&'g str> {
    let mut preds: Vec<&str> = graph.predecessors(node).collect();
    preds.reverse();
    preds
}

/// Emit `start` after everything upstream of it that is not yet visited
fn visit<'g>(
    graph: &'g DependencyGraph,
    start: &'g str,
    visited: &mut HashSet<&'g str>,
    emitted: &mut Vec<String>,
) {
    if !visited.insert(start) {
        return;
    }

    let mut stack: Vec<(&'g str, Vec<&'g str>)> = vec![(start, pending_predecessors(graph, start))];
    while let Some((node, pending)) = stack.last_mut() {
        match pending.pop() {
            Some(next) => {
                if visited.insert(next) {
                    stack.push((next, pending_predecessors(graph, next)));
                }
            }
            None => {
                emitted.push(node.to_string());
                stack.pop();
            }
        }
    }
}

/// Order every node of `graph`, upstream first, tolerating cycles
pub fn schedule(
    graph: &DependencyGraph,
    top_level: &BTreeSet<String>,
    cycles: &BTreeSet<String>,
) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut emitted = Vec::with_capacity(graph.node_count());

    let seeds = top_level
        .iter()
        .chain(cycles.iter())
        .filter_map(|n| graph.node_name(n))
        .chain(graph.nodes());

    for seed in seeds {
        visit(graph, seed, &mut visited, &mut emitted);
    }

    emitted
}

/// Result of evaluating one job against the graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Eligible feedstocks in visiting order
    pub order: Vec<String>,
    /// Filtered-out feedstocks and why
    pub skipped: BTreeMap<String, SkipReason>,
    /// Maximum PRs to open this run; zero means unlimited
    pub pr_limit: usize,
}

impl MigrationPlan {
    /// The feedstocks to attempt this run
    pub fn batch(&self) -> &[String] {
        if self.pr_limit == 0 {
            &self.order
        } else {
            &self.order[..self.order.len().min(self.pr_limit)]
        }
    }
}

/// Filter every candidate feedstock and order the eligible ones
///
/// Candidates are the job's own working graph if it keeps one, otherwise
/// `total`. A candidate without payload aborts the plan.
pub fn plan_migrations<M: Migrator + ?Sized>(job: &M, total: &DependencyGraph) -> Result<MigrationPlan> {
    let working = job.working_graph().unwrap_or(total);
    let mut eligible = Vec::new();
    let mut skipped = BTreeMap::new();

    for name in working.nodes() {
        let attrs = working.payload_checked(name)?;
        match job.filter(attrs)? {
            Eligibility::Proceed => eligible.push(name),
            Eligibility::Skip(reason) => {
                debug!("{}: skipped ({})", name, reason);
                skipped.insert(name.to_string(), reason);
            }
        }
    }

    let eligible_graph = working.subgraph(eligible.iter().copied());
    let order = job.order(&eligible_graph, total);

    info!(
        "{}: {} eligible, {} skipped",
        job.migrator_name(),
        order.len(),
        skipped.len()
    );

    Ok(MigrationPlan {
        order,
        skipped,
        pr_limit: job.settings().pr_limit,
    })
}
