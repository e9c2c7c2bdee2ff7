// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use feedstock_tick::{DependencyGraph, HostedPr, MigrationUid, NodeAttrs, PrRecord, PrState};
use std::path::PathBuf;
use tempfile::TempDir;

/// Snapshot of a small feedstock graph:
///
/// ```text
/// python -> numpy -> scipy -> scikit-learn
///              \-------------------^
/// ```
///
/// plus an archived `oldpkg` upstream of `scipy`.
pub const SNAPSHOT: &str = r#"{
  "nodes": {
    "python": {"feedstock_name": "python", "name": "python"},
    "numpy": {
      "feedstock_name": "numpy",
      "name": "numpy",
      "requirements": {"host": ["python"], "run": ["python"]},
      "outputs_names": ["numpy", "numpy-base"]
    },
    "scipy": {
      "feedstock_name": "scipy",
      "name": "scipy",
      "requirements": {"host": ["python", "numpy-base", "oldpkg"]}
    },
    "scikit-learn": {
      "feedstock_name": "scikit-learn",
      "name": "scikit-learn",
      "requirements": {"host": ["numpy", "scipy"], "test": ["pytest"]}
    },
    "oldpkg": {"feedstock_name": "oldpkg", "name": "oldpkg", "archived": true}
  },
  "edges": [
    ["python", "numpy"],
    ["numpy", "scipy"],
    ["numpy", "scikit-learn"],
    ["scipy", "scikit-learn"],
    ["oldpkg", "scipy"]
  ]
}"#;

pub fn snapshot_graph() -> DependencyGraph {
    DependencyGraph::from_json(SNAPSHOT).unwrap()
}

/// Graph over `nodes` with payloads named after each node
pub fn graph_of(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for name in nodes {
        graph.add_node(name, NodeAttrs::new(name));
    }
    for (from, to) in edges {
        graph.add_edge(from, to);
    }
    graph
}

/// The record the PR-posting side appends after a migration
pub fn pr_record(uid: &MigrationUid, state: PrState, created_at: Option<DateTime<Utc>>) -> PrRecord {
    PrRecord::from_uid(
        uid,
        Some(HostedPr {
            state: Some(state),
            created_at: created_at.map(|ts| ts.to_rfc3339()),
            html_url: Some("https://github.com/conda-forge/example-feedstock/pull/1".to_string()),
        }),
    )
}

/// Append a PR record to a node of `graph`
pub fn append_record(graph: &mut DependencyGraph, node: &str, record: PrRecord) {
    let mut attrs = graph.payload(node).unwrap().clone();
    attrs.pr_info.pred.push(record);
    graph.add_node(node, attrs);
}

/// Checkout with `<root>/recipe/meta.yaml` holding `meta`
///
/// Returns (TempDir, recipe_dir) - keep the TempDir alive to prevent cleanup.
pub fn recipe_checkout(meta: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let recipe_dir = dir.path().join("recipe");
    std::fs::create_dir(&recipe_dir).unwrap();
    std::fs::write(recipe_dir.join("meta.yaml"), meta).unwrap();
    (dir, recipe_dir)
}

pub fn read_meta(recipe_dir: &std::path::Path) -> String {
    std::fs::read_to_string(recipe_dir.join("meta.yaml")).unwrap()
}
