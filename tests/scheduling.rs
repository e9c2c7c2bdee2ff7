// tests/scheduling.rs

//! Planning graph-aware jobs across successive runs.

mod common;

use chrono::{Duration, Utc};
use common::{append_record, graph_of, pr_record, snapshot_graph};
use feedstock_tick::{
    plan_migrations, DependencyGraph, Eligibility, GraphMigrator, GraphScope, MigrationConfig,
    Migrator, MigratorSettings, NodeAttrs, PrState, SkipReason,
};
use std::str::FromStr;
use std::sync::Arc;

fn graph_job(graph: &DependencyGraph) -> GraphMigrator {
    let scope = GraphScope::new(Arc::new(graph.clone())).with_top_level(graph.top_level());
    GraphMigrator::new(MigratorSettings::new(0), Some("python312"), scope)
}

/// Mark `node` as migrated by `job`, as the PR-posting side would
fn record_merged(graph: &mut DependencyGraph, job: &GraphMigrator, node: &str) {
    let uid = job.migrator_uid(graph.payload(node).unwrap());
    append_record(graph, node, pr_record(&uid, PrState::Merged, None));
}

#[test]
fn test_migration_rolls_down_in_waves() {
    let mut graph = snapshot_graph();
    let tagger = graph_job(&graph);

    let plan = plan_migrations(&graph_job(&graph), &graph).unwrap();
    assert_eq!(plan.order, vec!["python"]);
    assert_eq!(plan.skipped["numpy"], SkipReason::PredecessorsNotBuilt);
    assert_eq!(plan.skipped["oldpkg"], SkipReason::Archived);

    record_merged(&mut graph, &tagger, "python");
    let plan = plan_migrations(&graph_job(&graph), &graph).unwrap();
    assert_eq!(plan.order, vec!["numpy"]);
    assert_eq!(plan.skipped["python"], SkipReason::AlreadyMigrated);

    record_merged(&mut graph, &tagger, "numpy");
    let plan = plan_migrations(&graph_job(&graph), &graph).unwrap();
    // the archived upstream of scipy does not hold it back
    assert_eq!(plan.order, vec!["scipy"]);
    assert_eq!(plan.skipped["scikit-learn"], SkipReason::PredecessorsNotBuilt);

    record_merged(&mut graph, &tagger, "scipy");
    let plan = plan_migrations(&graph_job(&graph), &graph).unwrap();
    assert_eq!(plan.order, vec!["scikit-learn"]);
}

#[test]
fn test_open_upstream_pr_holds_back_dependents() {
    let mut graph = snapshot_graph();
    let uid = graph_job(&graph).migrator_uid(graph.payload("python").unwrap());
    append_record(&mut graph, "python", pr_record(&uid, PrState::Open, Some(Utc::now())));

    let plan = plan_migrations(&graph_job(&graph), &graph).unwrap();
    assert!(plan.order.is_empty());
    assert_eq!(plan.skipped["numpy"], SkipReason::PredecessorsNotBuilt);
}

#[test]
fn test_eligible_feedstocks_come_upstream_first() {
    let graph = graph_of(
        &["a", "b", "c", "d"],
        &[("a", "b"), ("b", "c"), ("a", "d"), ("d", "c")],
    );
    let scope = GraphScope::new(Arc::new(graph.clone())).with_top_level(
        ["a", "b", "c", "d"].map(String::from),
    );
    let job = GraphMigrator::new(MigratorSettings::new(0), None, scope);

    let plan = plan_migrations(&job, &graph).unwrap();
    assert_eq!(plan.order.len(), 4);
    assert_eq!(plan.order[0], "a");
    assert_eq!(plan.order[3], "c");
}

#[test]
fn test_declared_cycle_is_scheduled_whole() {
    let graph = graph_of(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
    let scope = GraphScope::new(Arc::new(graph.clone()))
        .with_cycles([vec!["a".to_string(), "b".to_string(), "c".to_string()]]);
    let job = GraphMigrator::new(MigratorSettings::new(0), None, scope);

    let plan = plan_migrations(&job, &graph).unwrap();
    let mut order = plan.order.clone();
    order.sort();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert!(plan.skipped.is_empty());
}

#[test]
fn test_top_level_ignores_unbuilt_upstream() {
    let graph = graph_of(&["up", "down"], &[("up", "down")]);
    let scope =
        GraphScope::new(Arc::new(graph.clone())).with_top_level(["down".to_string()]);
    let job = GraphMigrator::new(MigratorSettings::new(0), None, scope);

    assert_eq!(
        job.filter(graph.payload("down").unwrap()).unwrap(),
        Eligibility::Proceed
    );
}

#[test]
fn test_pr_limit_truncates_batch() {
    let graph = graph_of(&["a", "b", "c"], &[]);
    let scope = GraphScope::new(Arc::new(graph.clone())).with_top_level(graph.top_level());
    let job = GraphMigrator::new(MigratorSettings::new(0).with_pr_limit(2), None, scope);

    let plan = plan_migrations(&job, &graph).unwrap();
    assert_eq!(plan.order.len(), 3);
    assert_eq!(plan.batch(), ["a".to_string(), "b".to_string()]);
}

#[test]
fn test_missing_payload_aborts_plan() {
    let mut graph = graph_of(&["a"], &[]);
    graph.add_node_without_payload("ghost");
    let job = graph_job(&graph);

    assert!(plan_migrations(&job, &graph).is_err());
}

#[test]
fn test_version_bump_reopens_migrated_feedstocks() {
    let mut graph = graph_of(&["a"], &[]);
    let old = graph_job(&graph);
    record_merged(&mut graph, &old, "a");

    let scope = GraphScope::new(Arc::new(graph.clone())).with_top_level(graph.top_level());
    let bumped = GraphMigrator::new(
        MigratorSettings::new(0).with_obj_version(Some(1)),
        Some("python312"),
        scope,
    );
    let plan = plan_migrations(&bumped, &graph).unwrap();
    assert_eq!(plan.order, vec!["a"]);
}

#[test]
fn test_pinning_feedstock_moves_on_stale_upstream() {
    let mut graph = graph_of(
        &["libfoo", "conda-forge-pinning"],
        &[("libfoo", "conda-forge-pinning")],
    );
    let uid = graph_job(&graph).migrator_uid(&NodeAttrs::new("libfoo"));
    let opened = Utc::now() - Duration::days(20);
    append_record(&mut graph, "libfoo", pr_record(&uid, PrState::Open, Some(opened)));

    let plan = plan_migrations(&graph_job(&graph), &graph).unwrap();
    assert_eq!(plan.order, vec!["conda-forge-pinning"]);
}

#[test]
fn test_jobs_from_config() {
    let config = MigrationConfig::from_str(
        r#"
[scheduler]
pinning_feedstock = "pinning"

[[graph]]
name = "python312"
top_level = ["python"]

[[replacement]]
old = "numpy"
new = "numpy-base"
pr_limit = 1
"#,
    )
    .unwrap();
    let graph = Arc::new(snapshot_graph());
    let jobs = config.build_jobs(&graph).unwrap();
    assert_eq!(jobs.len(), 2);

    let plan = plan_migrations(jobs[0].as_ref(), &graph).unwrap();
    assert_eq!(plan.order, vec!["python"]);

    let plan = plan_migrations(jobs[1].as_ref(), &graph).unwrap();
    assert_eq!(plan.pr_limit, 1);
    assert_eq!(plan.batch().len(), 1);
}
