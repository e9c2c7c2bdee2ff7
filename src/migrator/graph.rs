// src/migrator/graph.rs

//! Graph-aware job
//!
//! A [`GraphMigrator`] only proposes a migration to a feedstock once its
//! upstream feedstocks have been migrated, so that changes roll down the
//! dependency graph in waves. The readiness logic lives in [`GraphScope`].

use super::{Eligibility, GraphScope, Migrator, MigratorSettings, NameStamp};
use crate::attrs::NodeAttrs;
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::scheduler;

/// Default number of downstream feedstocks listed in a PR body
pub const DEFAULT_CHILDREN_LIMIT: usize = 5;

/// Job gated on upstream feedstocks having been migrated first
#[derive(Debug)]
pub struct GraphMigrator {
    settings: MigratorSettings,
    name: Option<String>,
    scope: GraphScope,
}

impl GraphMigrator {
    pub fn new(settings: MigratorSettings, name: Option<&str>, scope: GraphScope) -> Self {
        Self {
            settings,
            name: name.map(str::to_string),
            scope,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn scope(&self) -> &GraphScope {
        &self.scope
    }

    /// Feedstocks that depend directly on `feedstock`, by name, capped at `limit`
    pub fn downstream_children(&self, feedstock: &str, limit: usize) -> Vec<String> {
        self.scope
            .graph()
            .successors(feedstock)
            .take(limit)
            .map(str::to_string)
            .collect()
    }
}

impl Migrator for GraphMigrator {
    fn migrator_name(&self) -> &str {
        "GraphMigrator"
    }

    fn settings(&self) -> &MigratorSettings {
        &self.settings
    }

    fn name_stamp(&self) -> NameStamp {
        NameStamp::from_option(self.name.as_deref())
    }

    fn working_graph(&self) -> Option<&DependencyGraph> {
        Some(self.scope.graph())
    }

    fn filter(&self, attrs: &NodeAttrs) -> Result<Eligibility> {
        self.scope.filter(self, attrs)
    }

    fn order(&self, eligible: &DependencyGraph, _total: &DependencyGraph) -> Vec<String> {
        let mut seeds = eligible.top_level();
        seeds.extend(
            self.scope
                .top_level()
                .iter()
                .filter(|n| eligible.contains(n))
                .cloned(),
        );
        scheduler::schedule(eligible, &seeds, self.scope.cycles())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::{BadStatus, HostedPr, PrRecord, PrState};
    use crate::error::Error;
    use crate::migrator::{MigrationUid, SkipReason};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap()
    }

    fn uid() -> MigrationUid {
        MigrationUid::new("GraphMigrator", 0).with_name(NameStamp::Named("libfoo2".to_string()))
    }

    fn record(state: Option<PrState>, created_at: Option<DateTime<Utc>>) -> PrRecord {
        PrRecord::from_uid(
            &uid(),
            Some(HostedPr {
                state,
                created_at: created_at.map(|ts| ts.to_rfc3339()),
                html_url: None,
            }),
        )
    }

    /// `upstream -> target`, with `upstream` carrying the given records
    fn pair(target: &str, upstream_records: Vec<PrRecord>) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        let mut upstream = NodeAttrs::new("upstream");
        upstream.pr_info.pred = upstream_records;
        graph.add_node("upstream", upstream);
        graph.add_node(target, NodeAttrs::new(target));
        graph.add_edge("upstream", target);
        graph
    }

    fn job_with(graph: DependencyGraph, configure: impl FnOnce(GraphScope) -> GraphScope) -> GraphMigrator {
        let scope = configure(GraphScope::new(Arc::new(graph)));
        GraphMigrator::new(MigratorSettings::new(0), Some("libfoo2"), scope)
    }

    fn job(graph: DependencyGraph) -> GraphMigrator {
        job_with(graph, |scope| scope)
    }

    fn decide(job: &GraphMigrator, name: &str) -> Eligibility {
        let attrs = job.scope().graph().payload(name).unwrap().clone();
        job.scope().filter_at(job, &attrs, now()).unwrap()
    }

    #[test]
    fn test_identity_stamps_name() {
        let job = job(DependencyGraph::new());
        assert_eq!(job.migrator_uid(&NodeAttrs::new("foo")), uid());

        let unnamed = GraphMigrator::new(
            MigratorSettings::new(0),
            None,
            GraphScope::new(Arc::new(DependencyGraph::new())),
        );
        assert_eq!(
            unnamed.migrator_uid(&NodeAttrs::new("foo")).canonical_json(),
            r#"{"bot_rerun":false,"migrator_name":"GraphMigrator","migrator_version":0,"name":null}"#
        );
    }

    #[test]
    fn test_upstream_merged_proceeds() {
        let job = job(pair("target", vec![record(Some(PrState::Merged), None)]));
        assert_eq!(decide(&job, "target"), Eligibility::Proceed);
    }

    #[test]
    fn test_upstream_closed_proceeds() {
        let job = job(pair("target", vec![record(Some(PrState::Closed), None)]));
        assert_eq!(decide(&job, "target"), Eligibility::Proceed);
    }

    #[test]
    fn test_upstream_without_record_blocks() {
        let job = job(pair("target", Vec::new()));
        assert_eq!(
            decide(&job, "target"),
            Eligibility::Skip(SkipReason::PredecessorsNotBuilt)
        );
    }

    #[test]
    fn test_upstream_open_blocks() {
        let job = job(pair("target", vec![record(Some(PrState::Open), None)]));
        assert_eq!(
            decide(&job, "target"),
            Eligibility::Skip(SkipReason::PredecessorsNotBuilt)
        );
    }

    #[test]
    fn test_record_without_hosting_data_blocks() {
        let job = job(pair("target", vec![PrRecord::from_uid(&uid(), None)]));
        assert_eq!(
            decide(&job, "target"),
            Eligibility::Skip(SkipReason::PredecessorsNotBuilt)
        );
    }

    #[test]
    fn test_record_of_other_job_does_not_count() {
        let other = MigrationUid::new("GraphMigrator", 0).with_name(NameStamp::Named("other".to_string()));
        let merged = PrRecord::from_uid(
            &other,
            Some(HostedPr {
                state: Some(PrState::Merged),
                ..HostedPr::default()
            }),
        );
        let job = job(pair("target", vec![merged]));
        assert_eq!(
            decide(&job, "target"),
            Eligibility::Skip(SkipReason::PredecessorsNotBuilt)
        );
    }

    #[test]
    fn test_archived_upstream_counts_as_migrated() {
        let mut graph = pair("target", Vec::new());
        let mut upstream = graph.payload("upstream").unwrap().clone();
        upstream.archived = true;
        graph.add_node("upstream", upstream);

        assert_eq!(decide(&job(graph), "target"), Eligibility::Proceed);
    }

    #[test]
    fn test_ignored_upstream_is_not_checked() {
        let ignored = BTreeMap::from([(
            "target".to_string(),
            BTreeSet::from(["upstream".to_string()]),
        )]);
        let job = job_with(pair("target", Vec::new()), |scope| scope.with_ignored_deps(ignored));
        assert_eq!(decide(&job, "target"), Eligibility::Proceed);
    }

    #[test]
    fn test_top_level_bypasses_readiness() {
        let job = job_with(pair("target", Vec::new()), |scope| {
            scope.with_top_level(["target".to_string()])
        });
        assert_eq!(decide(&job, "target"), Eligibility::Proceed);
    }

    #[test]
    fn test_cycle_member_bypasses_readiness() {
        let job = job_with(pair("target", Vec::new()), |scope| {
            scope.with_cycles([vec!["target".to_string(), "upstream".to_string()]])
        });
        assert_eq!(decide(&job, "target"), Eligibility::Proceed);
    }

    #[test]
    fn test_not_in_graph() {
        let job = job(pair("target", Vec::new()));
        let stranger = NodeAttrs::new("stranger");
        assert_eq!(
            job.scope().filter_at(&job, &stranger, now()).unwrap(),
            Eligibility::Skip(SkipReason::NotInGraph)
        );
    }

    #[test]
    fn test_upstream_bad_reason_is_tolerated() {
        let mut graph = pair("target", vec![record(Some(PrState::Merged), None)]);
        let mut target = NodeAttrs::new("target");
        target.pr_info.bad = BadStatus::Reason("Upstream: version not found".to_string());
        graph.add_node("target", target);
        assert_eq!(decide(&job(graph), "target"), Eligibility::Proceed);

        let mut graph = pair("target", vec![record(Some(PrState::Merged), None)]);
        let mut target = NodeAttrs::new("target");
        target.pr_info.bad = BadStatus::Reason("make_graph: render error".to_string());
        graph.add_node("target", target);
        assert_eq!(decide(&job(graph), "target"), Eligibility::Skip(SkipReason::Bad));
    }

    #[test]
    fn test_pinning_proceeds_on_exactly_stale_upstream() {
        let opened = now() - Duration::days(14);
        let job = job(pair(
            "conda-forge-pinning",
            vec![record(Some(PrState::Open), Some(opened))],
        ));
        assert_eq!(decide(&job, "conda-forge-pinning"), Eligibility::Proceed);
    }

    #[test]
    fn test_pinning_waits_on_fresh_upstream() {
        let opened = now() - Duration::days(13) - Duration::hours(23);
        let job = job(pair(
            "conda-forge-pinning",
            vec![record(Some(PrState::Open), Some(opened))],
        ));
        assert_eq!(
            decide(&job, "conda-forge-pinning"),
            Eligibility::Skip(SkipReason::PredecessorsNotBuilt)
        );
    }

    #[test]
    fn test_pinning_without_timestamp_is_not_stale() {
        let graph = pair("conda-forge-pinning", vec![record(Some(PrState::Open), None)]);
        let job = job(graph);
        let attrs = job.scope().graph().payload("conda-forge-pinning").unwrap().clone();
        assert!(!job
            .scope()
            .all_predecessors_issued_and_stale_at(&job, &attrs, now())
            .unwrap());
    }

    #[test]
    fn test_stale_check_only_for_pinning_feedstock() {
        let opened = now() - Duration::days(30);
        let job = job(pair("target", vec![record(Some(PrState::Open), Some(opened))]));
        assert_eq!(
            decide(&job, "target"),
            Eligibility::Skip(SkipReason::PredecessorsNotBuilt)
        );
    }

    #[test]
    fn test_missing_upstream_payload_is_an_error() {
        let mut graph = DependencyGraph::new();
        graph.add_node_without_payload("ghost");
        graph.add_node("target", NodeAttrs::new("target"));
        graph.add_edge("ghost", "target");
        let job = job(graph);

        let attrs = NodeAttrs::new("target");
        assert!(matches!(
            job.scope().filter_at(&job, &attrs, now()),
            Err(Error::GraphInconsistency { node }) if node == "ghost"
        ));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let job = job(pair("target", vec![record(Some(PrState::Open), None)]));
        assert_eq!(decide(&job, "target"), decide(&job, "target"));
    }

    #[test]
    fn test_order_is_upstream_first() {
        let mut graph = DependencyGraph::new();
        for name in ["a", "b", "c"] {
            graph.add_node(name, NodeAttrs::new(name));
        }
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        let job = job(graph.clone());

        assert_eq!(job.order(&graph, &graph), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_downstream_children() {
        let mut graph = DependencyGraph::new();
        graph.add_node("root", NodeAttrs::new("root"));
        for name in ["d", "c", "b", "a"] {
            let mut attrs = NodeAttrs::new(name);
            attrs.archived = name == "b";
            graph.add_node(name, attrs);
            graph.add_edge("root", name);
        }
        let job = job(graph);

        // archived children are still listed
        assert_eq!(
            job.downstream_children("root", DEFAULT_CHILDREN_LIMIT),
            vec!["a", "b", "c", "d"]
        );
        assert_eq!(job.downstream_children("root", 1), vec!["a"]);
        assert!(job.downstream_children("a", DEFAULT_CHILDREN_LIMIT).is_empty());
    }
}
