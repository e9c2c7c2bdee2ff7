// src/migrator/readiness.rs

//! Upstream readiness for graph-aware jobs
//!
//! A feedstock may only be migrated once its upstream feedstocks have been.
//! There is no live coordinator: readiness is read off the PR records each
//! upstream carries. Two checks exist:
//!
//! - **fully built**: every upstream has a PR record for this job, and none
//!   of those PRs is still open
//! - **issued and stale**: every upstream has a PR record, and any PR still
//!   open has been open for at least the staleness window
//!
//! Gaps in the data (no hosting record, no state, no or bad timestamp)
//! always resolve towards "not ready".

use super::{base_filter, Eligibility, Migrator, SkipReason};
use crate::attrs::{BadPolicy, NodeAttrs};
use crate::error::Result;
use crate::graph::DependencyGraph;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Days an open upstream PR must age before it counts as stale
pub const STALENESS_WINDOW_DAYS: i64 = 14;

/// Feedstock whose migration propagates once upstream PRs are stale
pub const PINNING_FEEDSTOCK: &str = "conda-forge-pinning";

/// Bad-reason prefix graph-aware jobs tolerate
pub const UPSTREAM_BAD_PREFIX: &str = "Upstream:";

/// Graph state a graph-aware job evaluates against
#[derive(Debug, Clone)]
pub struct GraphScope {
    graph: Arc<DependencyGraph>,
    top_level: BTreeSet<String>,
    /// Every node of every declared cycle
    cycles: BTreeSet<String>,
    ignored_deps_per_node: BTreeMap<String, BTreeSet<String>>,
    staleness_window: Duration,
    pinning_feedstock: String,
}

impl GraphScope {
    pub fn new(graph: Arc<DependencyGraph>) -> Self {
        Self {
            graph,
            top_level: BTreeSet::new(),
            cycles: BTreeSet::new(),
            ignored_deps_per_node: BTreeMap::new(),
            staleness_window: Duration::days(STALENESS_WINDOW_DAYS),
            pinning_feedstock: PINNING_FEEDSTOCK.to_string(),
        }
    }

    pub fn with_top_level(mut self, top_level: impl IntoIterator<Item = String>) -> Self {
        self.top_level = top_level.into_iter().collect();
        self
    }

    /// Declare cycle groups; membership is all that matters, so they are flattened
    pub fn with_cycles<C>(mut self, cycles: impl IntoIterator<Item = C>) -> Self
    where
        C: IntoIterator<Item = String>,
    {
        self.cycles = cycles.into_iter().flatten().collect();
        self
    }

    pub fn with_ignored_deps(mut self, ignored: BTreeMap<String, BTreeSet<String>>) -> Self {
        self.ignored_deps_per_node = ignored;
        self
    }

    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    pub fn with_pinning_feedstock(mut self, name: &str) -> Self {
        self.pinning_feedstock = name.to_string();
        self
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn top_level(&self) -> &BTreeSet<String> {
        &self.top_level
    }

    pub fn cycles(&self) -> &BTreeSet<String> {
        &self.cycles
    }

    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    /// Upstreams that gate `feedstock`: not archived, not ignored
    ///
    /// Fails if an upstream has no payload.
    fn active_predecessors(&self, feedstock: &str) -> Result<Vec<(&str, &NodeAttrs)>> {
        let ignored = self.ignored_deps_per_node.get(feedstock);
        let mut active = Vec::new();

        for pred in self.graph.predecessors(feedstock) {
            let payload = self.graph.payload_checked(pred)?;
            // archived feedstocks always count as migrated
            if payload.archived {
                continue;
            }
            if ignored.is_some_and(|set| set.contains(pred)) {
                continue;
            }
            active.push((pred, payload));
        }

        Ok(active)
    }

    /// Whether any upstream lacks a closed or merged PR for this job
    pub fn predecessors_not_yet_built<M: Migrator + ?Sized>(
        &self,
        job: &M,
        attrs: &NodeAttrs,
    ) -> Result<bool> {
        for (node, payload) in self.active_predecessors(&attrs.feedstock_name)? {
            let uid = job.migrator_uid(payload);
            match payload.pr_info.find(&uid) {
                None => {
                    debug!("not yet built: {}", node);
                    return Ok(true);
                }
                // a record missing its PR data counts as open so the gap halts propagation
                Some(record) if record.is_open() => {
                    debug!("not yet built: {} (PR open)", node);
                    return Ok(true);
                }
                Some(_) => {}
            }
        }
        Ok(false)
    }

    /// Whether every upstream PR has been issued and is closed or stale
    pub fn all_predecessors_issued_and_stale<M: Migrator + ?Sized>(
        &self,
        job: &M,
        attrs: &NodeAttrs,
    ) -> Result<bool> {
        self.all_predecessors_issued_and_stale_at(job, attrs, Utc::now())
    }

    /// [`Self::all_predecessors_issued_and_stale`] against a fixed clock
    pub fn all_predecessors_issued_and_stale_at<M: Migrator + ?Sized>(
        &self,
        job: &M,
        attrs: &NodeAttrs,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        for (node, payload) in self.active_predecessors(&attrs.feedstock_name)? {
            let uid = job.migrator_uid(payload);
            let Some(record) = payload.pr_info.find(&uid) else {
                debug!("node {} PR {:?} not yet issued!", node, uid.name);
                return Ok(false);
            };

            if !record.is_open() {
                continue;
            }

            match record.created_at() {
                Some(created) => {
                    let age = now - created;
                    if age < self.staleness_window {
                        debug!("node {} has PR {:?} open for {}", node, uid.name, age);
                        return Ok(false);
                    }
                }
                None => {
                    debug!("node {} has PR {:?} with no usable timestamp", node, uid.name);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// The graph-aware filter layered over [`base_filter`]
    pub fn filter<M: Migrator + ?Sized>(&self, job: &M, attrs: &NodeAttrs) -> Result<Eligibility> {
        self.filter_at(job, attrs, Utc::now())
    }

    /// [`Self::filter`] against a fixed clock
    pub fn filter_at<M: Migrator + ?Sized>(
        &self,
        job: &M,
        attrs: &NodeAttrs,
        now: DateTime<Utc>,
    ) -> Result<Eligibility> {
        let name = &attrs.name;

        let base = base_filter(job, attrs, BadPolicy::Prefixes(&[UPSTREAM_BAD_PREFIX]));
        if base.is_skip() {
            debug!("filter {}: archived or done", name);
            return Ok(base);
        }

        let feedstock = attrs.feedstock_name.as_str();
        if !self.graph.contains(feedstock) {
            debug!("filter {}: node not in graph", name);
            return Ok(Eligibility::Skip(SkipReason::NotInGraph));
        }

        // top-level and cyclic nodes have no meaningful upstream order
        if self.top_level.contains(feedstock) || self.cycles.contains(feedstock) {
            return Ok(Eligibility::Proceed);
        }

        if (*name == self.pinning_feedstock || feedstock == self.pinning_feedstock)
            && self.all_predecessors_issued_and_stale_at(job, attrs, now)?
        {
            debug!("not filtered {}: pinning parents issued and stale", name);
            return Ok(Eligibility::Proceed);
        }

        if self.predecessors_not_yet_built(job, attrs)? {
            debug!("filter {}: parents not built", name);
            return Ok(Eligibility::Skip(SkipReason::PredecessorsNotBuilt));
        }

        Ok(Eligibility::Proceed)
    }
}
