// src/config.rs

//! Migration job definitions
//!
//! Jobs for a scheduling pass are declared in a TOML file:
//!
//! ```toml
//! [scheduler]
//! staleness_days = 14
//! pinning_feedstock = "conda-forge-pinning"
//! bump_number = 1
//!
//! [[graph]]
//! name = "libfoo2"
//! obj_version = 2
//! top_level = ["libfoo"]
//! cycles = [["a", "b"]]
//!
//! [graph.ignored_deps]
//! bar = ["baz"]
//!
//! [[replacement]]
//! old = "numpy"
//! new = "numpy-base"
//! rationale = "Only the base package is needed at runtime."
//!
//! [[arch]]
//! profile = "osx-arm64"
//! target_packages = ["numpy"]
//! ```
//!
//! Every section is optional; an empty file declares no jobs.

use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::migrator::{
    ArchOptions, ArchProfile, ArchRebuild, GraphMigrator, GraphScope, Migrator, MigratorSettings,
    Replacement, PINNING_FEEDSTOCK, STALENESS_WINDOW_DAYS,
};
use chrono::Duration;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// A parsed migrations file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Graph-aware jobs
    #[serde(default)]
    pub graph: Vec<GraphJobConfig>,

    /// Dependency rename jobs
    #[serde(default)]
    pub replacement: Vec<ReplacementConfig>,

    /// Architecture rebuild jobs
    #[serde(default)]
    pub arch: Vec<ArchJobConfig>,
}

/// Settings shared by every job of a pass
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Days an open upstream PR must age before it counts as stale
    #[serde(default = "default_staleness_days")]
    pub staleness_days: i64,

    /// Feedstock allowed to proceed on stale upstream PRs
    #[serde(default = "default_pinning_feedstock")]
    pub pinning_feedstock: String,

    /// Build-counter increment for structural mutations
    #[serde(default = "default_bump_number")]
    pub bump_number: u64,
}

fn default_staleness_days() -> i64 {
    STALENESS_WINDOW_DAYS
}

fn default_pinning_feedstock() -> String {
    PINNING_FEEDSTOCK.to_string()
}

fn default_bump_number() -> u64 {
    1
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            staleness_days: default_staleness_days(),
            pinning_feedstock: default_pinning_feedstock(),
            bump_number: default_bump_number(),
        }
    }
}

/// A graph-aware job
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphJobConfig {
    /// Instance name stamped into identities
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub migrator_version: u32,

    #[serde(default)]
    pub obj_version: Option<u32>,

    /// Feedstocks exempt from upstream readiness
    #[serde(default)]
    pub top_level: Vec<String>,

    /// Cycle groups, as produced by the graph builder
    #[serde(default)]
    pub cycles: Vec<Vec<String>>,

    /// Feedstock -> upstreams not to wait for
    #[serde(default)]
    pub ignored_deps: BTreeMap<String, BTreeSet<String>>,

    #[serde(default)]
    pub pr_limit: usize,
}

/// A dependency rename job
#[derive(Debug, Clone, Deserialize)]
pub struct ReplacementConfig {
    pub old: String,
    pub new: String,

    /// Full sentence explaining the change, quoted in the PR body
    #[serde(default)]
    pub rationale: String,

    #[serde(default)]
    pub pr_limit: usize,
}

/// An architecture rebuild job
#[derive(Debug, Clone, Deserialize)]
pub struct ArchJobConfig {
    pub profile: ArchProfile,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub target_packages: BTreeSet<String>,

    #[serde(default)]
    pub excluded_dependencies: BTreeSet<String>,

    #[serde(default)]
    pub pr_limit: usize,
}

impl MigrationConfig {
    /// Parse and validate a migrations file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        content.parse()
    }

    /// Check the job definitions for consistency
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.staleness_days <= 0 {
            return Err(Error::ConfigError(format!(
                "staleness_days must be positive, got {}",
                self.scheduler.staleness_days
            )));
        }
        if self.scheduler.pinning_feedstock.trim().is_empty() {
            return Err(Error::ConfigError("pinning_feedstock is empty".to_string()));
        }

        for job in &self.graph {
            if job.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                return Err(Error::ConfigError("graph job with an empty name".to_string()));
            }
        }

        for job in &self.replacement {
            if job.old.trim().is_empty() || job.new.trim().is_empty() {
                return Err(Error::ConfigError(
                    "replacement needs both `old` and `new`".to_string(),
                ));
            }
            if job.old == job.new {
                return Err(Error::ConfigError(format!(
                    "replacement of '{}' by itself",
                    job.old
                )));
            }
        }

        Ok(())
    }

    /// Number of jobs declared
    pub fn job_count(&self) -> usize {
        self.graph.len() + self.replacement.len() + self.arch.len()
    }

    /// Instantiate every declared job against the shared graph
    ///
    /// Jobs come back in file order per section: graph, replacement, arch.
    pub fn build_jobs(&self, graph: &Arc<DependencyGraph>) -> Result<Vec<Box<dyn Migrator>>> {
        let scheduler = &self.scheduler;
        let mut jobs: Vec<Box<dyn Migrator>> = Vec::with_capacity(self.job_count());

        for job in &self.graph {
            let scope = GraphScope::new(Arc::clone(graph))
                .with_top_level(job.top_level.iter().cloned())
                .with_cycles(job.cycles.iter().cloned())
                .with_ignored_deps(job.ignored_deps.clone())
                .with_staleness_window(Duration::days(scheduler.staleness_days))
                .with_pinning_feedstock(&scheduler.pinning_feedstock);
            let settings = MigratorSettings::new(job.migrator_version)
                .with_obj_version(job.obj_version)
                .with_pr_limit(job.pr_limit)
                .with_bump_number(scheduler.bump_number);
            jobs.push(Box::new(GraphMigrator::new(settings, job.name.as_deref(), scope)));
        }

        for job in &self.replacement {
            let settings = MigratorSettings::new(0)
                .with_pr_limit(job.pr_limit)
                .with_bump_number(scheduler.bump_number);
            jobs.push(Box::new(Replacement::new(
                &job.old,
                &job.new,
                &job.rationale,
                settings,
            )?));
        }

        for job in &self.arch {
            let options = ArchOptions {
                name: job.name.clone(),
                target_packages: job.target_packages.clone(),
                excluded_dependencies: job.excluded_dependencies.clone(),
                pr_limit: job.pr_limit,
                ..ArchOptions::default()
            };
            jobs.push(Box::new(ArchRebuild::new(job.profile, graph, options)));
        }

        debug!("built {} migration jobs", jobs.len());
        Ok(jobs)
    }
}

impl FromStr for MigrationConfig {
    type Err = Error;

    /// Parse and validate a migrations file's contents
    fn from_str(content: &str) -> Result<Self> {
        let config: MigrationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
