// src/migrator/mod.rs

//! Migration jobs
//!
//! A job (migrator) decides, per feedstock, whether a migration should be
//! attempted, in which order feedstocks are visited, how the attempt is
//! identified, how the recipe is mutated, and what the resulting PR says.
//!
//! # Job types
//!
//! - [`MetadataMigrator`]: bookkeeping-only job, no file mutation
//! - [`GraphMigrator`]: gated on upstream feedstocks having been migrated
//! - [`Replacement`]: swap one dependency for another
//! - [`ArchRebuild`]: enable additional build platforms
//!
//! Every job shares the [`Migrator`] capability set; the graph-aware
//! behavior lives in [`GraphScope`], which jobs compose rather than inherit.
//!
//! # Idempotence
//!
//! Nothing here locks. Re-running a job is safe because a feedstock that
//! already carries a PR record with the job's identity is skipped, and a
//! feedstock whose upstreams have not progressed stays blocked.

mod arch;
mod base;
mod graph;
mod piggyback;
mod readiness;
mod replacement;
mod uid;

pub use arch::{ArchOptions, ArchProfile, ArchRebuild, FEEDSTOCK_CONFIG_FILE};
pub use base::MetadataMigrator;
pub use graph::{GraphMigrator, DEFAULT_CHILDREN_LIMIT};
pub use piggyback::{MiniMigrator, PiggybackChain};
pub use readiness::{GraphScope, PINNING_FEEDSTOCK, STALENESS_WINDOW_DAYS, UPSTREAM_BAD_PREFIX};
pub use replacement::Replacement;
pub use uid::{JsonFriendly, MigrationUid, NameStamp};

use crate::attrs::{BadPolicy, NodeAttrs, DEFAULT_BRANCH};
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::recipe::{self, BuildNumber};
use crate::scheduler;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// Result of a `migrate` call that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The recipe was changed; the identity goes on the PR record
    Migrated(MigrationUid),
    /// Nothing applied; the working copy should be discarded
    NoOp,
}

/// Why a feedstock was filtered out
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    Archived,
    AlreadyMigrated,
    Bad,
    ParsingError,
    NotInGraph,
    PredecessorsNotBuilt,
    RequirementNotUsed,
}

/// Outcome of a job's filter for one feedstock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Proceed,
    Skip(SkipReason),
}

impl Eligibility {
    pub fn is_skip(&self) -> bool {
        matches!(self, Eligibility::Skip(_))
    }
}

/// Knobs shared by every job type
#[derive(Debug, Default)]
pub struct MigratorSettings {
    /// Bump to invalidate every identity issued by this job type
    pub migrator_version: u32,
    /// Bump to invalidate identities of one configured job instance
    pub obj_version: Option<u32>,
    /// Maximum PRs per run; zero means unlimited
    pub pr_limit: usize,
    /// Whether the PR side should check the recipe is solvable
    pub check_solvable: bool,
    /// Build-counter increment applied by structural mutations
    pub bump_number: u64,
    pub piggybacks: PiggybackChain,
}

impl MigratorSettings {
    pub fn new(migrator_version: u32) -> Self {
        Self {
            migrator_version,
            check_solvable: true,
            bump_number: 1,
            ..Self::default()
        }
    }

    pub fn with_obj_version(mut self, obj_version: Option<u32>) -> Self {
        self.obj_version = obj_version;
        self
    }

    pub fn with_pr_limit(mut self, pr_limit: usize) -> Self {
        self.pr_limit = pr_limit;
        self
    }

    pub fn with_bump_number(mut self, bump_number: u64) -> Self {
        self.bump_number = bump_number;
        self
    }

    pub fn with_piggybacks(mut self, piggybacks: PiggybackChain) -> Self {
        self.piggybacks = piggybacks;
        self
    }
}

/// Feedstock-level inputs to PR text
#[derive(Debug, Clone, Copy)]
pub struct FeedstockContext<'a> {
    pub attrs: &'a NodeAttrs,
    /// Link to the run that produced the PR, if known
    pub run_url: Option<&'a str>,
}

impl<'a> FeedstockContext<'a> {
    pub fn new(attrs: &'a NodeAttrs) -> Self {
        Self {
            attrs,
            run_url: None,
        }
    }

    pub fn feedstock_name(&self) -> &str {
        &self.attrs.feedstock_name
    }
}

/// Everything the PR-posting side needs besides the diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrMetadata {
    pub title: String,
    pub body: String,
    pub commit_message: String,
    pub branch: String,
}

/// Label attached to PRs opened by a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigratorLabel {
    pub name: String,
    pub description: String,
    pub color: String,
}

const PR_LABEL_TEXT: &str = "If this PR was opened in error or needs to be updated please add \
the `bot-rerun` label to this PR. The bot will close this PR and schedule another one. \
If you do not have permissions to add this label, ask a maintainer to add it for you.";

const PR_FOOTER: &str = "This PR was created by the feedstock migration bot, which tracks the \
dependency graph, migrates packages, and proposes updates across feedstocks.";

/// Fill the PR body template: free text, optional label note, fixed footer
pub fn render_pr_body(text: &str, ctx: &FeedstockContext<'_>, add_label_text: bool) -> String {
    let mut body = format!("{}\n\n", text);
    if add_label_text {
        body.push_str(PR_LABEL_TEXT);
        body.push_str("\n\n");
    }
    body.push_str("<sub>");
    body.push_str(PR_FOOTER);
    if let Some(url) = ctx.run_url {
        body.push_str(&format!(" This PR was generated by {} - please use this URL for debugging.", url));
    }
    body.push_str("</sub>");
    body
}

/// The shared job capability set
///
/// Defaults implement the plain job: no file mutation, plain topological
/// order, identity from the job type name and versions.
pub trait Migrator {
    /// Job type name recorded in identities
    fn migrator_name(&self) -> &str;

    fn settings(&self) -> &MigratorSettings;

    /// The `name` stamp distinguishing instances of the same job type
    fn name_stamp(&self) -> NameStamp {
        NameStamp::Absent
    }

    /// One-line description used for the PR label
    fn description(&self) -> &str {
        ""
    }

    /// The graph whose nodes this job considers, if it keeps its own
    fn working_graph(&self) -> Option<&DependencyGraph> {
        None
    }

    /// Identity of this migration for a feedstock
    fn migrator_uid(&self, attrs: &NodeAttrs) -> MigrationUid {
        let settings = self.settings();
        MigrationUid::new(self.migrator_name(), settings.migrator_version)
            .with_object_version(settings.obj_version)
            .with_branch(&attrs.branch)
            .with_name(self.name_stamp())
    }

    /// Decide whether to act on a feedstock
    fn filter(&self, attrs: &NodeAttrs) -> Result<Eligibility> {
        Ok(base_filter(self, attrs, BadPolicy::AnyReason))
    }

    /// Visiting order for the eligible feedstocks
    fn order(&self, eligible: &DependencyGraph, _total: &DependencyGraph) -> Vec<String> {
        scheduler::schedule(eligible, &eligible.top_level(), &BTreeSet::new())
    }

    /// Mutate the recipe checkout
    fn migrate(&self, _recipe_dir: &Path, attrs: &NodeAttrs) -> Result<MigrationOutcome> {
        Ok(MigrationOutcome::Migrated(self.migrator_uid(attrs)))
    }

    fn pr_title(&self, _ctx: &FeedstockContext<'_>) -> String {
        "PR from the feedstock migration bot".to_string()
    }

    fn pr_body(&self, ctx: &FeedstockContext<'_>) -> String {
        render_pr_body("", ctx, true)
    }

    fn commit_message(&self, _ctx: &FeedstockContext<'_>) -> String {
        format!("migration: {}", self.migrator_name())
    }

    fn remote_branch(&self, _ctx: &FeedstockContext<'_>) -> String {
        "bot-pr".to_string()
    }

    fn pr_metadata(&self, ctx: &FeedstockContext<'_>) -> PrMetadata {
        PrMetadata {
            title: self.pr_title(ctx),
            body: self.pr_body(ctx),
            commit_message: self.commit_message(ctx),
            branch: self.remote_branch(ctx),
        }
    }

    fn new_build_number(&self) -> BuildNumber {
        BuildNumber::Bump(self.settings().bump_number)
    }

    /// Bump the build counter of a recipe file
    fn set_build_number(&self, recipe_file: &Path) -> Result<()> {
        recipe::set_build_number(recipe_file, self.new_build_number())
    }

    /// Branches this migration may be applied to, default branch first
    fn possible_feedstock_branches(&self, attrs: &NodeAttrs) -> Vec<String> {
        let mut branches = vec![DEFAULT_BRANCH.to_string()];
        match attrs.abi_migration_branches() {
            Ok(extra) => branches.extend(extra),
            Err(e) => warn!(
                "{}: invalid abi_migration_branches, using {} only: {}",
                attrs.name, DEFAULT_BRANCH, e
            ),
        }
        branches
    }

    fn migrator_label(&self) -> MigratorLabel {
        MigratorLabel {
            name: format!("bot-{}", self.migrator_name().to_lowercase()),
            description: self.description().trim().to_string(),
            color: "#6c64ff".to_string(),
        }
    }

    fn run_pre_piggyback_migrations(&self, recipe_dir: &Path, attrs: &NodeAttrs) -> Result<()> {
        self.settings().piggybacks.run_pre(recipe_dir, attrs)
    }

    fn run_post_piggyback_migrations(&self, recipe_dir: &Path, attrs: &NodeAttrs) -> Result<()> {
        self.settings().piggybacks.run_post(recipe_dir, attrs)
    }
}

/// Checks every job applies: archived, already attempted, bad, unparseable
///
/// `bad_policy` selects which bad-reasons this job tolerates.
pub fn base_filter<M: Migrator + ?Sized>(
    job: &M,
    attrs: &NodeAttrs,
    bad_policy: BadPolicy<'_>,
) -> Eligibility {
    let name = &attrs.name;

    if attrs.archived {
        debug!("{}: archived", name);
        return Eligibility::Skip(SkipReason::Archived);
    }

    let uid = job.migrator_uid(attrs);
    if let Some(record) = attrs.pr_info.find(&uid) {
        debug!("{}: already PRed: uid: {}", name, uid.canonical_json());
        if let Some(url) = record.url() {
            debug!("{}: already PRed: url: {}", name, url);
        }
        return Eligibility::Skip(SkipReason::AlreadyMigrated);
    }

    if attrs.pr_info.bad.blocks(bad_policy) {
        debug!("{}: bad attr", name);
        return Eligibility::Skip(SkipReason::Bad);
    }

    if attrs.parsing_error {
        debug!("{}: parsing error", name);
        return Eligibility::Skip(SkipReason::ParsingError);
    }

    Eligibility::Proceed
}

/// Run one job on one checkout: pre steps, the job, then post steps
///
/// Post steps only run when the job actually changed something.
pub fn run_migration<M: Migrator + ?Sized>(
    job: &M,
    recipe_dir: &Path,
    attrs: &NodeAttrs,
) -> Result<MigrationOutcome> {
    job.run_pre_piggyback_migrations(recipe_dir, attrs)?;

    let outcome = job.migrate(recipe_dir, attrs)?;
    match &outcome {
        MigrationOutcome::Migrated(uid) => {
            debug!("{}: migrated as {}", attrs.name, uid.canonical_json());
            job.run_post_piggyback_migrations(recipe_dir, attrs)?;
        }
        MigrationOutcome::NoOp => debug!("{}: nothing to change", attrs.name),
    }

    Ok(outcome)
}
