// src/migrator/replacement.rs

//! Dependency rename job
//!
//! Swaps one package for another in every recipe that declares it. A pure
//! substitution has no ordering concern, so eligible feedstocks are visited
//! in whatever order the graph yields them.

use super::{
    base_filter, render_pr_body, Eligibility, FeedstockContext, MigrationOutcome, Migrator,
    MigratorSettings, NameStamp, SkipReason,
};
use crate::attrs::{BadPolicy, NodeAttrs};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::recipe::{self, DependencyMatcher};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Replace dependency `old_pkg` with `new_pkg`
#[derive(Debug)]
pub struct Replacement {
    settings: MigratorSettings,
    old_pkg: String,
    new_pkg: String,
    rationale: String,
    name: String,
    matcher: DependencyMatcher,
    packages: BTreeSet<String>,
}

impl Replacement {
    pub fn new(old_pkg: &str, new_pkg: &str, rationale: &str, settings: MigratorSettings) -> Result<Self> {
        if old_pkg.is_empty() || new_pkg.is_empty() {
            return Err(Error::ConfigError(
                "replacement needs both an old and a new package name".to_string(),
            ));
        }
        if old_pkg == new_pkg {
            return Err(Error::ConfigError(format!(
                "replacement of {} by itself",
                old_pkg
            )));
        }

        Ok(Self {
            settings,
            old_pkg: old_pkg.to_string(),
            new_pkg: new_pkg.to_string(),
            rationale: rationale.to_string(),
            name: format!("{}-to-{}", old_pkg, new_pkg),
            matcher: DependencyMatcher::new(old_pkg)?,
            packages: BTreeSet::from([old_pkg.to_string()]),
        })
    }

    pub fn old_pkg(&self) -> &str {
        &self.old_pkg
    }

    pub fn new_pkg(&self) -> &str {
        &self.new_pkg
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }
}

impl Migrator for Replacement {
    fn migrator_name(&self) -> &str {
        "Replacement"
    }

    fn settings(&self) -> &MigratorSettings {
        &self.settings
    }

    fn name_stamp(&self) -> NameStamp {
        NameStamp::Named(self.name.clone())
    }

    fn description(&self) -> &str {
        "Replace one dependency with another"
    }

    fn filter(&self, attrs: &NodeAttrs) -> Result<Eligibility> {
        let base = base_filter(self, attrs, BadPolicy::AnyReason);
        if base.is_skip() {
            return Ok(base);
        }
        if !attrs.requirements.intersects(&self.packages) {
            debug!("{}: does not use {}", attrs.name, self.old_pkg);
            return Ok(Eligibility::Skip(SkipReason::RequirementNotUsed));
        }
        Ok(Eligibility::Proceed)
    }

    fn order(&self, eligible: &DependencyGraph, _total: &DependencyGraph) -> Vec<String> {
        eligible.nodes().map(str::to_string).collect()
    }

    fn migrate(&self, recipe_dir: &Path, attrs: &NodeAttrs) -> Result<MigrationOutcome> {
        let path = recipe::recipe_path(recipe_dir);
        let raw = recipe::read_recipe(&path)?;

        let Some(updated) = self.matcher.rename(&raw, &self.new_pkg) else {
            debug!("{}: no `{}` dependency lines in recipe", attrs.name, self.old_pkg);
            return Ok(MigrationOutcome::NoOp);
        };

        recipe::write_recipe(&path, &updated)?;
        self.set_build_number(&path)?;
        info!("{}: replaced {} with {}", attrs.name, self.old_pkg, self.new_pkg);

        Ok(MigrationOutcome::Migrated(self.migrator_uid(attrs)))
    }

    fn pr_title(&self, _ctx: &FeedstockContext<'_>) -> String {
        format!("Suggestion: depend on {} instead of {}", self.new_pkg, self.old_pkg)
    }

    fn pr_body(&self, ctx: &FeedstockContext<'_>) -> String {
        let text = format!(
            "I noticed that this recipe depends on `{old}` instead of \n\
             `{new}`. {rationale} \n\
             This PR makes this change.\n\
             Notes and instructions for merging this PR:\n\
             1. Make sure that the recipe can indeed only depend on `{new}`. \n\
             2. Please merge the PR only after the tests have passed. \n\
             3. Feel free to push to the bot's branch to update this PR if needed. \n",
            old = self.old_pkg,
            new = self.new_pkg,
            rationale = self.rationale,
        );
        render_pr_body(&text, ctx, true)
    }

    fn commit_message(&self, _ctx: &FeedstockContext<'_>) -> String {
        format!("use {} instead of {}", self.new_pkg, self.old_pkg)
    }

    fn remote_branch(&self, _ctx: &FeedstockContext<'_>) -> String {
        format!(
            "{}-to-{}-migration-{}",
            self.old_pkg, self.new_pkg, self.settings.migrator_version
        )
    }
}
