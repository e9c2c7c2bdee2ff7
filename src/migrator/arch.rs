// src/migrator/arch.rs

//! Architecture rebuild jobs
//!
//! These jobs enable additional build platforms on feedstocks. The shared
//! dependency graph describes the default platform, so each job first
//! re-derives its own graph from the per-platform requirement sections:
//!
//! 1. empty copy of the shared graph, edges rebuilt from the platform's
//!    requirements resolved through `outputs_lut`
//! 2. excluded dependencies and everything downstream of them dropped
//! 3. cut to the target packages and their upstreams, if targets are given
//! 4. stub, ignored and all-noarch feedstocks plucked out
//!
//! The derived graph is owned by the job; the shared graph is never touched.
//! Migrating a feedstock rewrites `conda-forge.yml` next to the recipe
//! directory and leaves the build counter as it is.

use super::{
    render_pr_body, Eligibility, FeedstockContext, GraphScope, MigrationOutcome, Migrator,
    MigratorSettings, NameStamp, PiggybackChain,
};
use crate::attrs::{NodeAttrs, Requirements};
use crate::error::{Error, Result};
use crate::graph::{deps_from_outputs_lut, prune, DependencyGraph};
use crate::recipe;
use crate::scheduler;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Feedstock configuration file, one level above the recipe directory
pub const FEEDSTOCK_CONFIG_FILE: &str = "conda-forge.yml";

/// Which platforms an [`ArchRebuild`] enables
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum_macros::Display, strum_macros::EnumString,
)]
pub enum ArchProfile {
    /// Linux aarch64 and ppc64le
    #[serde(rename = "aarch64-ppc64le")]
    #[strum(serialize = "aarch64-ppc64le")]
    Aarch64Ppc64le,
    /// macOS on Apple silicon, cross-compiled from osx-64
    #[serde(rename = "osx-arm64")]
    #[strum(serialize = "osx-arm64")]
    OsxArm64,
}

impl ArchProfile {
    /// Job type name recorded in identities
    pub fn migrator_name(self) -> &'static str {
        match self {
            ArchProfile::Aarch64Ppc64le => "ArchRebuild",
            ArchProfile::OsxArm64 => "OSXArm",
        }
    }

    /// Platforms whose requirement sections drive the derived graph
    pub fn platforms(self) -> &'static [&'static str] {
        match self {
            ArchProfile::Aarch64Ppc64le => &["linux_aarch64", "linux_ppc64le"],
            ArchProfile::OsxArm64 => &["osx_arm64"],
        }
    }

    /// Packages never migrated by this profile
    pub fn ignored_packages(self) -> BTreeSet<String> {
        let names: &[&str] = match self {
            ArchProfile::Aarch64Ppc64le => &["make", "perl", "toolchain", "posix", "patchelf"],
            ArchProfile::OsxArm64 => &[],
        };
        names.iter().map(|s| s.to_string()).collect()
    }

    fn title(self) -> &'static str {
        match self {
            ArchProfile::Aarch64Ppc64le => "Arch Migrator",
            ArchProfile::OsxArm64 => "ARM OSX Migrator",
        }
    }

    fn branch_suffix(self) -> &'static str {
        match self {
            ArchProfile::Aarch64Ppc64le => "_arch",
            ArchProfile::OsxArm64 => "_arm_osx",
        }
    }

    fn body_text(self) -> &'static str {
        match self {
            ArchProfile::Aarch64Ppc64le => {
                "This feedstock is being rebuilt as part of the aarch64/ppc64le migration.\n\n\
                 **Feel free to merge the PR if CI is all green, but please don't close it\n\
                 without reaching out the the ARM migrators first at @conda-forge/arm-arch.**\n"
            }
            ArchProfile::OsxArm64 => {
                "This feedstock is being rebuilt as part of the ARM OSX migration.\n\n\
                 **Feel free to merge the PR if CI is all green, but please don't close it\n\
                 without reaching out the the ARM OSX team first at @conda-forge/help-osx-arm64.**\n"
            }
        }
    }

    /// Requirement names that become edges for `platform`
    fn edge_requirements(self, attrs: &NodeAttrs, platform: &str) -> BTreeSet<String> {
        match self {
            ArchProfile::Aarch64Ppc64le => {
                let reqs = attrs
                    .platform_requirements(platform)
                    .unwrap_or_else(|| attrs.requirements.clone());
                let deps = reqs.all().into_iter().map(str::to_string).collect();
                deps
            }
            ArchProfile::OsxArm64 => {
                let reqs: Requirements = attrs
                    .platform_requirements(platform)
                    .or_else(|| attrs.platform_requirements("osx_64"))
                    .unwrap_or_else(|| attrs.requirements.clone());
                // compiler stubs stay so excluded dependencies prune through them
                let stubs = reqs.build.iter().filter(|dep| dep.ends_with("_stub"));
                let deps = reqs
                    .host_and_run()
                    .into_iter()
                    .map(str::to_string)
                    .chain(stubs.cloned())
                    .collect();
                deps
            }
        }
    }

    /// Apply this profile's settings to a parsed `conda-forge.yml`
    fn update_feedstock_config(self, config: &mut Mapping) -> Result<()> {
        match self {
            ArchProfile::Aarch64Ppc64le => {
                let provider = child_mapping(config, "provider")?;
                for platform in self.platforms() {
                    if !provider.contains_key(*platform) {
                        provider.insert(Value::from(*platform), Value::from("default"));
                    }
                }
            }
            ArchProfile::OsxArm64 => {
                let build_platform = child_mapping(config, "build_platform")?;
                build_platform.insert(Value::from("osx_arm64"), Value::from("osx_64"));
                config.insert(Value::from("test"), Value::from("native_and_emulated"));
            }
        }
        Ok(())
    }
}

/// The mapping under `key`, created when missing
fn child_mapping<'a>(config: &'a mut Mapping, key: &str) -> Result<&'a mut Mapping> {
    if !config.contains_key(key) {
        config.insert(Value::from(key), Value::Mapping(Mapping::new()));
    }
    match config.get_mut(key) {
        Some(Value::Mapping(map)) => Ok(map),
        Some(Value::Null) | None => Err(Error::ParseError(format!(
            "{}: `{}` is null",
            FEEDSTOCK_CONFIG_FILE, key
        ))),
        Some(_) => Err(Error::ParseError(format!(
            "{}: `{}` is not a mapping",
            FEEDSTOCK_CONFIG_FILE, key
        ))),
    }
}

/// Construction options for an [`ArchRebuild`]
#[derive(Debug, Default)]
pub struct ArchOptions {
    pub name: Option<String>,
    /// Restrict the job to these packages and their upstreams
    pub target_packages: BTreeSet<String>,
    /// Packages to drop together with all their downstreams
    pub excluded_dependencies: BTreeSet<String>,
    pub pr_limit: usize,
    pub piggybacks: PiggybackChain,
}

/// Graph-aware job adding build platforms to feedstocks
#[derive(Debug)]
pub struct ArchRebuild {
    profile: ArchProfile,
    settings: MigratorSettings,
    name: Option<String>,
    scope: GraphScope,
    target_packages: BTreeSet<String>,
}

impl ArchRebuild {
    pub fn new(profile: ArchProfile, total: &DependencyGraph, options: ArchOptions) -> Self {
        let mut graph = derive_platform_graph(profile, total);

        prune::filter_excluded_deps(&mut graph, &options.excluded_dependencies);

        let mut target_packages = options.target_packages;
        if !target_packages.is_empty() {
            target_packages.insert("python".to_string());
            prune::cut_to_target_packages(&mut graph, &target_packages);
        }

        prune::filter_stubby_and_ignored_nodes(&mut graph, &profile.ignored_packages());

        info!(
            "{}: derived graph with {} nodes and {} edges",
            profile,
            graph.node_count(),
            graph.edge_count()
        );

        let settings = MigratorSettings::new(1)
            .with_bump_number(0)
            .with_pr_limit(options.pr_limit)
            .with_piggybacks(options.piggybacks);

        Self {
            profile,
            settings: MigratorSettings {
                check_solvable: false,
                ..settings
            },
            name: options.name,
            scope: GraphScope::new(Arc::new(graph)),
            target_packages,
        }
    }

    pub fn profile(&self) -> ArchProfile {
        self.profile
    }

    pub fn target_packages(&self) -> &BTreeSet<String> {
        &self.target_packages
    }

    pub fn scope(&self) -> &GraphScope {
        &self.scope
    }
}

/// Rebuild the edges of `total` from per-platform requirements
fn derive_platform_graph(profile: ArchProfile, total: &DependencyGraph) -> DependencyGraph {
    let mut derived = total.empty_copy();
    let lut = total.outputs_lut();

    for (node, payload) in total.payloads() {
        let Some(attrs) = payload else {
            continue;
        };
        for platform in profile.platforms() {
            let reqs = profile.edge_requirements(attrs, platform);
            for dep in deps_from_outputs_lut(reqs.iter().map(String::as_str), lut) {
                derived.add_edge(&dep, node);
            }
        }
    }

    derived
}

fn feedstock_config_path(recipe_dir: &Path) -> PathBuf {
    recipe_dir.join("..").join(FEEDSTOCK_CONFIG_FILE)
}

impl Migrator for ArchRebuild {
    fn migrator_name(&self) -> &str {
        self.profile.migrator_name()
    }

    fn settings(&self) -> &MigratorSettings {
        &self.settings
    }

    fn name_stamp(&self) -> NameStamp {
        NameStamp::from_option(self.name.as_deref())
    }

    fn description(&self) -> &str {
        "Enable additional build platforms"
    }

    fn working_graph(&self) -> Option<&DependencyGraph> {
        Some(self.scope.graph())
    }

    fn filter(&self, attrs: &NodeAttrs) -> Result<Eligibility> {
        self.scope.filter(self, attrs)
    }

    fn order(&self, eligible: &DependencyGraph, _total: &DependencyGraph) -> Vec<String> {
        scheduler::schedule(eligible, &eligible.top_level(), self.scope.cycles())
    }

    fn migrate(&self, recipe_dir: &Path, attrs: &NodeAttrs) -> Result<MigrationOutcome> {
        self.set_build_number(&recipe::recipe_path(recipe_dir))?;

        let path = feedstock_config_path(recipe_dir);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;

        let mut config = match serde_yaml::from_str::<Value>(&raw)? {
            Value::Mapping(map) => map,
            Value::Null => Mapping::new(),
            _ => {
                return Err(Error::ParseError(format!(
                    "{} is not a mapping",
                    path.display()
                )))
            }
        };
        self.profile.update_feedstock_config(&mut config)?;

        std::fs::write(&path, serde_yaml::to_string(&config)?)
            .map_err(|e| Error::IoError(format!("Failed to write {}: {}", path.display(), e)))?;
        debug!("{}: updated {}", attrs.name, path.display());

        Ok(MigrationOutcome::Migrated(self.migrator_uid(attrs)))
    }

    fn pr_title(&self, _ctx: &FeedstockContext<'_>) -> String {
        self.profile.title().to_string()
    }

    fn pr_body(&self, ctx: &FeedstockContext<'_>) -> String {
        render_pr_body(self.profile.body_text(), ctx, true)
    }

    fn remote_branch(&self, _ctx: &FeedstockContext<'_>) -> String {
        format!("bot-pr{}", self.profile.branch_suffix())
    }
}
