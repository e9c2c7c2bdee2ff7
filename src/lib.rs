// src/lib.rs

//! Feedstock Tick
//!
//! Decision and ordering engine for rolling a migration out across a graph
//! of interdependent package feedstocks.
//!
//! # Architecture
//!
//! - Graph-first: one read-only dependency graph per pass, shared by all jobs
//! - Identities: every attempted migration is fingerprinted, and a feedstock
//!   already carrying the fingerprint is never migrated twice
//! - Readiness: upstream progress is read off PR records, no live coordinator
//! - Ordering: upstream feedstocks are visited first, cycles are tolerated
//! - Recipes: narrow text rewrites, the build counter bumped on every change

pub mod attrs;
pub mod config;
mod error;
pub mod graph;
pub mod migrator;
pub mod recipe;
pub mod scheduler;

pub use attrs::{BadPolicy, BadStatus, HostedPr, NodeAttrs, PrInfo, PrRecord, PrState, Requirements};
pub use config::MigrationConfig;
pub use error::{Error, Result};
pub use graph::{DependencyGraph, OutputsLut};
pub use migrator::{
    base_filter, run_migration, ArchOptions, ArchProfile, ArchRebuild, Eligibility,
    FeedstockContext, GraphMigrator, GraphScope, MetadataMigrator, MigrationOutcome,
    MigrationUid, Migrator, MigratorSettings, MiniMigrator, PiggybackChain, PrMetadata,
    Replacement, SkipReason,
};
pub use recipe::{BuildNumber, BuildNumberPatcher, DependencyMatcher};
pub use scheduler::{plan_migrations, schedule, MigrationPlan};
