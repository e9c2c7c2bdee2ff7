// src/migrator/piggyback.rs

//! Piggyback steps
//!
//! Small side-migrations bundled with a main job. Each step is filtered on
//! its own per feedstock and runs either before or after the main job's
//! `migrate`, in registration order.

use crate::attrs::NodeAttrs;
use crate::error::Result;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// A narrow migration with no identity or ordering of its own
pub trait MiniMigrator {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run after the main job instead of before it
    fn post_migration(&self) -> bool {
        false
    }

    /// Whether to skip this feedstock
    fn filter(&self, attrs: &NodeAttrs) -> bool;

    fn migrate(&self, recipe_dir: &Path, attrs: &NodeAttrs) -> Result<()>;
}

/// Ordered list of piggyback steps
#[derive(Default)]
pub struct PiggybackChain {
    steps: Vec<Box<dyn MiniMigrator>>,
}

impl fmt::Debug for PiggybackChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|s| s.name()))
            .finish()
    }
}

impl PiggybackChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step; steps run in the order they are added
    pub fn push(&mut self, step: Box<dyn MiniMigrator>) {
        self.steps.push(step);
    }

    pub fn with(mut self, step: Box<dyn MiniMigrator>) -> Self {
        self.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the steps registered to go before the main job
    pub fn run_pre(&self, recipe_dir: &Path, attrs: &NodeAttrs) -> Result<()> {
        self.run(false, recipe_dir, attrs)
    }

    /// Run the steps registered to go after the main job
    pub fn run_post(&self, recipe_dir: &Path, attrs: &NodeAttrs) -> Result<()> {
        self.run(true, recipe_dir, attrs)
    }

    fn run(&self, post: bool, recipe_dir: &Path, attrs: &NodeAttrs) -> Result<()> {
        for step in self.steps.iter().filter(|s| s.post_migration() == post) {
            if step.filter(attrs) {
                debug!("{}: piggyback {} filtered out", attrs.name, step.name());
                continue;
            }
            debug!("{}: running piggyback {}", attrs.name, step.name());
            step.migrate(recipe_dir, attrs)?;
        }
        Ok(())
    }
}
