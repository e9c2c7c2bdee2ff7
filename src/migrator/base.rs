// src/migrator/base.rs

//! Bookkeeping-only job

use super::{Migrator, MigratorSettings};

/// Job that records a migration without touching any file
///
/// Useful for marking feedstocks as handled; every capability is the
/// [`Migrator`] default.
#[derive(Debug)]
pub struct MetadataMigrator {
    settings: MigratorSettings,
}

impl MetadataMigrator {
    pub fn new(settings: MigratorSettings) -> Self {
        Self { settings }
    }
}

impl Migrator for MetadataMigrator {
    fn migrator_name(&self) -> &str {
        "Migrator"
    }

    fn settings(&self) -> &MigratorSettings {
        &self.settings
    }

    fn description(&self) -> &str {
        "Base class for Migrators"
    }
}
