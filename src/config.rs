//! Configuration for forkstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{ForkStoreError, Result};

/// Main configuration for a StateManager instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for spilled payloads
    /// Internal structure:
    ///   {spill_dir}/
    ///     └── {branch}/        (one directory per branch, escaped)
    ///           └── {state}.fks
    pub spill_dir: PathBuf,

    /// Sync strategy for spill files
    pub sync_strategy: SpillSyncStrategy,

    /// Remove every spill file when the manager is closed or dropped
    pub purge_on_close: bool,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Max number of payloads resident in memory before eviction
    pub cache_capacity: usize,

    // -------------------------------------------------------------------------
    // Branch Configuration
    // -------------------------------------------------------------------------
    /// Name of the root branch (never deletable)
    pub root_branch: String,
}

/// Spill file sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpillSyncStrategy {
    /// fsync every spill file before it is renamed into place
    EveryWrite,

    /// Leave flushing to the OS (faster, spill files are scratch data anyway)
    Never,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spill_dir: PathBuf::from("./forkstore_spill"),
            sync_strategy: SpillSyncStrategy::EveryWrite,
            purge_on_close: true,
            cache_capacity: 5,
            root_branch: "main".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject configurations the manager cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(ForkStoreError::Config(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.root_branch.is_empty() {
            return Err(ForkStoreError::Config(
                "root_branch must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the spill directory
    pub fn spill_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.spill_dir = path.into();
        self
    }

    /// Set the spill sync strategy
    pub fn sync_strategy(mut self, strategy: SpillSyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Keep or purge spill files on close
    pub fn purge_on_close(mut self, purge: bool) -> Self {
        self.config.purge_on_close = purge;
        self
    }

    /// Set the number of payloads kept in memory
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Set the root branch name
    pub fn root_branch(mut self, name: impl Into<String>) -> Self {
        self.config.root_branch = name.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
