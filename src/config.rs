//! Configuration for logkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{LogKvError, Result};

/// Main configuration for a logkv store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the segment files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── segment-0
    ///     ├── segment-1
    ///     └── ...
    pub data_dir: PathBuf,

    /// Max size of a segment file (in bytes) before a new one is started
    pub segment_size_limit: u64,

    /// Sync strategy: how often to fsync the active segment
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Segment count (active one included) that triggers background compaction
    pub compaction_trigger: usize,
}

/// Segment sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync after N appends (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./logkv_data"),
            segment_size_limit: 10 * 1024 * 1024, // 10 MB
            sync_strategy: SyncStrategy::EveryWrite,
            compaction_trigger: 3,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the values can drive a store
    pub fn validate(&self) -> Result<()> {
        if self.segment_size_limit == 0 {
            return Err(LogKvError::Config(
                "segment_size_limit must be greater than zero".to_string(),
            ));
        }
        if self.compaction_trigger < 2 {
            return Err(LogKvError::Config(format!(
                "compaction_trigger must be at least 2, got {}",
                self.compaction_trigger
            )));
        }
        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(LogKvError::Config(
                "EveryNEntries sync count must be greater than zero".to_string(),
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
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment size limit (in bytes)
    pub fn segment_size_limit(mut self, size: u64) -> Self {
        self.config.segment_size_limit = size;
        self
    }

    /// Set the segment sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the segment count that triggers compaction
    pub fn compaction_trigger(mut self, count: usize) -> Self {
        self.config.compaction_trigger = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
