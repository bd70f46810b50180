//! Configuration for marketdex
//!
//! Centralized configuration with sensible defaults. Record capacities are
//! compile-time constants of their modules; only the substrate and the
//! allocator's chunk sizing policy are configurable.

use std::path::PathBuf;

use crate::error::{IndexError, Result};

/// Main configuration for an engine instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the batch journal. `None` keeps every record in
    /// memory only.
    /// Internal structure:
    ///   {data_dir}/
    ///     └── journal.log      (committed batches)
    pub data_dir: Option<PathBuf>,

    // -------------------------------------------------------------------------
    // Journal Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the journal
    pub journal_sync_strategy: JournalSyncStrategy,

    // -------------------------------------------------------------------------
    // Batch Configuration
    // -------------------------------------------------------------------------
    /// Max distinct records a single batch may write or delete
    pub max_batch_records: usize,

    // -------------------------------------------------------------------------
    // Allocator Configuration
    // -------------------------------------------------------------------------
    /// Ids per chunk, recorded in the allocator root when it is initialized
    pub chunk_size: u32,
}

/// Journal sync strategy
#[derive(Debug, Clone, Copy)]
pub enum JournalSyncStrategy {
    /// fsync after every committed batch (safest, slowest)
    EveryWrite,

    /// fsync after N committed batches
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            journal_sync_strategy: JournalSyncStrategy::EveryNEntries { count: 100 },
            max_batch_records: 64,
            chunk_size: crate::allocator::DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_records == 0 {
            return Err(IndexError::Config(
                "max_batch_records must be at least 1".to_string(),
            ));
        }
        if let JournalSyncStrategy::EveryNEntries { count: 0 } = self.journal_sync_strategy {
            return Err(IndexError::Config(
                "journal sync interval must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 || self.chunk_size > crate::allocator::MAX_CHUNK_SIZE {
            return Err(IndexError::InvalidChunkSize(self.chunk_size));
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
    /// Set the data directory (enables the journal)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(path.into());
        self
    }

    /// Set the journal sync strategy
    pub fn journal_sync_strategy(mut self, strategy: JournalSyncStrategy) -> Self {
        self.config.journal_sync_strategy = strategy;
        self
    }

    /// Set the per-batch record limit
    pub fn max_batch_records(mut self, count: usize) -> Self {
        self.config.max_batch_records = count;
        self
    }

    /// Set the allocator chunk size
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
