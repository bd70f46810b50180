//! Engine Module
//!
//! Owns the record store and the batch journal, and is the only way to
//! commit a batch.
//!
//! ## Responsibilities
//! - Replay the journal on open
//! - Serialize batches (one open batch at a time)
//! - Commit a batch: journal first, then apply to the store in one step

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::batch::Batch;
use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::journal::{JournalRecovery, JournalWriter, RecoveryReport};
use crate::store::RecordStore;

/// What a successful commit did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    /// Journal LSN of the batch (`None` for in-memory engines and empty batches)
    pub lsn: Option<u64>,

    /// Number of records written or deleted
    pub records: usize,
}

/// The record substrate every index operation runs against
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Batches**: `begin` takes the engine's write permit and the batch holds
///   it until commit or drop, so batches never interleave
/// - **Reads**: go straight to [`RecordStore`], which applies a committed
///   batch under one write lock; readers see all of a batch or none of it
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Committed record image
    store: RecordStore,

    /// Batch journal (absent for in-memory engines)
    journal: Option<Mutex<JournalWriter>>,

    /// Held by the open batch
    write_lock: Mutex<()>,

    /// Outcome of the journal replay performed by `open`
    recovery: Option<RecoveryReport>,
}

impl Engine {
    const JOURNAL_FILENAME: &'static str = "journal.log";

    /// Open an engine with the given config
    ///
    /// With a `data_dir`, the journal is created or replayed; without one the
    /// engine is purely in-memory.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = RecordStore::new();
        let (journal, recovery) = match &config.data_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                let path = dir.join(Self::JOURNAL_FILENAME);

                let (next_lsn, report) = if path.exists() {
                    let (entries, report) = JournalRecovery::recover(&path)?;
                    for entry in &entries {
                        store.apply(&entry.mutations());
                    }
                    (report.last_lsn + 1, Some(report))
                } else {
                    (1, None)
                };

                let writer = JournalWriter::open(&path, config.journal_sync_strategy, next_lsn)?;
                (Some(Mutex::new(writer)), report)
            }
            None => (None, None),
        };

        info!(
            durable = journal.is_some(),
            records = store.len(),
            "engine opened"
        );

        Ok(Self {
            config,
            store,
            journal,
            write_lock: Mutex::new(()),
            recovery,
        })
    }

    /// Open a durable engine rooted at `path` with default settings
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Open an in-memory engine with default settings
    pub fn in_memory() -> Result<Self> {
        Self::open(Config::default())
    }

    /// Start a batch, waiting for any open batch to finish
    pub fn begin(&self) -> Batch<'_> {
        Batch::new(&self.store, self.write_lock.lock(), self.config.max_batch_records)
    }

    /// Commit a batch atomically
    ///
    /// Steps:
    /// 1. Append the mutation set to the journal (if durable)
    /// 2. Apply it to the store under one write lock
    /// 3. Release the write permit
    pub fn commit(&self, batch: Batch<'_>) -> Result<CommitInfo> {
        if !batch.belongs_to(&self.store) {
            return Err(IndexError::Config(
                "batch was opened on a different engine".to_string(),
            ));
        }

        // Permit stays held until the store reflects the batch
        let (mutations, _permit) = batch.into_parts();
        if mutations.is_empty() {
            return Ok(CommitInfo {
                lsn: None,
                records: 0,
            });
        }

        let lsn = match &self.journal {
            Some(journal) => Some(journal.lock().append(&mutations)?),
            None => None,
        };

        self.store.apply(&mutations);
        debug!(?lsn, records = mutations.len(), "batch committed");

        Ok(CommitInfo {
            lsn,
            records: mutations.len(),
        })
    }

    /// Run `f` inside a fresh batch; commit on `Ok`, discard on `Err`
    pub fn transact<T>(&self, f: impl FnOnce(&mut Batch<'_>) -> Result<T>) -> Result<T> {
        let mut batch = self.begin();
        match f(&mut batch) {
            Ok(value) => {
                self.commit(batch)?;
                Ok(value)
            }
            Err(e) => {
                debug!(error = %e, touched = batch.touched(), "batch rolled back");
                Err(e)
            }
        }
    }

    /// Flush and fsync the journal
    pub fn sync(&self) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.lock().sync()?;
        }
        Ok(())
    }

    /// Close the engine gracefully
    pub fn close(self) -> Result<()> {
        self.sync()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Committed records, for read-only queries
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Journal path, if durable
    pub fn journal_path(&self) -> Option<PathBuf> {
        self.config
            .data_dir
            .as_ref()
            .map(|dir| dir.join(Self::JOURNAL_FILENAME))
    }

    /// Report of the replay performed when this engine opened
    pub fn recovery_report(&self) -> Option<&RecoveryReport> {
        self.recovery.as_ref()
    }
}
