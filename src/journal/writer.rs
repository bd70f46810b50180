//! Journal Writer
//!
//! Appends framed entries to the journal file. A frame is assembled in
//! memory and written in one call; a failed write is cut back off the file
//! so the next frame starts where the last good one ended.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};
use tracing::{debug, error, warn};

use super::{JournalEntry, HEADER_SIZE, MAX_FRAME_SIZE};
use crate::config::JournalSyncStrategy;
use crate::error::{IndexError, Result};
use crate::store::Mutation;

/// Writes committed batches to the journal file
pub struct JournalWriter {
    path: PathBuf,
    file: File,
    /// File length after the last complete frame
    len: u64,
    /// Set when a torn frame could not be cut off; every later append fails
    poisoned: bool,
    next_lsn: u64,
    sync_strategy: JournalSyncStrategy,
    /// Frames written since the last fsync
    unsynced: usize,
}

impl JournalWriter {
    /// Open (or create) a journal for appending.
    ///
    /// `next_lsn` continues the sequence found by recovery.
    pub fn open(path: &Path, sync_strategy: JournalSyncStrategy, next_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            poisoned: false,
            next_lsn,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Append one committed batch, returning its LSN.
    ///
    /// On error the journal is left ending at the previous frame.
    pub fn append(&mut self, mutations: &[Mutation]) -> Result<u64> {
        if self.poisoned {
            return Err(IndexError::JournalCorruption(format!(
                "{}: torn frame after byte {} could not be removed",
                self.path.display(),
                self.len
            )));
        }

        let lsn = self.next_lsn;
        let entry = JournalEntry::new(lsn, mutations);
        let payload = entry.serialize()?;

        if payload.len() > MAX_FRAME_SIZE as usize {
            return Err(IndexError::JournalCorruption(format!(
                "frame of {} bytes exceeds max {}",
                payload.len(),
                MAX_FRAME_SIZE
            )));
        }

        // Header: [lsn(8)][crc(4)][len(4)]
        let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        frame.put_u64_le(lsn);
        frame.put_u32_le(crc32fast::hash(&payload));
        frame.put_u32_le(payload.len() as u32);
        frame.put_slice(&payload);

        self.discard_torn_tail()?;
        if let Err(e) = self.file.write_all(&frame).and_then(|()| self.file.flush()) {
            self.rollback();
            return Err(e.into());
        }
        self.len += frame.len() as u64;

        self.next_lsn += 1;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            JournalSyncStrategy::EveryWrite => true,
            JournalSyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        }

        debug!(lsn, ops = mutations.len(), bytes = payload.len(), "journal append");
        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// LSN the next append will receive
    pub fn next_lsn(&self) -> u64 {
        self.next_lsn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes past the last complete frame
    pub fn torn_bytes(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len().saturating_sub(self.len))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Cut anything past the last complete frame before writing a new one
    fn discard_torn_tail(&mut self) -> Result<()> {
        let on_disk = self.file.metadata()?.len();
        if on_disk < self.len {
            self.poisoned = true;
            return Err(IndexError::JournalCorruption(format!(
                "{}: shrank to {} bytes, {} were written",
                self.path.display(),
                on_disk,
                self.len
            )));
        }
        if on_disk > self.len {
            warn!(
                path = %self.path.display(),
                torn = on_disk - self.len,
                "discarding torn journal tail"
            );
            self.file.set_len(self.len)?;
        }
        Ok(())
    }

    /// Drop a partially written frame; poison the writer if that fails
    fn rollback(&mut self) {
        if let Err(e) = self.file.set_len(self.len) {
            error!(path = %self.path.display(), error = %e, "journal rollback failed");
            self.poisoned = true;
        }
    }
}
