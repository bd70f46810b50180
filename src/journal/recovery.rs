//! Journal Recovery
//!
//! Replays committed batches and cuts off anything after the last valid
//! frame.

use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing::{info, warn};

use super::{JournalEntry, HEADER_SIZE, MAX_FRAME_SIZE};
use crate::error::Result;

/// Handles journal recovery after a crash
pub struct JournalRecovery;

/// Result of a recovery pass
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecoveryReport {
    /// Number of frames successfully recovered
    pub entries_recovered: u64,

    /// Number of frames rejected (bad CRC, bad payload, torn write)
    pub entries_corrupted: u64,

    /// Last valid LSN (0 when the journal is empty)
    pub last_lsn: u64,

    /// Whether bytes after the last valid frame were cut off
    pub was_truncated: bool,
}

impl JournalRecovery {
    /// Recover entries from a journal file, truncating it after the last
    /// valid frame.
    ///
    /// A frame that fails its CRC ends the scan: later frames may depend on
    /// the lost batch, so they are discarded too.
    pub fn recover(path: &Path) -> Result<(Vec<JournalEntry>, RecoveryReport)> {
        let (entries, mut report, valid_len) = Self::scan(path)?;

        let file_len = fs::metadata(path)?.len();
        if valid_len < file_len {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
            report.was_truncated = true;
            warn!(
                path = %path.display(),
                dropped_bytes = file_len - valid_len,
                "journal tail truncated"
            );
        }

        info!(
            recovered = report.entries_recovered,
            corrupted = report.entries_corrupted,
            last_lsn = report.last_lsn,
            "journal recovery finished"
        );
        Ok((entries, report))
    }

    /// Verify integrity of a journal file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryReport> {
        let (_, mut report, valid_len) = Self::scan(path)?;
        report.was_truncated = valid_len < fs::metadata(path)?.len();
        Ok(report)
    }

    /// Parse frames until the first invalid one; returns the entries, the
    /// report and the byte length of the valid prefix
    fn scan(path: &Path) -> Result<(Vec<JournalEntry>, RecoveryReport, u64)> {
        let data = fs::read(path)?;
        let mut entries = Vec::new();
        let mut report = RecoveryReport::default();
        let mut pos = 0usize;

        while pos < data.len() {
            if data.len() - pos < HEADER_SIZE {
                report.entries_corrupted += 1;
                break;
            }

            let header = &data[pos..pos + HEADER_SIZE];
            let mut lsn_bytes = [0u8; 8];
            lsn_bytes.copy_from_slice(&header[0..8]);
            let mut crc_bytes = [0u8; 4];
            crc_bytes.copy_from_slice(&header[8..12]);
            let mut len_bytes = [0u8; 4];
            len_bytes.copy_from_slice(&header[12..16]);

            let lsn = u64::from_le_bytes(lsn_bytes);
            let crc = u32::from_le_bytes(crc_bytes);
            let len = u32::from_le_bytes(len_bytes);

            let start = pos + HEADER_SIZE;
            if len > MAX_FRAME_SIZE || data.len() - start < len as usize {
                report.entries_corrupted += 1;
                break;
            }

            let payload = &data[start..start + len as usize];
            if crc32fast::hash(payload) != crc {
                report.entries_corrupted += 1;
                break;
            }

            let entry = match JournalEntry::deserialize(payload) {
                Ok(entry) if entry.lsn == lsn => entry,
                _ => {
                    report.entries_corrupted += 1;
                    break;
                }
            };

            report.entries_recovered += 1;
            report.last_lsn = lsn;
            entries.push(entry);
            pos = start + len as usize;
        }

        Ok((entries, report, pos as u64))
    }
}
