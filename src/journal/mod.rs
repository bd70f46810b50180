//! Batch Journal Module
//!
//! Makes committed batches durable through append-only logging.
//!
//! ## Responsibilities
//! - Append one frame per committed batch before it becomes visible
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering
//! - Replay on open, truncating torn tails
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Frame 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Frame 2                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//! `Data` is a bincode-encoded [`JournalEntry`]; the CRC covers `Data` only.

mod entry;
mod writer;
mod recovery;

pub use entry::{JournalEntry, JournalOp, HEADER_SIZE, MAX_FRAME_SIZE};
pub use writer::JournalWriter;
pub use recovery::{JournalRecovery, RecoveryReport};
