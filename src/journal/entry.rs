//! Journal entry definitions
//!
//! One entry is the complete mutation set of one committed batch.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::key::Key;
use crate::store::Mutation;

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest payload a frame may declare (guards against garbage lengths)
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// A committed batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// Timestamp (unix millis) when the batch committed
    pub timestamp: u64,

    /// Record mutations, in the order they apply
    pub ops: Vec<JournalOp>,
}

/// Serializable form of a [`Mutation`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalOp {
    Put { key: Key, value: Vec<u8> },
    Delete { key: Key },
}

impl JournalEntry {
    pub fn new(lsn: u64, mutations: &[Mutation]) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            timestamp,
            ops: mutations.iter().map(JournalOp::from).collect(),
        }
    }

    /// bincode payload of this entry
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| IndexError::Serialization(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| IndexError::Serialization(e.to_string()))
    }

    /// Mutations ready to apply to a store
    pub fn mutations(&self) -> Vec<Mutation> {
        self.ops.iter().cloned().map(Mutation::from).collect()
    }
}

impl From<&Mutation> for JournalOp {
    fn from(mutation: &Mutation) -> Self {
        match mutation {
            Mutation::Put { key, value } => JournalOp::Put {
                key: *key,
                value: value.to_vec(),
            },
            Mutation::Delete { key } => JournalOp::Delete { key: *key },
        }
    }
}

impl From<JournalOp> for Mutation {
    fn from(op: JournalOp) -> Self {
        match op {
            JournalOp::Put { key, value } => Mutation::Put {
                key,
                value: Bytes::from(value),
            },
            JournalOp::Delete { key } => Mutation::Delete { key },
        }
    }
}
