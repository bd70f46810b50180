//! Error types for marketdex
//!
//! Provides a unified error type for all index, allocator and storage
//! operations, plus the coarse taxonomy callers use to decide whether a
//! failed batch is worth retrying.

use thiserror::Error;

/// Result type alias using IndexError
pub type Result<T> = std::result::Result<T, IndexError>;

/// Unified error type for marketdex operations
#[derive(Debug, Error)]
pub enum IndexError {
    // -------------------------------------------------------------------------
    // Not-found Errors
    // -------------------------------------------------------------------------
    #[error("Keyword not indexed: {0}")]
    KeywordNotIndexed(String),

    #[error("Range index node not found: [{start}, {end})")]
    RangeIndexNotFound { start: u64, end: u64 },

    #[error("Item {item_id} not present in index")]
    ItemNotInIndex { item_id: u64 },

    #[error("Keyword shard not found: {keyword}#{shard_index}")]
    ShardNotFound { keyword: String, shard_index: u32 },

    #[error("Seller not registered")]
    SellerNotRegistered,

    #[error("ID allocator root not initialized")]
    AllocatorNotInitialized,

    #[error("ID {id} was never allocated to this seller")]
    IdNotAllocated { id: u64 },

    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    #[error("Range node [{start}, {end}) is full")]
    RangeNodeFull { start: u64, end: u64 },

    #[error("Active ID chunk {chunk_index} is exhausted")]
    ChunkExhausted { chunk_index: u32 },

    #[error("Seller reached the maximum of {max} chunks")]
    TooManyChunks { max: u32 },

    #[error("Batch too large: {touched} records (max {max})")]
    BatchTooLarge { touched: usize, max: usize },

    // -------------------------------------------------------------------------
    // Conflict Errors
    // -------------------------------------------------------------------------
    #[error("Seller already registered")]
    DuplicateSeller,

    #[error("Item {item_id} already present in index")]
    DuplicateItemInIndex { item_id: u64 },

    #[error("Range node [{start}, {end}) already exists")]
    NodeAlreadyExists { start: u64, end: u64 },

    #[error("Keyword already indexed: {0}")]
    KeywordAlreadyIndexed(String),

    #[error("ID allocator root already initialized")]
    AllocatorAlreadyInitialized,

    #[error("ID {id} already reclaimed")]
    IdAlreadyReclaimed { id: u64 },

    // -------------------------------------------------------------------------
    // Invariant Violations
    // -------------------------------------------------------------------------
    #[error("Invalid range: [{start}, {end})")]
    InvalidRange { start: u64, end: u64 },

    #[error("Range [{start}, {end}) overlaps an existing node")]
    RangeOverlap { start: u64, end: u64 },

    #[error("Metric {metric} outside node range [{start}, {end})")]
    MetricOutOfRange { metric: u64, start: u64, end: u64 },

    #[error("Range node [{start}, {end}) is not full; split refused")]
    NodeNotFull { start: u64, end: u64 },

    #[error("Keyword shard {keyword}#{shard_index} is not empty")]
    ShardNotEmpty { keyword: String, shard_index: u32 },

    #[error("Keyword index not empty: {0}")]
    KeywordIndexNotEmpty(String),

    #[error("Invalid keyword: {0}")]
    InvalidKeyword(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(u32),

    #[error("Seller still has outstanding ids")]
    SellerHasOutstandingIds,

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Record too large: {record} needs {size} bytes (space {space})")]
    RecordTooLarge {
        record: &'static str,
        size: usize,
        space: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Journal corruption detected: {0}")]
    JournalCorruption(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of an [`IndexError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller must initialize the missing record first
    NotFound,
    /// Caller must split / rotate / shrink the batch, then retry
    Capacity,
    /// Logic error surfaced to the end caller, never retried
    Conflict,
    /// Rejected input or state that would break a structural invariant
    Invariant,
    /// Persistence layer failure
    Storage,
}

impl IndexError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        use IndexError::*;

        match self {
            KeywordNotIndexed(_)
            | RangeIndexNotFound { .. }
            | ItemNotInIndex { .. }
            | ShardNotFound { .. }
            | SellerNotRegistered
            | AllocatorNotInitialized
            | IdNotAllocated { .. } => ErrorKind::NotFound,

            RangeNodeFull { .. }
            | ChunkExhausted { .. }
            | TooManyChunks { .. }
            | BatchTooLarge { .. } => ErrorKind::Capacity,

            DuplicateSeller
            | DuplicateItemInIndex { .. }
            | NodeAlreadyExists { .. }
            | KeywordAlreadyIndexed(_)
            | AllocatorAlreadyInitialized
            | IdAlreadyReclaimed { .. } => ErrorKind::Conflict,

            InvalidRange { .. }
            | RangeOverlap { .. }
            | MetricOutOfRange { .. }
            | NodeNotFull { .. }
            | ShardNotEmpty { .. }
            | KeywordIndexNotEmpty(_)
            | InvalidKeyword(_)
            | InvalidChunkSize(_)
            | SellerHasOutstandingIds => ErrorKind::Invariant,

            Io(_)
            | CorruptRecord(_)
            | RecordTooLarge { .. }
            | Serialization(_)
            | JournalCorruption(_)
            | Config(_) => ErrorKind::Storage,
        }
    }

    /// Whether the caller can fix the condition and retry the batch.
    ///
    /// `BatchTooLarge` is a capacity error but is never retryable as-is: the
    /// work has to be split across several batches first.
    pub fn is_recoverable(&self) -> bool {
        match self {
            IndexError::BatchTooLarge { .. } => false,
            other => matches!(other.kind(), ErrorKind::NotFound | ErrorKind::Capacity),
        }
    }
}
