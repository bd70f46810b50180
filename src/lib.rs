//! # Marketdex
//!
//! Product-discovery indexes and identity allocation for a marketplace:
//! - Per-seller, globally unique item ids carved from bitmap chunks
//! - Keyword → item lookup over bloom-gated, sharded id lists
//! - Price and sales range trees for range queries and top-N reads
//! - All-or-nothing batches over fixed-capacity, key-addressed records,
//!   journaled for crash recovery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Coordinator                            │
//! │          (create / reprice / sale / delete an item)          │
//! └──────┬──────────────┬────────────────┬──────────────┬───────┘
//!        │              │                │              │
//!        ▼              ▼                ▼              ▼
//!  ┌───────────┐  ┌───────────┐   ┌────────────┐  ┌────────────┐
//!  │ Allocator │  │  Keyword  │   │ Price Tree │  │ Sales Tree │
//!  │ (chunks)  │  │ (shards)  │   │  (ranges)  │  │  (ranges)  │
//!  └─────┬─────┘  └─────┬─────┘   └─────┬──────┘  └─────┬──────┘
//!        └──────────────┴───────┬───────┴───────────────┘
//!                               ▼
//!                       ┌──────────────┐
//!                       │    Batch     │  (overlay + write permit)
//!                       └──────┬───────┘
//!                              │ commit
//!                ┌─────────────┴─────────────┐
//!                ▼                           ▼
//!         ┌─────────────┐             ┌─────────────┐
//!         │   Journal   │             │ RecordStore │
//!         │  (Append)   │             │  (RwLock)   │
//!         └─────────────┘             └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod record;
pub mod store;
pub mod journal;
pub mod batch;
pub mod engine;

pub mod allocator;
pub mod keyword;
pub mod range;
pub mod coordinator;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, IndexError, Result};
pub use config::{Config, JournalSyncStrategy};
pub use key::{Key, SellerKey};
pub use batch::Batch;
pub use engine::{CommitInfo, Engine};
pub use allocator::IdAllocator;
pub use keyword::KeywordIndex;
pub use range::{PriceIndex, RangeIndex, SalesIndex};
pub use coordinator::{Coordinator, ItemListing};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Marketdex
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
