//! ID Allocator Module
//!
//! Mints globally unique, per-seller strictly increasing item ids.
//!
//! ## Model
//! ```text
//!   IdRoot ──(next_global_id cursor)──┐
//!                                     ▼
//!   SellerIdState ──active──▶ BitmapChunk #n   [start_id ..= end_id]
//!          │
//!          └──closed_chunks──▶ BitmapChunk #k  (exhausted, ids outstanding)
//! ```
//! - Each new chunk starts where the global cursor left off, so chunks of
//!   different sellers never overlap
//! - `allocate` never rotates chunks on its own; callers see
//!   `ChunkExhausted` and call `allocate_new_chunk`
//! - Reclaimed ids are never handed out again

mod chunk;
mod state;

pub use chunk::BitmapChunk;
pub use state::{IdRoot, SellerIdState};

use tracing::{debug, info};

use crate::batch::Batch;
use crate::error::{IndexError, Result};
use crate::key::{id_chunk_key, id_root_key, seller_state_key, Key, SellerKey};
use crate::store::RecordSource;

/// Default ids per chunk
pub const DEFAULT_CHUNK_SIZE: u32 = 10_000;

/// Largest chunk the fixed bitmap can describe
pub const MAX_CHUNK_SIZE: u32 = 10_000;

/// Bitmap bytes per chunk (one bit per id)
pub const BITMAP_BYTES: usize = (MAX_CHUNK_SIZE as usize) / 8;

/// Chunks a seller may create over its lifetime
pub const MAX_CHUNKS_PER_SELLER: u32 = 100;

/// First id handed out by a fresh allocator
pub const FIRST_ITEM_ID: u64 = 1;

/// Result of reclaiming one id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reclaimed {
    /// Chunk the id belonged to
    pub chunk_index: u32,
    /// Whether the chunk record was removed as a consequence
    pub chunk_closed: bool,
}

/// Operations over the allocator records
pub struct IdAllocator;

impl IdAllocator {
    /// Create the process-wide root
    pub fn initialize(batch: &mut Batch<'_>, chunk_size: u32) -> Result<IdRoot> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(IndexError::InvalidChunkSize(chunk_size));
        }

        let key = id_root_key();
        if batch.contains(&key) {
            return Err(IndexError::AllocatorAlreadyInitialized);
        }

        let root = IdRoot {
            last_seller_id: 0,
            next_global_id: FIRST_ITEM_ID,
            chunk_size,
            active_sellers: 0,
        };
        batch.save(&key, &root)?;

        info!(chunk_size, "id allocator initialized");
        Ok(root)
    }

    pub fn root<S: RecordSource>(source: &S) -> Result<IdRoot> {
        source
            .load(&id_root_key())?
            .ok_or(IndexError::AllocatorNotInitialized)
    }

    /// Register a seller and open its chunk 0
    pub fn register_seller(
        batch: &mut Batch<'_>,
        seller: &SellerKey,
    ) -> Result<(SellerIdState, BitmapChunk)> {
        let state_key = seller_state_key(seller);
        if batch.contains(&state_key) {
            return Err(IndexError::DuplicateSeller);
        }

        let mut root = Self::root(batch)?;
        let seller_id = root.last_seller_id + 1;
        let chunk = Self::carve_chunk(&mut root, seller_id, 0)?;
        let chunk_key = id_chunk_key(seller, 0);

        let state = SellerIdState {
            seller_id,
            active_chunk_index: 0,
            active_chunk: chunk_key,
            closed_chunks: Vec::new(),
        };

        root.last_seller_id = seller_id;
        root.active_sellers += 1;

        batch.save(&id_root_key(), &root)?;
        batch.save(&state_key, &state)?;
        batch.save(&chunk_key, &chunk)?;

        info!(
            seller_id,
            start_id = chunk.start_id,
            end_id = chunk.end_id,
            "seller registered"
        );
        Ok((state, chunk))
    }

    pub fn seller<S: RecordSource>(source: &S, seller: &SellerKey) -> Result<SellerIdState> {
        source
            .load(&seller_state_key(seller))?
            .ok_or(IndexError::SellerNotRegistered)
    }

    pub fn active_chunk<S: RecordSource>(source: &S, seller: &SellerKey) -> Result<BitmapChunk> {
        let state = Self::seller(source, seller)?;
        Self::load_chunk(source, &state.active_chunk)
    }

    pub fn chunk<S: RecordSource>(
        source: &S,
        seller: &SellerKey,
        chunk_index: u32,
    ) -> Result<Option<BitmapChunk>> {
        source.load(&id_chunk_key(seller, chunk_index))
    }

    /// Hand out the next id of the active chunk
    pub fn allocate(batch: &mut Batch<'_>, seller: &SellerKey) -> Result<u64> {
        let state = Self::seller(batch, seller)?;
        let mut chunk = Self::load_chunk(batch, &state.active_chunk)?;

        if chunk.is_exhausted() {
            return Err(IndexError::ChunkExhausted {
                chunk_index: chunk.chunk_index,
            });
        }

        let id = chunk.start_id + chunk.next_available;
        chunk.next_available += 1;
        batch.save(&state.active_chunk, &chunk)?;

        debug!(seller_id = state.seller_id, id, "id allocated");
        Ok(id)
    }

    /// Hand out `count` consecutive ids, all from the active chunk.
    ///
    /// Fails with `ChunkExhausted` and allocates nothing if they don't fit.
    pub fn allocate_many(batch: &mut Batch<'_>, seller: &SellerKey, count: u32) -> Result<Vec<u64>> {
        let state = Self::seller(batch, seller)?;
        let mut chunk = Self::load_chunk(batch, &state.active_chunk)?;

        if u64::from(count) > chunk.remaining() {
            return Err(IndexError::ChunkExhausted {
                chunk_index: chunk.chunk_index,
            });
        }

        let first = chunk.start_id + chunk.next_available;
        chunk.next_available += u64::from(count);
        batch.save(&state.active_chunk, &chunk)?;

        debug!(seller_id = state.seller_id, first, count, "ids allocated");
        Ok((first..first + u64::from(count)).collect())
    }

    /// Open the seller's next chunk and make it active.
    ///
    /// The previous active chunk is deleted if none of its ids are
    /// outstanding, otherwise it joins the closed list.
    pub fn allocate_new_chunk(batch: &mut Batch<'_>, seller: &SellerKey) -> Result<BitmapChunk> {
        let state_key = seller_state_key(seller);
        let mut state = Self::seller(batch, seller)?;
        let previous = Self::load_chunk(batch, &state.active_chunk)?;

        let chunk_index = state.active_chunk_index + 1;
        if chunk_index >= MAX_CHUNKS_PER_SELLER {
            return Err(IndexError::TooManyChunks {
                max: MAX_CHUNKS_PER_SELLER,
            });
        }

        let mut root = Self::root(batch)?;
        let chunk = Self::carve_chunk(&mut root, state.seller_id, chunk_index)?;
        let chunk_key = id_chunk_key(seller, chunk_index);

        if previous.is_fully_reclaimed() {
            batch.delete(&state.active_chunk)?;
        } else {
            state.closed_chunks.push(previous.chunk_index);
        }

        state.active_chunk_index = chunk_index;
        state.active_chunk = chunk_key;

        batch.save(&id_root_key(), &root)?;
        batch.save(&chunk_key, &chunk)?;
        batch.save(&state_key, &state)?;

        info!(
            seller_id = state.seller_id,
            chunk_index,
            start_id = chunk.start_id,
            end_id = chunk.end_id,
            previous_outstanding = previous.outstanding(),
            "id chunk rotated"
        );
        Ok(chunk)
    }

    /// Mark a deleted item's id as reclaimed
    pub fn reclaim(batch: &mut Batch<'_>, seller: &SellerKey, id: u64) -> Result<Reclaimed> {
        let state_key = seller_state_key(seller);
        let mut state = Self::seller(batch, seller)?;
        let (chunk_key, mut chunk) = Self::owning_chunk(batch, seller, &state, id)?;

        if !chunk.was_allocated(id) {
            return Err(IndexError::IdNotAllocated { id });
        }
        if chunk.is_reclaimed(id) {
            return Err(IndexError::IdAlreadyReclaimed { id });
        }

        chunk.mark_reclaimed(id);

        let is_active = chunk.chunk_index == state.active_chunk_index;
        let chunk_closed = !is_active && chunk.is_fully_reclaimed();
        if chunk_closed {
            batch.delete(&chunk_key)?;
            state.closed_chunks.retain(|&index| index != chunk.chunk_index);
            batch.save(&state_key, &state)?;
            info!(
                seller_id = state.seller_id,
                chunk_index = chunk.chunk_index,
                "id chunk closed"
            );
        } else {
            batch.save(&chunk_key, &chunk)?;
        }

        debug!(seller_id = state.seller_id, id, "id reclaimed");
        Ok(Reclaimed {
            chunk_index: chunk.chunk_index,
            chunk_closed,
        })
    }

    /// Whether `id` is currently live for `seller` (handed out, not reclaimed)
    pub fn is_allocated<S: RecordSource>(source: &S, seller: &SellerKey, id: u64) -> Result<bool> {
        let state = Self::seller(source, seller)?;
        match Self::owning_chunk(source, seller, &state, id) {
            Ok((_, chunk)) => Ok(chunk.was_allocated(id) && !chunk.is_reclaimed(id)),
            Err(IndexError::IdNotAllocated { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove a seller whose ids have all been reclaimed
    pub fn deregister_seller(batch: &mut Batch<'_>, seller: &SellerKey) -> Result<()> {
        let state_key = seller_state_key(seller);
        let state = Self::seller(batch, seller)?;
        let active = Self::load_chunk(batch, &state.active_chunk)?;

        if !state.closed_chunks.is_empty() || !active.is_fully_reclaimed() {
            return Err(IndexError::SellerHasOutstandingIds);
        }

        let mut root = Self::root(batch)?;
        root.active_sellers = root.active_sellers.saturating_sub(1);

        batch.delete(&state.active_chunk)?;
        batch.delete(&state_key)?;
        batch.save(&id_root_key(), &root)?;

        info!(seller_id = state.seller_id, "seller deregistered");
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Build a fresh chunk at the global cursor and advance the cursor
    fn carve_chunk(root: &mut IdRoot, seller_id: u32, chunk_index: u32) -> Result<BitmapChunk> {
        let start_id = root.next_global_id;
        root.next_global_id = start_id
            .checked_add(u64::from(root.chunk_size))
            .ok_or_else(|| IndexError::Config("global id space exhausted".to_string()))?;
        Ok(BitmapChunk::new(seller_id, chunk_index, start_id, root.chunk_size))
    }

    fn load_chunk<S: RecordSource>(source: &S, key: &Key) -> Result<BitmapChunk> {
        source.load(key)?.ok_or_else(|| {
            IndexError::CorruptRecord(format!("chunk {} referenced but missing", key.short()))
        })
    }

    /// Find which of the seller's open chunks covers `id`
    fn owning_chunk<S: RecordSource>(
        source: &S,
        seller: &SellerKey,
        state: &SellerIdState,
        id: u64,
    ) -> Result<(Key, BitmapChunk)> {
        let candidates = std::iter::once(state.active_chunk_index).chain(state.closed_chunks.iter().copied());
        for chunk_index in candidates {
            let key = id_chunk_key(seller, chunk_index);
            let chunk = Self::load_chunk(source, &key)?;
            if chunk.contains(id) {
                return Ok((key, chunk));
            }
        }
        Err(IndexError::IdNotAllocated { id })
    }
}
