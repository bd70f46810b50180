//! Keyword Index Module
//!
//! Maps a keyword to the items tagged with it, as a chain of bounded shards.
//!
//! ## Layout
//! ```text
//!   KeywordRoot("shoes")  head=0 tail=2  bloom(all ids ever inserted)
//!        │
//!        ▼
//!   Shard 0 ◀──▶ Shard 1 ◀──▶ Shard 2 (tail, receives inserts)
//!   [≤100 ids]   [≤100 ids]   [≤100 ids]
//! ```
//! - Inserts always go to the tail; a full tail grows the chain by one shard
//! - Lookups test the root bloom, then each shard's min/max and summary bloom
//!   before scanning its ids
//! - Removal swap-removes in place; emptied shards stay linked until closed

mod bloom;
mod root;
mod shard;

pub use bloom::{BloomFilter, RootBloom, ShardBloom};
pub use root::KeywordRoot;
pub use shard::KeywordShard;

use tracing::{debug, info};

use crate::batch::Batch;
use crate::error::{IndexError, Result};
use crate::key::{keyword_root_key, keyword_shard_key};
use crate::store::RecordSource;

/// Max item ids per shard
pub const SHARD_CAPACITY: usize = 100;

/// Max keyword length in bytes
pub const MAX_KEYWORD_LEN: usize = 32;

/// Keyword root bloom size in bytes
pub const ROOT_BLOOM_BYTES: usize = 256;

/// Shard summary bloom size in bytes
pub const SHARD_BLOOM_BYTES: usize = 32;

/// Operations over keyword roots and shards
pub struct KeywordIndex;

impl KeywordIndex {
    /// Create the root and its empty shard 0
    pub fn initialize(batch: &mut Batch<'_>, keyword: &str) -> Result<(KeywordRoot, KeywordShard)> {
        Self::validate(keyword)?;

        let root_key = keyword_root_key(keyword);
        if batch.contains(&root_key) {
            return Err(IndexError::KeywordAlreadyIndexed(keyword.to_string()));
        }

        let shard = KeywordShard::new(keyword, 0, None);
        let mut root = KeywordRoot::new(keyword);
        root.total_shards = 1;
        root.head_shard = Some(0);
        root.tail_shard = Some(0);

        batch.save(&keyword_shard_key(keyword, 0), &shard)?;
        batch.save(&root_key, &root)?;

        info!(keyword, "keyword indexed");
        Ok((root, shard))
    }

    pub fn root<S: RecordSource>(source: &S, keyword: &str) -> Result<KeywordRoot> {
        source
            .load(&keyword_root_key(keyword))?
            .ok_or_else(|| IndexError::KeywordNotIndexed(keyword.to_string()))
    }

    pub fn shard<S: RecordSource>(source: &S, keyword: &str, shard_index: u32) -> Result<KeywordShard> {
        source
            .load(&keyword_shard_key(keyword, shard_index))?
            .ok_or_else(|| IndexError::ShardNotFound {
                keyword: keyword.to_string(),
                shard_index,
            })
    }

    /// Append `item_id` to the tail shard, growing the chain when it is full.
    ///
    /// Returns the index of the shard that received the item.
    pub fn insert(batch: &mut Batch<'_>, keyword: &str, item_id: u64) -> Result<u32> {
        let root_key = keyword_root_key(keyword);
        let mut root = Self::root(batch, keyword)?;

        if root.bloom.might_contain(item_id) && Self::find(batch, &root, item_id)?.is_some() {
            return Err(IndexError::DuplicateItemInIndex { item_id });
        }

        let shard_index = match root.tail_shard {
            Some(tail_index) => {
                let mut tail = Self::shard(batch, keyword, tail_index)?;
                if tail.is_full() {
                    let next_index = tail_index + 1;
                    let mut fresh = KeywordShard::new(keyword, next_index, Some(tail_index));
                    fresh.push(item_id);
                    tail.next_shard = Some(next_index);

                    batch.save(&keyword_shard_key(keyword, tail_index), &tail)?;
                    batch.save(&keyword_shard_key(keyword, next_index), &fresh)?;

                    root.tail_shard = Some(next_index);
                    root.total_shards += 1;
                    info!(keyword, shard_index = next_index, "keyword shard appended");
                    next_index
                } else {
                    tail.push(item_id);
                    batch.save(&keyword_shard_key(keyword, tail_index), &tail)?;
                    tail_index
                }
            }
            None => {
                // Every shard was closed; restart the chain
                let mut fresh = KeywordShard::new(keyword, 0, None);
                fresh.push(item_id);
                batch.save(&keyword_shard_key(keyword, 0), &fresh)?;

                root.head_shard = Some(0);
                root.tail_shard = Some(0);
                root.total_shards = 1;
                0
            }
        };

        root.bloom.insert(item_id);
        root.total_items += 1;
        batch.save(&root_key, &root)?;

        debug!(keyword, item_id, shard_index, "keyword insert");
        Ok(shard_index)
    }

    /// Remove `item_id`; returns the index of the shard it was taken from
    pub fn remove(batch: &mut Batch<'_>, keyword: &str, item_id: u64) -> Result<u32> {
        let root_key = keyword_root_key(keyword);
        let mut root = Self::root(batch, keyword)?;

        if !root.bloom.might_contain(item_id) {
            return Err(IndexError::ItemNotInIndex { item_id });
        }

        let mut shard = Self::find(batch, &root, item_id)?
            .ok_or(IndexError::ItemNotInIndex { item_id })?;
        shard.take(item_id);
        root.total_items = root.total_items.saturating_sub(1);

        batch.save(&keyword_shard_key(keyword, shard.shard_index), &shard)?;
        batch.save(&root_key, &root)?;

        debug!(keyword, item_id, shard_index = shard.shard_index, "keyword remove");
        Ok(shard.shard_index)
    }

    /// Bloom-gated membership test
    pub fn contains<S: RecordSource>(source: &S, keyword: &str, item_id: u64) -> Result<bool> {
        let root = Self::root(source, keyword)?;
        if !root.bloom.might_contain(item_id) {
            return Ok(false);
        }
        Ok(Self::find(source, &root, item_id)?.is_some())
    }

    /// Item ids in shard-chain order, paged
    pub fn items<S: RecordSource>(
        source: &S,
        keyword: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<u64>> {
        let root = Self::root(source, keyword)?;
        let mut items = Vec::new();
        let mut skipped = 0usize;

        for shard in Self::chain(source, &root)? {
            if items.len() >= limit {
                break;
            }
            for &id in &shard.item_ids {
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                if items.len() >= limit {
                    break;
                }
                items.push(id);
            }
        }
        Ok(items)
    }

    /// Every live shard, head to tail
    pub fn shards<S: RecordSource>(source: &S, keyword: &str) -> Result<Vec<KeywordShard>> {
        let root = Self::root(source, keyword)?;
        Self::chain(source, &root)
    }

    /// Delete an empty shard and relink its neighbours
    pub fn close_shard(batch: &mut Batch<'_>, keyword: &str, shard_index: u32) -> Result<()> {
        let mut root = Self::root(batch, keyword)?;
        let shard = Self::shard(batch, keyword, shard_index)?;

        if !shard.is_empty() {
            return Err(IndexError::ShardNotEmpty {
                keyword: keyword.to_string(),
                shard_index,
            });
        }

        if let Some(prev_index) = shard.prev_shard {
            let mut prev = Self::shard(batch, keyword, prev_index)?;
            prev.next_shard = shard.next_shard;
            batch.save(&keyword_shard_key(keyword, prev_index), &prev)?;
        }
        if let Some(next_index) = shard.next_shard {
            let mut next = Self::shard(batch, keyword, next_index)?;
            next.prev_shard = shard.prev_shard;
            batch.save(&keyword_shard_key(keyword, next_index), &next)?;
        }

        if root.head_shard == Some(shard_index) {
            root.head_shard = shard.next_shard;
        }
        if root.tail_shard == Some(shard_index) {
            root.tail_shard = shard.prev_shard;
        }
        root.total_shards = root.total_shards.saturating_sub(1);

        batch.delete(&keyword_shard_key(keyword, shard_index))?;
        batch.save(&keyword_root_key(keyword), &root)?;

        info!(keyword, shard_index, remaining = root.total_shards, "keyword shard closed");
        Ok(())
    }

    /// Delete a keyword root whose shards have all been closed
    pub fn close_root(batch: &mut Batch<'_>, keyword: &str) -> Result<()> {
        let root = Self::root(batch, keyword)?;
        if root.total_shards != 0 || root.total_items != 0 {
            return Err(IndexError::KeywordIndexNotEmpty(keyword.to_string()));
        }

        batch.delete(&keyword_root_key(keyword))?;
        info!(keyword, "keyword root closed");
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn validate(keyword: &str) -> Result<()> {
        if keyword.is_empty() || keyword.len() > MAX_KEYWORD_LEN {
            return Err(IndexError::InvalidKeyword(keyword.to_string()));
        }
        Ok(())
    }

    /// Walk the chain and return the shard holding `item_id`
    fn find<S: RecordSource>(
        source: &S,
        root: &KeywordRoot,
        item_id: u64,
    ) -> Result<Option<KeywordShard>> {
        let mut cursor = root.head_shard;
        let mut visited = 0u32;

        while let Some(index) = cursor {
            visited += 1;
            if visited > root.total_shards {
                return Err(Self::broken_chain(root));
            }
            let shard = Self::shard(source, &root.keyword, index)?;
            if shard.contains(item_id) {
                return Ok(Some(shard));
            }
            cursor = shard.next_shard;
        }
        Ok(None)
    }

    fn chain<S: RecordSource>(source: &S, root: &KeywordRoot) -> Result<Vec<KeywordShard>> {
        let mut shards = Vec::with_capacity(root.total_shards as usize);
        let mut cursor = root.head_shard;

        while let Some(index) = cursor {
            if shards.len() as u32 >= root.total_shards {
                return Err(Self::broken_chain(root));
            }
            let shard = Self::shard(source, &root.keyword, index)?;
            cursor = shard.next_shard;
            shards.push(shard);
        }
        Ok(shards)
    }

    fn broken_chain(root: &KeywordRoot) -> IndexError {
        IndexError::CorruptRecord(format!(
            "keyword '{}': shard chain longer than {} shards",
            root.keyword, root.total_shards
        ))
    }
}
