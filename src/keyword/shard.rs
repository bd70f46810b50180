//! Keyword shard record

use crate::error::Result;
use crate::record::{Record, RecordReader, RecordWriter};

use super::bloom::ShardBloom;
use super::{MAX_KEYWORD_LEN, SHARD_BLOOM_BYTES, SHARD_CAPACITY};

/// One bounded segment of a keyword's item list
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordShard {
    /// Owning keyword (redundant, keeps the record self-describing)
    pub keyword: String,
    pub shard_index: u32,
    pub prev_shard: Option<u32>,
    pub next_shard: Option<u32>,
    /// Item ids in insertion order (swap-removal reorders)
    pub item_ids: Vec<u64>,
    /// Smallest id held (`u64::MAX` when empty)
    pub min_id: u64,
    /// Largest id held (`0` when empty)
    pub max_id: u64,
    /// Filter over exactly the ids held
    pub summary: ShardBloom,
}

impl KeywordShard {
    pub fn new(keyword: &str, shard_index: u32, prev_shard: Option<u32>) -> Self {
        Self {
            keyword: keyword.to_string(),
            shard_index,
            prev_shard,
            next_shard: None,
            item_ids: Vec::new(),
            min_id: u64::MAX,
            max_id: 0,
            summary: ShardBloom::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.item_ids.len() >= SHARD_CAPACITY
    }

    pub fn utilization(&self) -> f32 {
        self.item_ids.len() as f32 / SHARD_CAPACITY as f32
    }

    /// Cheap pre-check: bounds first, then the summary filter
    pub fn may_hold(&self, item_id: u64) -> bool {
        item_id >= self.min_id && item_id <= self.max_id && self.summary.might_contain(item_id)
    }

    pub fn contains(&self, item_id: u64) -> bool {
        self.may_hold(item_id) && self.item_ids.contains(&item_id)
    }

    /// Append to a shard with spare capacity
    pub(crate) fn push(&mut self, item_id: u64) {
        self.item_ids.push(item_id);
        self.min_id = self.min_id.min(item_id);
        self.max_id = self.max_id.max(item_id);
        self.summary.insert(item_id);
    }

    /// Swap-remove `item_id`; returns whether it was present
    pub(crate) fn take(&mut self, item_id: u64) -> bool {
        let Some(position) = self.item_ids.iter().position(|&id| id == item_id) else {
            return false;
        };
        self.item_ids.swap_remove(position);
        self.min_id = self.item_ids.iter().copied().min().unwrap_or(u64::MAX);
        self.max_id = self.item_ids.iter().copied().max().unwrap_or(0);
        self.summary = ShardBloom::rebuild(&self.item_ids);
        true
    }
}

impl Record for KeywordShard {
    const DISCRIMINATOR: [u8; 8] = *b"KWSHARD\0";
    const NAME: &'static str = "KeywordShard";
    const SPACE: usize =
        8 + (4 + MAX_KEYWORD_LEN) + 4 + 5 + 5 + (4 + 8 * SHARD_CAPACITY) + 8 + 8 + SHARD_BLOOM_BYTES;

    fn encode_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.put_str(&self.keyword, MAX_KEYWORD_LEN)?;
        writer.put_u32(self.shard_index);
        writer.put_option(self.prev_shard.as_ref(), |w, index| w.put_u32(*index));
        writer.put_option(self.next_shard.as_ref(), |w, index| w.put_u32(*index));
        writer.put_list(&self.item_ids, SHARD_CAPACITY, |w, id| w.put_u64(*id))?;
        writer.put_u64(self.min_id);
        writer.put_u64(self.max_id);
        writer.put_raw(self.summary.as_bytes());
        Ok(())
    }

    fn decode_fields(reader: &mut RecordReader<'_>) -> Result<Self> {
        Ok(Self {
            keyword: reader.get_str(MAX_KEYWORD_LEN)?,
            shard_index: reader.get_u32()?,
            prev_shard: reader.get_option(|r| r.get_u32())?,
            next_shard: reader.get_option(|r| r.get_u32())?,
            item_ids: reader.get_list(SHARD_CAPACITY, |r| r.get_u64())?,
            min_id: reader.get_u64()?,
            max_id: reader.get_u64()?,
            summary: ShardBloom::from_bytes(reader.get_array()?),
        })
    }
}
