//! Keyword root record

use crate::error::Result;
use crate::record::{Record, RecordReader, RecordWriter};

use super::bloom::RootBloom;
use super::{MAX_KEYWORD_LEN, ROOT_BLOOM_BYTES};

/// Per-keyword metadata and shard chain endpoints
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordRoot {
    pub keyword: String,
    /// Live shards in the chain
    pub total_shards: u32,
    /// Index of the first shard (`None` once every shard is closed)
    pub head_shard: Option<u32>,
    /// Index of the shard inserts go to
    pub tail_shard: Option<u32>,
    /// Items currently indexed under this keyword
    pub total_items: u32,
    /// Every item ever inserted; never cleared by removal
    pub bloom: RootBloom,
}

impl KeywordRoot {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            total_shards: 0,
            head_shard: None,
            tail_shard: None,
            total_items: 0,
            bloom: RootBloom::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_items == 0
    }
}

impl Record for KeywordRoot {
    const DISCRIMINATOR: [u8; 8] = *b"KWROOT\0\0";
    const NAME: &'static str = "KeywordRoot";
    const SPACE: usize = 8 + (4 + MAX_KEYWORD_LEN) + 4 + 5 + 5 + 4 + ROOT_BLOOM_BYTES;

    fn encode_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.put_str(&self.keyword, MAX_KEYWORD_LEN)?;
        writer.put_u32(self.total_shards);
        writer.put_option(self.head_shard.as_ref(), |w, index| w.put_u32(*index));
        writer.put_option(self.tail_shard.as_ref(), |w, index| w.put_u32(*index));
        writer.put_u32(self.total_items);
        writer.put_raw(self.bloom.as_bytes());
        Ok(())
    }

    fn decode_fields(reader: &mut RecordReader<'_>) -> Result<Self> {
        Ok(Self {
            keyword: reader.get_str(MAX_KEYWORD_LEN)?,
            total_shards: reader.get_u32()?,
            head_shard: reader.get_option(|r| r.get_u32())?,
            tail_shard: reader.get_option(|r| r.get_u32())?,
            total_items: reader.get_u32()?,
            bloom: RootBloom::from_bytes(reader.get_array()?),
        })
    }
}
