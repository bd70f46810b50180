//! Allocator root and per-seller state records

use crate::error::Result;
use crate::key::{Key, KEY_SIZE};
use crate::record::{Record, RecordReader, RecordWriter};

use super::MAX_CHUNKS_PER_SELLER;

/// Process-wide allocator root
#[derive(Debug, Clone, PartialEq)]
pub struct IdRoot {
    /// Numeric id given to the most recently registered seller
    pub last_seller_id: u32,
    /// First id of the next chunk to be created, across all sellers
    pub next_global_id: u64,
    /// Ids per chunk
    pub chunk_size: u32,
    /// Sellers currently registered
    pub active_sellers: u32,
}

impl Record for IdRoot {
    const DISCRIMINATOR: [u8; 8] = *b"IDROOT\0\0";
    const NAME: &'static str = "IdRoot";
    const SPACE: usize = 8 + 4 + 8 + 4 + 4;

    fn encode_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.put_u32(self.last_seller_id);
        writer.put_u64(self.next_global_id);
        writer.put_u32(self.chunk_size);
        writer.put_u32(self.active_sellers);
        Ok(())
    }

    fn decode_fields(reader: &mut RecordReader<'_>) -> Result<Self> {
        Ok(Self {
            last_seller_id: reader.get_u32()?,
            next_global_id: reader.get_u64()?,
            chunk_size: reader.get_u32()?,
            active_sellers: reader.get_u32()?,
        })
    }
}

/// A seller's sequence state
#[derive(Debug, Clone, PartialEq)]
pub struct SellerIdState {
    /// Numeric seller id assigned at registration
    pub seller_id: u32,
    /// Index of the active chunk
    pub active_chunk_index: u32,
    /// Key of the active chunk
    pub active_chunk: Key,
    /// Exhausted chunks that still have outstanding ids
    pub closed_chunks: Vec<u32>,
}

impl Record for SellerIdState {
    const DISCRIMINATOR: [u8; 8] = *b"SELLERID";
    const NAME: &'static str = "SellerIdState";
    const SPACE: usize = 8 + 4 + 4 + KEY_SIZE + 4 + 4 * MAX_CHUNKS_PER_SELLER as usize;

    fn encode_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.put_u32(self.seller_id);
        writer.put_u32(self.active_chunk_index);
        writer.put_raw(self.active_chunk.as_bytes());
        writer.put_list(&self.closed_chunks, MAX_CHUNKS_PER_SELLER as usize, |w, index| {
            w.put_u32(*index)
        })
    }

    fn decode_fields(reader: &mut RecordReader<'_>) -> Result<Self> {
        Ok(Self {
            seller_id: reader.get_u32()?,
            active_chunk_index: reader.get_u32()?,
            active_chunk: Key::from_bytes(reader.get_array()?),
            closed_chunks: reader.get_list(MAX_CHUNKS_PER_SELLER as usize, |r| r.get_u32())?,
        })
    }
}
