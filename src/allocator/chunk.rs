//! Bitmap chunk record
//!
//! A contiguous block of global item ids owned by one seller. Bits in the
//! bitmap mark ids that were handed out and later reclaimed; they are kept
//! for closure bookkeeping and never drive reuse.

use crate::error::{IndexError, Result};
use crate::record::{Record, RecordReader, RecordWriter};

use super::BITMAP_BYTES;

/// One seller-owned block of sequential ids
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapChunk {
    /// Numeric id of the owning seller
    pub seller_id: u32,
    /// 0-based position in the seller's chunk sequence
    pub chunk_index: u32,
    /// First id of the block
    pub start_id: u64,
    /// Last id of the block (inclusive)
    pub end_id: u64,
    /// Offset from `start_id` of the next id to hand out
    pub next_available: u64,
    /// One bit per id in the block, set once that id is reclaimed
    pub bitmap: [u8; BITMAP_BYTES],
}

impl BitmapChunk {
    pub fn new(seller_id: u32, chunk_index: u32, start_id: u64, size: u32) -> Self {
        Self {
            seller_id,
            chunk_index,
            start_id,
            end_id: start_id + u64::from(size) - 1,
            next_available: 0,
            bitmap: [0; BITMAP_BYTES],
        }
    }

    /// Number of ids in the block
    pub fn capacity(&self) -> u64 {
        self.end_id - self.start_id + 1
    }

    /// Ids not yet handed out
    pub fn remaining(&self) -> u64 {
        self.capacity() - self.next_available
    }

    pub fn is_exhausted(&self) -> bool {
        self.start_id + self.next_available > self.end_id
    }

    pub fn utilization(&self) -> f32 {
        self.next_available as f32 / self.capacity() as f32
    }

    pub fn contains(&self, id: u64) -> bool {
        id >= self.start_id && id <= self.end_id
    }

    /// Whether `id` has been handed out by this chunk
    pub fn was_allocated(&self, id: u64) -> bool {
        self.contains(id) && id - self.start_id < self.next_available
    }

    pub fn is_reclaimed(&self, id: u64) -> bool {
        if !self.contains(id) {
            return false;
        }
        let offset = id - self.start_id;
        let byte_index = (offset / 8) as usize;
        let bit_index = (offset % 8) as u8;
        (self.bitmap[byte_index] >> bit_index) & 1 == 1
    }

    pub(crate) fn mark_reclaimed(&mut self, id: u64) {
        let offset = id - self.start_id;
        let byte_index = (offset / 8) as usize;
        let bit_index = (offset % 8) as u8;
        self.bitmap[byte_index] |= 1 << bit_index;
    }

    /// Reclaimed ids among those handed out
    pub fn reclaimed_count(&self) -> u64 {
        (0..self.next_available)
            .filter(|offset| self.is_reclaimed(self.start_id + offset))
            .count() as u64
    }

    /// Handed out and not yet reclaimed
    pub fn outstanding(&self) -> u64 {
        self.next_available - self.reclaimed_count()
    }

    /// Every id ever handed out has come back
    pub fn is_fully_reclaimed(&self) -> bool {
        self.outstanding() == 0
    }
}

impl Record for BitmapChunk {
    const DISCRIMINATOR: [u8; 8] = *b"IDCHUNK\0";
    const NAME: &'static str = "BitmapChunk";
    const SPACE: usize = 8 + 4 + 4 + 8 + 8 + 8 + BITMAP_BYTES;

    fn encode_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.put_u32(self.seller_id);
        writer.put_u32(self.chunk_index);
        writer.put_u64(self.start_id);
        writer.put_u64(self.end_id);
        writer.put_u64(self.next_available);
        writer.put_raw(&self.bitmap);
        Ok(())
    }

    fn decode_fields(reader: &mut RecordReader<'_>) -> Result<Self> {
        let chunk = Self {
            seller_id: reader.get_u32()?,
            chunk_index: reader.get_u32()?,
            start_id: reader.get_u64()?,
            end_id: reader.get_u64()?,
            next_available: reader.get_u64()?,
            bitmap: reader.get_array()?,
        };

        // Bounds every bitmap access relies on
        if chunk.end_id < chunk.start_id
            || chunk.capacity() > (BITMAP_BYTES * 8) as u64
            || chunk.next_available > chunk.capacity()
        {
            return Err(IndexError::CorruptRecord(format!(
                "{}: bad bounds start={} end={} next={}",
                Self::NAME,
                chunk.start_id,
                chunk.end_id,
                chunk.next_available
            )));
        }
        Ok(chunk)
    }
}
