//! Record Module
//!
//! Fixed-capacity, self-describing records and their binary layout.
//!
//! ## Layout
//! ```text
//! ┌────────────────────┬──────────────────────────────────────────┐
//! │ Discriminator (8)  │ Fields in declaration order              │
//! └────────────────────┴──────────────────────────────────────────┘
//! ```
//! - integers: little-endian, fixed width
//! - `Option<T>`: tag byte (0 = none, 1 = some) followed by `T`
//! - bitmaps / bloom filters: fixed-length byte arrays, no prefix
//! - id lists / chunk lists: `u32` count prefix, then elements
//! - strings: `u32` length prefix, then UTF-8 bytes
//!
//! Every record type declares `SPACE`, the largest encoding its capacities
//! allow. A record never grows past it: lists overflow into new records
//! (shards, split nodes, chunks) instead.

mod codec;

pub use codec::{RecordReader, RecordWriter};

use bytes::Bytes;

use crate::error::{IndexError, Result};

/// Size of the leading type tag
pub const DISCRIMINATOR_SIZE: usize = 8;

/// A fixed-capacity record stored under a derived key
pub trait Record: Sized {
    /// Type tag written at offset 0
    const DISCRIMINATOR: [u8; DISCRIMINATOR_SIZE];

    /// Human-readable record type name (errors and logs)
    const NAME: &'static str;

    /// Maximum encoded size, discriminator included
    const SPACE: usize;

    /// Write all fields after the discriminator
    fn encode_fields(&self, writer: &mut RecordWriter) -> Result<()>;

    /// Read all fields after the discriminator
    fn decode_fields(reader: &mut RecordReader<'_>) -> Result<Self>;

    /// Encode discriminator + fields, enforcing the declared space
    fn to_bytes(&self) -> Result<Bytes> {
        let mut writer = RecordWriter::new(Self::NAME, Self::SPACE);
        writer.put_raw(&Self::DISCRIMINATOR);
        self.encode_fields(&mut writer)?;

        let size = writer.len();
        if size > Self::SPACE {
            return Err(IndexError::RecordTooLarge {
                record: Self::NAME,
                size,
                space: Self::SPACE,
            });
        }
        Ok(writer.freeze())
    }

    /// Decode a record, validating the tag and that every byte is consumed
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DISCRIMINATOR_SIZE || bytes[..DISCRIMINATOR_SIZE] != Self::DISCRIMINATOR {
            return Err(IndexError::CorruptRecord(format!(
                "{}: discriminator mismatch",
                Self::NAME
            )));
        }

        let mut reader = RecordReader::new(Self::NAME, &bytes[DISCRIMINATOR_SIZE..]);
        let record = Self::decode_fields(&mut reader)?;
        reader.finish()?;
        Ok(record)
    }
}
