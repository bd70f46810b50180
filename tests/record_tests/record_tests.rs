//! Tests for the record layout
//!
//! These tests verify:
//! - Discriminator checks on decode
//! - Declared space is enforced on encode
//! - Bounds and capacity checks in the field reader
//! - Derived keys are deterministic and namespaced

use marketdex::allocator::{BitmapChunk, IdRoot};
use marketdex::key::{keyword_root_key, keyword_shard_key, Key};
use marketdex::keyword::{KeywordRoot, KeywordShard};
use marketdex::record::{Record, RecordReader, RecordWriter, DISCRIMINATOR_SIZE};
use marketdex::{IndexError, Result};

// =============================================================================
// Helper Types
// =============================================================================

/// Record whose declared space is smaller than its list can grow
#[derive(Debug, PartialEq)]
struct Cramped(Vec<u64>);

impl Record for Cramped {
    const DISCRIMINATOR: [u8; 8] = *b"CRAMPED\0";
    const NAME: &'static str = "Cramped";
    const SPACE: usize = DISCRIMINATOR_SIZE + 4 + 2 * 8;

    fn encode_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.put_list(&self.0, 8, |w, v| w.put_u64(*v))
    }

    fn decode_fields(reader: &mut RecordReader<'_>) -> Result<Self> {
        Ok(Self(reader.get_list(8, |r| r.get_u64())?))
    }
}

// =============================================================================
// Record Tests
// =============================================================================

#[test]
fn test_encoded_record_starts_with_discriminator() {
    let root = IdRoot {
        last_seller_id: 3,
        next_global_id: 30_001,
        chunk_size: 10_000,
        active_sellers: 3,
    };
    let bytes = root.to_bytes().unwrap();
    assert_eq!(&bytes[..DISCRIMINATOR_SIZE], &IdRoot::DISCRIMINATOR);
    assert_eq!(bytes.len(), IdRoot::SPACE);
    assert_eq!(IdRoot::from_bytes(&bytes).unwrap(), root);
}

#[test]
fn test_wrong_discriminator_rejected() {
    let bytes = KeywordRoot::new("shoes").to_bytes().unwrap();
    let result = KeywordShard::from_bytes(&bytes);
    assert!(matches!(result, Err(IndexError::CorruptRecord(_))));

    assert!(matches!(IdRoot::from_bytes(&[1, 2, 3]), Err(IndexError::CorruptRecord(_))));
}

#[test]
fn test_trailing_bytes_rejected() {
    let mut bytes = BitmapChunk::new(1, 0, 1, 100).to_bytes().unwrap().to_vec();
    bytes.push(0);
    assert!(matches!(BitmapChunk::from_bytes(&bytes), Err(IndexError::CorruptRecord(_))));
}

#[test]
fn test_truncated_record_rejected() {
    let bytes = KeywordRoot::new("shoes").to_bytes().unwrap();
    let result = KeywordRoot::from_bytes(&bytes[..bytes.len() - 1]);
    assert!(matches!(result, Err(IndexError::CorruptRecord(_))));
}

#[test]
fn test_space_enforced() {
    assert!(Cramped(vec![1, 2]).to_bytes().is_ok());

    let result = Cramped(vec![1, 2, 3]).to_bytes();
    assert!(matches!(
        result,
        Err(IndexError::RecordTooLarge { record: "Cramped", size: 36, space: 28 })
    ));
}

#[test]
fn test_records_fit_their_space() {
    let mut shard = KeywordShard::new(&"k".repeat(32), 0, None);
    shard.item_ids = (0..100).collect();
    assert!(shard.to_bytes().unwrap().len() <= KeywordShard::SPACE);
    assert!(KeywordRoot::new(&"k".repeat(32)).to_bytes().unwrap().len() <= KeywordRoot::SPACE);
}

// =============================================================================
// Field Codec Tests
// =============================================================================

#[test]
fn test_reader_checks_bounds() {
    let mut reader = RecordReader::new("Test", &[1, 2, 3]);
    assert!(matches!(reader.get_u32(), Err(IndexError::CorruptRecord(_))));
}

#[test]
fn test_list_capacity_enforced() {
    let mut writer = RecordWriter::new("Test", 64);
    assert!(writer.put_list(&[1u64, 2, 3], 2, |w, v| w.put_u64(*v)).is_err());

    let mut writer = RecordWriter::new("Test", 64);
    writer.put_u32(5);
    let bytes = writer.freeze();
    let mut reader = RecordReader::new("Test", &bytes);
    assert!(matches!(reader.get_list(2, |r| r.get_u64()), Err(IndexError::CorruptRecord(_))));
}

#[test]
fn test_option_tag_validated() {
    let mut reader = RecordReader::new("Test", &[2, 0, 0, 0, 0]);
    assert!(matches!(reader.get_option(|r| r.get_u32()), Err(IndexError::CorruptRecord(_))));
}

#[test]
fn test_string_length_limited() {
    let mut writer = RecordWriter::new("Test", 64);
    assert!(writer.put_str("toolong", 3).is_err());
    writer.put_str("ok", 3).unwrap();

    let bytes = writer.freeze();
    let mut reader = RecordReader::new("Test", &bytes);
    assert_eq!(reader.get_str(3).unwrap(), "ok");
    reader.finish().unwrap();
}

// =============================================================================
// Key Tests
// =============================================================================

#[test]
fn test_keys_are_deterministic_and_namespaced() {
    assert_eq!(keyword_root_key("shoes"), keyword_root_key("shoes"));
    assert_ne!(keyword_root_key("shoes"), keyword_root_key("hats"));
    assert_ne!(keyword_shard_key("shoes", 0), keyword_shard_key("shoes", 1));
    assert_ne!(
        Key::derive("a", &[b"bc"]),
        Key::derive("b", &[b"bc"])
    );
    assert_eq!(keyword_root_key("shoes").to_string().len(), 64);
    assert_eq!(keyword_root_key("shoes").short().len(), 8);
}
