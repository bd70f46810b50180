//! Tests for the Keyword Index
//!
//! These tests verify:
//! - Root initialization and keyword validation
//! - Tail inserts and shard chain growth at capacity
//! - Bloom-gated membership (no false negatives)
//! - Removal, shard closing and root closing
//! - Paged listing in chain order

use marketdex::keyword::{KeywordIndex, RootBloom, ShardBloom, SHARD_CAPACITY};
use marketdex::{Engine, IndexError};
use proptest::prelude::*;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup(keyword: &str) -> Engine {
    let engine = Engine::in_memory().unwrap();
    engine
        .transact(|batch| KeywordIndex::initialize(batch, keyword))
        .unwrap();
    engine
}

fn insert_all(engine: &Engine, keyword: &str, ids: impl IntoIterator<Item = u64>) {
    engine
        .transact(|batch| {
            for id in ids {
                KeywordIndex::insert(batch, keyword, id)?;
            }
            Ok(())
        })
        .unwrap();
}

// =============================================================================
// Initialization Tests
// =============================================================================

#[test]
fn test_initialize_creates_root_and_first_shard() {
    let engine = setup("shoes");

    let root = KeywordIndex::root(engine.store(), "shoes").unwrap();
    assert_eq!(root.total_shards, 1);
    assert_eq!(root.head_shard, Some(0));
    assert_eq!(root.tail_shard, Some(0));
    assert_eq!(root.total_items, 0);

    let shard = KeywordIndex::shard(engine.store(), "shoes", 0).unwrap();
    assert!(shard.is_empty());
    assert_eq!(shard.prev_shard, None);
    assert_eq!(shard.next_shard, None);
}

#[test]
fn test_initialize_twice_fails() {
    let engine = setup("shoes");
    let result = engine.transact(|batch| KeywordIndex::initialize(batch, "shoes"));
    assert!(matches!(result, Err(IndexError::KeywordAlreadyIndexed(k)) if k == "shoes"));
}

#[test]
fn test_invalid_keywords_rejected() {
    let engine = Engine::in_memory().unwrap();
    let too_long = "x".repeat(33);
    for keyword in ["", too_long.as_str()] {
        let result = engine.transact(|batch| KeywordIndex::initialize(batch, keyword));
        assert!(matches!(result, Err(IndexError::InvalidKeyword(_))));
    }
}

#[test]
fn test_insert_requires_initialized_keyword() {
    let engine = Engine::in_memory().unwrap();
    let result = engine.transact(|batch| KeywordIndex::insert(batch, "hats", 1));
    assert!(matches!(result, Err(IndexError::KeywordNotIndexed(k)) if k == "hats"));
}

#[test]
fn test_missing_shard_is_reported() {
    let engine = setup("shoes");
    let result = KeywordIndex::shard(engine.store(), "shoes", 7);
    assert!(matches!(result, Err(IndexError::ShardNotFound { shard_index: 7, .. })));
}

// =============================================================================
// Insert Tests
// =============================================================================

#[test]
fn test_overflow_appends_new_tail_shard() {
    let engine = setup("shoes");
    insert_all(&engine, "shoes", 1..=SHARD_CAPACITY as u64 + 1);

    let root = KeywordIndex::root(engine.store(), "shoes").unwrap();
    assert_eq!(root.total_shards, 2);
    assert_eq!(root.head_shard, Some(0));
    assert_eq!(root.tail_shard, Some(1));
    assert_eq!(root.total_items, SHARD_CAPACITY as u32 + 1);

    let first = KeywordIndex::shard(engine.store(), "shoes", 0).unwrap();
    let second = KeywordIndex::shard(engine.store(), "shoes", 1).unwrap();
    assert!(first.is_full());
    assert_eq!(first.next_shard, Some(1));
    assert_eq!(second.prev_shard, Some(0));
    assert_eq!(second.item_ids, vec![SHARD_CAPACITY as u64 + 1]);
}

#[test]
fn test_insert_tracks_min_max() {
    let engine = setup("shoes");
    insert_all(&engine, "shoes", [40, 7, 93]);

    let shard = KeywordIndex::shard(engine.store(), "shoes", 0).unwrap();
    assert_eq!(shard.min_id, 7);
    assert_eq!(shard.max_id, 93);
}

#[test]
fn test_duplicate_insert_rejected() {
    let engine = setup("shoes");
    insert_all(&engine, "shoes", [5]);

    let result = engine.transact(|batch| KeywordIndex::insert(batch, "shoes", 5));
    assert!(matches!(result, Err(IndexError::DuplicateItemInIndex { item_id: 5 })));
    assert_eq!(KeywordIndex::root(engine.store(), "shoes").unwrap().total_items, 1);
}

#[test]
fn test_contains() {
    let engine = setup("shoes");
    insert_all(&engine, "shoes", 1..=250);

    assert!(KeywordIndex::contains(engine.store(), "shoes", 1).unwrap());
    assert!(KeywordIndex::contains(engine.store(), "shoes", 175).unwrap());
    assert!(KeywordIndex::contains(engine.store(), "shoes", 250).unwrap());
    assert!(!KeywordIndex::contains(engine.store(), "shoes", 251).unwrap());

    let root = KeywordIndex::root(engine.store(), "shoes").unwrap();
    assert!(root.bloom.fill_rate() > 0.0);
    assert!(root.bloom.estimated_count() > 0);
}

#[test]
fn test_items_paged_in_chain_order() {
    let engine = setup("shoes");
    insert_all(&engine, "shoes", 1..=150);

    let page = KeywordIndex::items(engine.store(), "shoes", 98, 4).unwrap();
    assert_eq!(page, vec![99, 100, 101, 102]);

    let tail = KeywordIndex::items(engine.store(), "shoes", 140, 50).unwrap();
    assert_eq!(tail, (141..=150).collect::<Vec<u64>>());
}

// =============================================================================
// Remove Tests
// =============================================================================

#[test]
fn test_remove() {
    let engine = setup("shoes");
    insert_all(&engine, "shoes", [1, 2, 3]);

    let shard_index = engine
        .transact(|batch| KeywordIndex::remove(batch, "shoes", 3))
        .unwrap();
    assert_eq!(shard_index, 0);

    assert!(!KeywordIndex::contains(engine.store(), "shoes", 3).unwrap());
    let root = KeywordIndex::root(engine.store(), "shoes").unwrap();
    assert_eq!(root.total_items, 2);
    assert_eq!(KeywordIndex::shard(engine.store(), "shoes", 0).unwrap().max_id, 2);
}

#[test]
fn test_remove_missing_item() {
    let engine = setup("shoes");
    insert_all(&engine, "shoes", [1]);

    let result = engine.transact(|batch| KeywordIndex::remove(batch, "shoes", 2));
    assert!(matches!(result, Err(IndexError::ItemNotInIndex { item_id: 2 })));
}

#[test]
fn test_removed_item_can_be_reinserted() {
    let engine = setup("shoes");
    insert_all(&engine, "shoes", [1]);
    engine
        .transact(|batch| KeywordIndex::remove(batch, "shoes", 1))
        .unwrap();

    insert_all(&engine, "shoes", [1]);
    assert!(KeywordIndex::contains(engine.store(), "shoes", 1).unwrap());
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_shard_requires_empty() {
    let engine = setup("shoes");
    insert_all(&engine, "shoes", [1]);

    let result = engine.transact(|batch| KeywordIndex::close_shard(batch, "shoes", 0));
    assert!(matches!(result, Err(IndexError::ShardNotEmpty { shard_index: 0, .. })));
}

#[test]
fn test_close_interior_shard_relinks() {
    let engine = setup("shoes");
    insert_all(&engine, "shoes", 1..=250);

    engine
        .transact(|batch| {
            for id in 101..=200 {
                KeywordIndex::remove(batch, "shoes", id)?;
            }
            KeywordIndex::close_shard(batch, "shoes", 1)
        })
        .unwrap();

    let shards = KeywordIndex::shards(engine.store(), "shoes").unwrap();
    let indices: Vec<u32> = shards.iter().map(|s| s.shard_index).collect();
    assert_eq!(indices, vec![0, 2]);
    assert_eq!(shards[0].next_shard, Some(2));
    assert_eq!(shards[1].prev_shard, Some(0));

    let root = KeywordIndex::root(engine.store(), "shoes").unwrap();
    assert_eq!(root.total_shards, 2);
    assert_eq!(root.total_items, 150);
}

#[test]
fn test_close_root_lifecycle() {
    let engine = setup("shoes");
    insert_all(&engine, "shoes", [1]);

    let result = engine.transact(|batch| KeywordIndex::close_root(batch, "shoes"));
    assert!(matches!(result, Err(IndexError::KeywordIndexNotEmpty(_))));

    engine
        .transact(|batch| {
            KeywordIndex::remove(batch, "shoes", 1)?;
            KeywordIndex::close_shard(batch, "shoes", 0)?;
            KeywordIndex::close_root(batch, "shoes")
        })
        .unwrap();

    assert!(matches!(
        KeywordIndex::root(engine.store(), "shoes"),
        Err(IndexError::KeywordNotIndexed(_))
    ));
}

#[test]
fn test_insert_after_all_shards_closed_restarts_chain() {
    let engine = setup("shoes");
    engine
        .transact(|batch| KeywordIndex::close_shard(batch, "shoes", 0))
        .unwrap();

    let root = KeywordIndex::root(engine.store(), "shoes").unwrap();
    assert_eq!(root.total_shards, 0);
    assert_eq!(root.head_shard, None);

    insert_all(&engine, "shoes", [9]);
    let root = KeywordIndex::root(engine.store(), "shoes").unwrap();
    assert_eq!(root.total_shards, 1);
    assert_eq!(root.tail_shard, Some(0));
    assert!(KeywordIndex::contains(engine.store(), "shoes", 9).unwrap());
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn prop_bloom_has_no_false_negatives(ids in prop::collection::vec(any::<u64>(), 0..400)) {
        let mut root = RootBloom::new();
        let mut shard = ShardBloom::new();
        for &id in &ids {
            root.insert(id);
            shard.insert(id);
        }
        for &id in &ids {
            prop_assert!(root.might_contain(id));
            prop_assert!(shard.might_contain(id));
        }
    }

    #[test]
    fn prop_every_inserted_item_is_found(count in 1u64..350, removed in prop::collection::vec(1u64..350, 0..40)) {
        let engine = setup("prop");
        insert_all(&engine, "prop", 1..=count);

        let mut gone = std::collections::HashSet::new();
        engine.transact(|batch| {
            for &id in &removed {
                if id <= count && gone.insert(id) {
                    KeywordIndex::remove(batch, "prop", id)?;
                }
            }
            Ok(())
        }).unwrap();

        for id in 1..=count {
            let found = KeywordIndex::contains(engine.store(), "prop", id).unwrap();
            prop_assert_eq!(found, !gone.contains(&id));
        }
        let root = KeywordIndex::root(engine.store(), "prop").unwrap();
        prop_assert_eq!(u64::from(root.total_items), count - gone.len() as u64);
    }
}
