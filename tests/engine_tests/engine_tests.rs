//! Tests for Engine
//!
//! These tests verify:
//! - Batches commit atomically and roll back on error
//! - The per-batch record limit
//! - Journal-backed durability across reopen
//! - Recovery from a torn journal tail
//! - Batches are serialized across threads

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::thread;

use marketdex::config::{Config, JournalSyncStrategy};
use marketdex::engine::Engine;
use marketdex::keyword::KeywordIndex;
use marketdex::store::RecordSource;
use marketdex::{ErrorKind, IndexError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = open(&temp_dir);
    (temp_dir, engine)
}

fn open(temp_dir: &TempDir) -> Engine {
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .journal_sync_strategy(JournalSyncStrategy::EveryWrite) // Sync every batch for test reliability
        .build();
    Engine::open(config).unwrap()
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_open_creates_journal() {
    let (temp_dir, engine) = setup_temp_engine();
    assert!(temp_dir.path().join("journal.log").exists());
    assert_eq!(engine.journal_path(), Some(temp_dir.path().join("journal.log")));
    assert!(engine.recovery_report().is_none());
}

#[test]
fn test_in_memory_engine_has_no_journal() {
    let engine = Engine::in_memory().unwrap();
    assert!(engine.journal_path().is_none());

    let info = engine.commit({
        let mut batch = engine.begin();
        KeywordIndex::initialize(&mut batch, "shoes").unwrap();
        batch
    });
    assert_eq!(info.unwrap().lsn, None);
}

#[test]
fn test_invalid_config_rejected() {
    let config = Config::builder().max_batch_records(0).build();
    assert!(matches!(Engine::open(config), Err(IndexError::Config(_))));

    let config = Config::builder()
        .journal_sync_strategy(JournalSyncStrategy::EveryNEntries { count: 0 })
        .build();
    assert!(matches!(Engine::open(config), Err(IndexError::Config(_))));

    let config = Config::builder().chunk_size(0).build();
    assert!(matches!(Engine::open(config), Err(IndexError::InvalidChunkSize(0))));
}

// =============================================================================
// Batch Tests
// =============================================================================

#[test]
fn test_batch_reads_its_own_writes() {
    let engine = Engine::in_memory().unwrap();
    let mut batch = engine.begin();
    KeywordIndex::initialize(&mut batch, "shoes").unwrap();
    KeywordIndex::insert(&mut batch, "shoes", 7).unwrap();

    assert!(KeywordIndex::contains(&batch, "shoes", 7).unwrap());
    assert!(engine.store().is_empty());
    assert_eq!(batch.touched(), 2);

    let info = engine.commit(batch).unwrap();
    assert_eq!(info.records, 2);
    assert!(KeywordIndex::contains(engine.store(), "shoes", 7).unwrap());
}

#[test]
fn test_dropped_batch_leaves_store_untouched() {
    let engine = Engine::in_memory().unwrap();
    {
        let mut batch = engine.begin();
        KeywordIndex::initialize(&mut batch, "shoes").unwrap();
    }
    assert!(engine.store().is_empty());
    assert!(KeywordIndex::root(engine.store(), "shoes").is_err());
}

#[test]
fn test_transact_rolls_back_on_error() {
    let engine = Engine::in_memory().unwrap();
    let result = engine.transact(|batch| {
        KeywordIndex::initialize(batch, "shoes")?;
        KeywordIndex::insert(batch, "shoes", 1)?;
        KeywordIndex::insert(batch, "shoes", 1)
    });

    assert!(matches!(result, Err(IndexError::DuplicateItemInIndex { item_id: 1 })));
    assert!(engine.store().is_empty());
}

#[test]
fn test_batch_too_large() {
    let config = Config::builder().max_batch_records(3).build();
    let engine = Engine::open(config).unwrap();

    let result = engine.transact(|batch| {
        KeywordIndex::initialize(batch, "a")?;
        KeywordIndex::initialize(batch, "b")
    });

    match result {
        Err(e @ IndexError::BatchTooLarge { touched: 4, max: 3 }) => {
            assert_eq!(e.kind(), ErrorKind::Capacity);
            assert!(!e.is_recoverable());
        }
        other => panic!("expected BatchTooLarge, got {:?}", other),
    }
    assert!(engine.store().is_empty());
}

#[test]
fn test_rewriting_a_key_does_not_count_twice() {
    let config = Config::builder().max_batch_records(2).build();
    let engine = Engine::open(config).unwrap();

    engine
        .transact(|batch| {
            KeywordIndex::initialize(batch, "shoes")?;
            for id in 0..50 {
                KeywordIndex::insert(batch, "shoes", id)?;
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(KeywordIndex::root(engine.store(), "shoes").unwrap().total_items, 50);
}

#[test]
fn test_commit_rejects_foreign_batch() {
    let first = Engine::in_memory().unwrap();
    let second = Engine::in_memory().unwrap();

    let batch = first.begin();
    assert!(matches!(second.commit(batch), Err(IndexError::Config(_))));
}

#[test]
fn test_empty_batch_commit() {
    let (_temp, engine) = setup_temp_engine();
    let info = engine.commit(engine.begin()).unwrap();
    assert_eq!(info.lsn, None);
    assert_eq!(info.records, 0);
}

// =============================================================================
// Durability Tests
// =============================================================================

#[test]
fn test_reopen_replays_committed_batches() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open(&temp_dir);
        let first = engine.commit({
            let mut batch = engine.begin();
            KeywordIndex::initialize(&mut batch, "shoes").unwrap();
            batch
        });
        assert_eq!(first.unwrap().lsn, Some(1));

        engine
            .transact(|batch| KeywordIndex::insert(batch, "shoes", 42))
            .unwrap();
        engine.close().unwrap();
    }

    let engine = open(&temp_dir);
    let report = engine.recovery_report().unwrap();
    assert_eq!(report.entries_recovered, 2);
    assert_eq!(report.last_lsn, 2);
    assert!(!report.was_truncated);
    assert!(KeywordIndex::contains(engine.store(), "shoes", 42).unwrap());

    // The sequence continues after the replayed batches
    let info = engine.commit({
        let mut batch = engine.begin();
        KeywordIndex::insert(&mut batch, "shoes", 43).unwrap();
        batch
    });
    assert_eq!(info.unwrap().lsn, Some(3));
}

#[test]
fn test_rolled_back_batch_not_journaled() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open(&temp_dir);
        let _ = engine.transact(|batch| {
            KeywordIndex::initialize(batch, "shoes")?;
            KeywordIndex::remove(batch, "shoes", 1)
        });
        engine.close().unwrap();
    }

    let engine = open(&temp_dir);
    assert_eq!(engine.recovery_report().unwrap().entries_recovered, 0);
    assert!(engine.store().is_empty());
}

#[test]
fn test_torn_tail_is_discarded() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = open(&temp_dir);
        engine
            .transact(|batch| {
                KeywordIndex::initialize(batch, "shoes")?;
                KeywordIndex::insert(batch, "shoes", 1)
            })
            .unwrap();
        engine.close().unwrap();
    }

    // Half a frame header
    let path = temp_dir.path().join("journal.log");
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0xAB; 10]).unwrap();
    file.sync_all().unwrap();
    drop(file);

    let engine = open(&temp_dir);
    let report = engine.recovery_report().unwrap();
    assert_eq!(report.entries_recovered, 1);
    assert_eq!(report.entries_corrupted, 1);
    assert!(report.was_truncated);
    assert!(KeywordIndex::contains(engine.store(), "shoes", 1).unwrap());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_batches_are_serialized() {
    let engine = Arc::new(Engine::in_memory().unwrap());
    engine
        .transact(|batch| KeywordIndex::initialize(batch, "shoes"))
        .unwrap();

    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..50u64 {
                    engine
                        .transact(|batch| KeywordIndex::insert(batch, "shoes", t * 1_000 + i))
                        .unwrap();
                }
            })
        })
        .collect();

    // Readers run alongside the writers
    for _ in 0..100 {
        let root = KeywordIndex::root(engine.store(), "shoes").unwrap();
        assert!(root.total_items <= 200);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let root = KeywordIndex::root(engine.store(), "shoes").unwrap();
    assert_eq!(root.total_items, 200);
    assert_eq!(root.total_shards, 2);
    for t in 0..4u64 {
        assert!(KeywordIndex::contains(engine.store(), "shoes", t * 1_000 + 49).unwrap());
    }
    assert!(engine.store().contains(&marketdex::key::keyword_shard_key("shoes", 1)));
}
