//! Tests for the Sales Range Tree
//!
//! These tests verify:
//! - Uniform bucket computation
//! - The per-node top performers cache (ordering, eviction, refill)
//! - Moving items between nodes when their sales count changes
//! - Top-N reads across nodes
//! - Capacity and splitting

use marketdex::range::{MetricRange, SalesIndex, SALES_BUCKET_WIDTH, SALES_NODE_CAPACITY, TOP_PERFORMERS_CAPACITY};
use marketdex::{Engine, IndexError};
use proptest::prelude::*;

// =============================================================================
// Helper Functions
// =============================================================================

fn range(start: u32, end: u32) -> MetricRange<u32> {
    MetricRange::new(start, end).unwrap()
}

fn index(engine: &Engine, item_id: u64, sales: u32) {
    engine
        .transact(|batch| {
            let bucket = SalesIndex::bucket(sales)?;
            if SalesIndex::try_node(batch, &bucket)?.is_none() {
                SalesIndex::initialize_node(batch, bucket)?;
            }
            SalesIndex::insert(batch, &bucket, item_id, sales)
        })
        .unwrap();
}

fn top_ids(engine: &Engine, limit: usize) -> Vec<u64> {
    SalesIndex::top(engine.store(), limit)
        .unwrap()
        .iter()
        .map(|e| e.item_id)
        .collect()
}

// =============================================================================
// Bucket Tests
// =============================================================================

#[test]
fn test_bucket_boundaries() {
    assert_eq!(SalesIndex::bucket(0).unwrap(), range(0, 1000));
    assert_eq!(SalesIndex::bucket(999).unwrap(), range(0, 1000));
    assert_eq!(SalesIndex::bucket(1000).unwrap(), range(1000, 2000));
    assert_eq!(SalesIndex::bucket(1500).unwrap(), range(1000, 2000));
}

#[test]
fn test_bucket_top_of_domain() {
    assert_eq!(
        SalesIndex::bucket(u32::MAX - 1).unwrap(),
        range(4_294_967_000, u32::MAX)
    );
    assert!(matches!(SalesIndex::bucket(u32::MAX), Err(IndexError::InvalidRange { .. })));
}

// =============================================================================
// Top Performers Cache Tests
// =============================================================================

#[test]
fn test_top_cache_keeps_highest() {
    let engine = Engine::in_memory().unwrap();
    for i in 1..=15u64 {
        index(&engine, i, (i * 10) as u32);
    }

    let node = SalesIndex::node(engine.store(), &range(0, 1000)).unwrap();
    assert_eq!(node.len(), 15);
    assert_eq!(node.top.len(), TOP_PERFORMERS_CAPACITY);

    let metrics: Vec<u32> = node.top.iter().map(|e| e.metric).collect();
    assert_eq!(metrics, vec![150, 140, 130, 120, 110, 100, 90, 80, 70, 60]);
}

#[test]
fn test_top_cache_refills_after_remove() {
    let engine = Engine::in_memory().unwrap();
    for i in 1..=15u64 {
        index(&engine, i, (i * 10) as u32);
    }

    engine
        .transact(|batch| SalesIndex::remove(batch, &range(0, 1000), 15))
        .unwrap();

    let node = SalesIndex::node(engine.store(), &range(0, 1000)).unwrap();
    let metrics: Vec<u32> = node.top.iter().map(|e| e.metric).collect();
    assert_eq!(metrics, vec![140, 130, 120, 110, 100, 90, 80, 70, 60, 50]);
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_update_crossing_bucket_moves_item() {
    let engine = Engine::in_memory().unwrap();
    index(&engine, 1, 999);

    let update = engine
        .transact(|batch| SalesIndex::update_metric(batch, 1, 999, 1500))
        .unwrap();
    assert!(update.moved);
    assert_eq!(update.from, range(0, 1000));
    assert_eq!(update.to, range(1000, 2000));

    assert!(SalesIndex::node(engine.store(), &range(0, 1000)).unwrap().is_empty());
    let node = SalesIndex::node(engine.store(), &range(1000, 2000)).unwrap();
    assert_eq!(node.item_ids(), vec![1]);
    assert_eq!(node.top[0].metric, 1500);
    SalesIndex::check(engine.store()).unwrap();
}

#[test]
fn test_update_within_bucket_reorders_cache() {
    let engine = Engine::in_memory().unwrap();
    index(&engine, 1, 10);
    index(&engine, 2, 500);
    index(&engine, 3, 999);

    let update = engine
        .transact(|batch| SalesIndex::update_metric(batch, 1, 10, 800))
        .unwrap();
    assert!(!update.moved);
    assert_eq!(update.from, update.to);

    let node = SalesIndex::node(engine.store(), &range(0, 1000)).unwrap();
    let order: Vec<u64> = node.top.iter().map(|e| e.item_id).collect();
    assert_eq!(order, vec![3, 1, 2]);
}

#[test]
fn test_update_unknown_item_fails() {
    let engine = Engine::in_memory().unwrap();
    index(&engine, 1, 10);

    let result = engine.transact(|batch| SalesIndex::update_metric(batch, 2, 10, 20));
    assert!(matches!(result, Err(IndexError::ItemNotInIndex { item_id: 2 })));
}

#[test]
fn test_update_missing_bucket_fails() {
    let engine = Engine::in_memory().unwrap();
    index(&engine, 1, 10);

    let result = engine.transact(|batch| SalesIndex::update_metric(batch, 1, 5_000, 10));
    assert!(matches!(
        result,
        Err(IndexError::RangeIndexNotFound { start: 5_000, end: 6_000 })
    ));
}

// =============================================================================
// Top-N Tests
// =============================================================================

#[test]
fn test_top_across_nodes() {
    let engine = Engine::in_memory().unwrap();
    index(&engine, 1, 10);
    index(&engine, 2, 500);
    index(&engine, 3, 999);
    index(&engine, 4, 1500);
    index(&engine, 5, 1000);
    index(&engine, 6, 3500);

    assert_eq!(top_ids(&engine, 4), vec![6, 4, 5, 3]);
    assert_eq!(top_ids(&engine, 100), vec![6, 4, 5, 3, 2, 1]);
    assert!(top_ids(&engine, 0).is_empty());
}

#[test]
fn test_top_beyond_cache_scans_entries() {
    let engine = Engine::in_memory().unwrap();
    for i in 1..=20u64 {
        index(&engine, i, i as u32);
    }

    let top = SalesIndex::top(engine.store(), 15).unwrap();
    let metrics: Vec<u32> = top.iter().map(|e| e.metric).collect();
    assert_eq!(metrics, (6..=20).rev().collect::<Vec<u32>>());
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn test_full_node_then_split() {
    let engine = Engine::in_memory().unwrap();
    let bucket = range(0, SALES_BUCKET_WIDTH);
    engine
        .transact(|batch| {
            SalesIndex::initialize_node(batch, bucket)?;
            for i in 0..SALES_NODE_CAPACITY as u64 {
                SalesIndex::insert(batch, &bucket, i + 1, (i * 2) as u32)?;
            }
            Ok(())
        })
        .unwrap();

    let result = engine.transact(|batch| SalesIndex::insert(batch, &bucket, 9_999, 1));
    assert!(matches!(result, Err(IndexError::RangeNodeFull { start: 0, end: 1000 })));

    let (lower, upper) = engine
        .transact(|batch| SalesIndex::split(batch, &bucket))
        .unwrap();
    assert_eq!(lower, bucket);
    assert_eq!(upper, range(500, 1000));

    let low = SalesIndex::node(engine.store(), &lower).unwrap();
    let high = SalesIndex::node(engine.store(), &upper).unwrap();
    assert_eq!(low.range, range(0, 500));
    assert_eq!(low.len(), 250);
    assert_eq!(high.len(), 250);
    assert_eq!(high.top[0].metric, 998);
    assert_eq!(low.top[0].metric, 498);

    engine
        .transact(|batch| SalesIndex::insert(batch, &bucket, 9_999, 1))
        .unwrap();
    let stats = SalesIndex::check(engine.store()).unwrap();
    assert_eq!(stats.nodes, 2);
    assert_eq!(stats.items, SALES_NODE_CAPACITY as u64 + 1);
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn prop_sales_bucket_is_uniform(sales in 0u32..u32::MAX) {
        let bucket = SalesIndex::bucket(sales).unwrap();
        prop_assert!(bucket.contains(sales));
        prop_assert_eq!(bucket.start % SALES_BUCKET_WIDTH, 0);
        prop_assert!(bucket.end - bucket.start <= SALES_BUCKET_WIDTH);
    }

    #[test]
    fn prop_top_is_sorted_descending(sales in prop::collection::vec(0u32..5_000, 1..60)) {
        let engine = Engine::in_memory().unwrap();
        for (i, &s) in sales.iter().enumerate() {
            index(&engine, i as u64 + 1, s);
        }

        let top = SalesIndex::top(engine.store(), sales.len()).unwrap();
        prop_assert_eq!(top.len(), sales.len());
        prop_assert!(top.windows(2).all(|w| w[0].metric >= w[1].metric));

        let mut expected = sales.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        let got: Vec<u32> = top.iter().map(|e| e.metric).collect();
        prop_assert_eq!(got, expected);
    }
}
