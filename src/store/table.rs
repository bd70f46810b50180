//! Record table
//!
//! BTreeMap-based committed record image with RwLock for concurrency.

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::RwLock;

use super::{Mutation, RecordSource};
use crate::key::Key;

/// Committed records, keyed by derived address
#[derive(Default)]
pub struct RecordStore {
    records: RwLock<BTreeMap<Key, Bytes>>,
}

impl RecordStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every mutation of a batch under one write lock
    pub fn apply<'a>(&self, mutations: impl IntoIterator<Item = &'a Mutation>) {
        let mut records = self.records.write();
        for mutation in mutations {
            match mutation {
                Mutation::Put { key, value } => {
                    records.insert(*key, value.clone());
                }
                Mutation::Delete { key } => {
                    records.remove(key);
                }
            }
        }
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Total encoded bytes held
    pub fn size(&self) -> usize {
        self.records.read().values().map(Bytes::len).sum()
    }

    /// Snapshot of every key currently stored
    pub fn keys(&self) -> Vec<Key> {
        self.records.read().keys().copied().collect()
    }
}

impl RecordSource for RecordStore {
    fn fetch(&self, key: &Key) -> Option<Bytes> {
        self.records.read().get(key).cloned()
    }
}
