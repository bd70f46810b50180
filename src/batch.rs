//! Batch Module
//!
//! All-or-nothing unit of work over the record store.
//!
//! ## Responsibilities
//! - Layer planned mutations over the committed image (reads see them)
//! - Bound the number of distinct records one batch may touch
//! - Hand the planned mutations to the engine on commit
//!
//! A batch that is dropped without being committed leaves the store exactly
//! as it was. Once any operation on a batch returns an error the batch must
//! be discarded; `Engine::transact` does this automatically.

use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::MutexGuard;
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::key::Key;
use crate::record::Record;
use crate::store::{Mutation, RecordSource, RecordStore};

/// Planned mutations plus the exclusive write permit of the engine
pub struct Batch<'a> {
    /// Committed image reads fall through to
    store: &'a RecordStore,

    /// Planned state per touched key (`None` = delete)
    writes: BTreeMap<Key, Option<Bytes>>,

    /// Max distinct keys this batch may touch
    max_records: usize,

    /// Serializes batches: held until commit or drop
    permit: MutexGuard<'a, ()>,
}

impl<'a> Batch<'a> {
    pub(crate) fn new(store: &'a RecordStore, permit: MutexGuard<'a, ()>, max_records: usize) -> Self {
        Self {
            store,
            writes: BTreeMap::new(),
            max_records,
            permit,
        }
    }

    /// Stage a record write
    pub fn save<R: Record>(&mut self, key: &Key, record: &R) -> Result<()> {
        let bytes = record.to_bytes()?;
        self.stage(key, Some(bytes))?;
        debug!(record = R::NAME, key = %key.short(), "staged put");
        Ok(())
    }

    /// Stage a record deletion
    pub fn delete(&mut self, key: &Key) -> Result<()> {
        self.stage(key, None)?;
        debug!(key = %key.short(), "staged delete");
        Ok(())
    }

    /// Distinct records touched so far
    pub fn touched(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Record limit this batch was opened with
    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Whether this batch reads through `store`
    pub(crate) fn belongs_to(&self, store: &RecordStore) -> bool {
        std::ptr::eq(self.store, store)
    }

    /// Split into the mutation list (key order) and the still-held permit
    pub(crate) fn into_parts(self) -> (Vec<Mutation>, MutexGuard<'a, ()>) {
        let mutations = self
            .writes
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => Mutation::Put { key, value },
                None => Mutation::Delete { key },
            })
            .collect();
        (mutations, self.permit)
    }

    fn stage(&mut self, key: &Key, value: Option<Bytes>) -> Result<()> {
        if !self.writes.contains_key(key) && self.writes.len() >= self.max_records {
            return Err(IndexError::BatchTooLarge {
                touched: self.writes.len() + 1,
                max: self.max_records,
            });
        }
        self.writes.insert(*key, value);
        Ok(())
    }
}

impl RecordSource for Batch<'_> {
    fn fetch(&self, key: &Key) -> Option<Bytes> {
        match self.writes.get(key) {
            Some(planned) => planned.clone(),
            None => self.store.fetch(key),
        }
    }
}
