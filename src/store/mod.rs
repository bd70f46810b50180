//! Store Module
//!
//! Key-addressed record storage.
//!
//! ## Responsibilities
//! - Hold the committed image of every record
//! - Serve concurrent readers while a batch commits
//! - Apply a committed batch as one indivisible step
//!
//! ## Data Structure Choice
//! `BTreeMap<Key, Bytes>` wrapped in a `parking_lot::RwLock`:
//! - Readers never observe half of a batch (the whole batch applies under
//!   one write lock)
//! - `Bytes` makes handing a record to a reader a refcount bump

mod table;

pub use table::RecordStore;

use bytes::Bytes;

use crate::error::Result;
use crate::key::Key;
use crate::record::Record;

/// Anything records can be read from: the committed store, or a batch
/// layering its planned mutations over it.
pub trait RecordSource {
    /// Raw encoded record at `key`
    fn fetch(&self, key: &Key) -> Option<Bytes>;

    fn contains(&self, key: &Key) -> bool {
        self.fetch(key).is_some()
    }

    /// Decode the record at `key`, if any
    fn load<R: Record>(&self, key: &Key) -> Result<Option<R>>
    where
        Self: Sized,
    {
        self.fetch(key).map(|bytes| R::from_bytes(&bytes)).transpose()
    }
}

/// A single planned change to one record
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Put { key: Key, value: Bytes },
    Delete { key: Key },
}

impl Mutation {
    pub fn key(&self) -> &Key {
        match self {
            Mutation::Put { key, .. } | Mutation::Delete { key } => key,
        }
    }
}
