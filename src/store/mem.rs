//! In-memory storage backend
//!
//! A lock-guarded map with the same atomic-batch surface as the RocksDB
//! backend. Not durable; used by tests and available as a scratch backend.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::Result;

use super::{KvStore, WriteBatch};

#[derive(Default)]
pub struct MemStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn begin_batch(&self) -> Box<dyn WriteBatch + '_> {
        Box::new(MemBatch { store: self, pending: Vec::new() })
    }
}

struct MemBatch<'a> {
    store: &'a MemStore,
    pending: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteBatch for MemBatch<'_> {
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.pending.push((key, value));
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let MemBatch { store, pending } = *self;
        let mut data = store.data.write();
        for (key, value) in pending {
            data.insert(key, value);
        }
        Ok(())
    }
}
