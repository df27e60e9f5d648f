//! Storage backend abstraction
//!
//! The engine that stores bytes is opaque to the request pipeline: it is a
//! named, durable key→value mapping with point reads and atomic batched
//! writes. The production backend is RocksDB, one instance per partition
//! directory; `MemStore` backs tests.
//!
//! ## Partition Model
//!
//! A store opened with `partitions > 1` hashes each key with a stable
//! 32-bit hash and routes by `hash % partitions`. Reads and writes of the
//! same key always land on the same partition. Writes to the same store are
//! serialized above this layer (the database write lock), so cross-partition
//! batches apply in a fixed order.

mod mem;
mod rocks;

pub use mem::MemStore;
pub use rocks::RocksStore;

use std::path::Path;

use crate::error::Result;

/// An opaque per-database byte key→byte value engine.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Start an atomic write batch against this store.
    fn begin_batch(&self) -> Box<dyn WriteBatch + '_>;
}

/// A pending atomic set of writes. Nothing is visible to readers until
/// `commit` returns.
pub trait WriteBatch {
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    fn commit(self: Box<Self>) -> Result<()>;
}

/// Route a key to its partition: low bits of a stable 32-bit hash.
pub fn partition_of(key: &[u8], partitions: u16) -> usize {
    (crc32fast::hash(key) % partitions as u32) as usize
}

/// Open (or create) a partitioned RocksDB store under `path`.
pub fn open_store(path: &Path, partitions: u16) -> Result<RocksStore> {
    RocksStore::open(path, partitions)
}
