//! RocksDB storage backend
//!
//! One RocksDB instance per partition, laid out as
//! `<db-dir>/partition-<i>/`. A write batch groups its ops per partition
//! and commits each partition's batch with a synced write, so everything a
//! committed batch wrote is on disk before the WAL meta advances past it.

use std::path::Path;

use rocksdb::{Options, WriteOptions, DB};

use crate::error::Result;

use super::{partition_of, KvStore, WriteBatch};

pub struct RocksStore {
    partitions: Vec<DB>,
}

impl RocksStore {
    /// Open or create the store. `partitions` is fixed at creation; opening
    /// with a different count than on disk would mis-route keys, so the
    /// count is part of the database's persisted configuration.
    pub fn open(path: &Path, partitions: u16) -> Result<Self> {
        assert!(partitions >= 1, "a store has at least one partition");
        std::fs::create_dir_all(path)
            .map_err(|e| crate::error::KvdbError::Engine(format!(
                "cannot create {}: {}",
                path.display(),
                e
            )))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);

        let mut dbs = Vec::with_capacity(partitions as usize);
        for i in 0..partitions {
            let dir = path.join(format!("partition-{}", i));
            dbs.push(DB::open(&opts, dir)?);
        }
        Ok(Self { partitions: dbs })
    }

    pub fn partition_count(&self) -> u16 {
        self.partitions.len() as u16
    }

    fn partition(&self, key: &[u8]) -> &DB {
        &self.partitions[partition_of(key, self.partitions.len() as u16)]
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.partition(key).get(key)?)
    }

    fn begin_batch(&self) -> Box<dyn WriteBatch + '_> {
        Box::new(RocksBatch {
            store: self,
            batches: (0..self.partitions.len())
                .map(|_| rocksdb::WriteBatch::default())
                .collect(),
        })
    }
}

struct RocksBatch<'a> {
    store: &'a RocksStore,
    batches: Vec<rocksdb::WriteBatch>,
}

impl WriteBatch for RocksBatch<'_> {
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let i = partition_of(&key, self.store.partitions.len() as u16);
        self.batches[i].put(key, value);
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let RocksBatch { store, batches } = *self;
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        for (db, batch) in store.partitions.iter().zip(batches) {
            if !batch.is_empty() {
                db.write_opt(batch, &write_opts)?;
            }
        }
        Ok(())
    }
}
