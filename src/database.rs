//! Database instance
//!
//! Pairs a store with the write lock that serializes its durable writes.
//! The critical section is fixed: WAL append → engine commit → meta
//! update. WAL order and engine-visible order therefore match per
//! database, and the meta LSN never covers an entry the engine missed.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::exit_code;
use crate::store::KvStore;
use crate::wal::{Wal, WalKv};

pub struct Database {
    name: String,
    store: Arc<dyn KvStore>,
    wal: Arc<Wal>,
    write_lock: Mutex<()>,
}

impl Database {
    pub fn new(name: impl Into<String>, store: Arc<dyn KvStore>, wal: Arc<Wal>) -> Self {
        Self { name: name.into(), store, wal, write_lock: Mutex::new(()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Point read. Takes no lock: readers see whichever committed write
    /// exists when the engine serves them.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.store.get(key)
    }

    /// Apply one batch durably. A failure after the WAL append is fatal to
    /// the process: durability can no longer be confirmed, and restarting
    /// replays the appended entry from the log.
    pub fn write_durable(&self, kvs: Vec<WalKv>) -> Result<()> {
        if kvs.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock();

        let lsn = self.wal.append(&self.name, &kvs)?;

        let mut batch = self.store.begin_batch();
        for kv in kvs {
            batch.set(kv.key, kv.value);
        }
        if let Err(e) = batch.commit() {
            tracing::error!(
                db = %self.name,
                lsn,
                error = %e,
                "engine commit failed after WAL append, aborting so recovery can replay"
            );
            std::process::exit(exit_code::WAL);
        }

        if let Err(e) = self.wal.update_meta(lsn) {
            tracing::error!(
                db = %self.name,
                lsn,
                error = %e,
                "meta update failed after engine commit, aborting so recovery can replay"
            );
            std::process::exit(exit_code::WAL);
        }

        Ok(())
    }
}
