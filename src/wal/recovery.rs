//! WAL recovery
//!
//! Replays the tail of the log past the meta LSN into the engines, then
//! advances meta. Replay is idempotent: entries are blind overwrites, so
//! re-applying one that already reached the engine changes nothing.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use crate::error::{KvdbError, Result};
use crate::store::KvStore;

use super::writer::{read_meta, write_meta};
use super::WalReader;

/// What recovery found and did.
#[derive(Debug)]
pub struct RecoveryReport {
    /// Highest LSN in the log after recovery; the next append gets
    /// `last_lsn + 1`
    pub last_lsn: u64,

    /// Entries re-applied to engines (`lsn > meta`)
    pub replayed: u64,

    /// Entries skipped as already covered by meta
    pub skipped: u64,

    /// Whether a corrupt tail was cut off
    pub truncated: bool,
}

/// Recover the log under `dir` into the given stores.
///
/// An entry naming a database that is not in `stores` is fatal: silently
/// dropping acknowledged writes would be worse than refusing to start.
pub fn recover(dir: &Path, stores: &HashMap<String, Arc<dyn KvStore>>) -> Result<RecoveryReport> {
    let meta = read_meta(dir)?.unwrap_or(0);

    let mut reader = WalReader::open(dir)?;
    let mut report = RecoveryReport { last_lsn: meta, replayed: 0, skipped: 0, truncated: false };
    let mut previous_lsn = None;

    while let Some(entry) = reader.next_entry()? {
        if let Some(previous) = previous_lsn {
            if entry.lsn <= previous {
                return Err(KvdbError::WalCorruption(format!(
                    "LSN went backwards: {} after {}",
                    entry.lsn, previous
                )));
            }
        }
        previous_lsn = Some(entry.lsn);

        if entry.lsn <= meta {
            report.skipped += 1;
            continue;
        }

        let store = stores.get(&entry.db).ok_or_else(|| {
            KvdbError::WalCorruption(format!(
                "entry {} targets unknown database {:?}",
                entry.lsn, entry.db
            ))
        })?;

        let mut batch = store.begin_batch();
        for op in entry.ops {
            batch.set(op.key, op.value);
        }
        batch.commit()?;

        report.replayed += 1;
        report.last_lsn = entry.lsn;
    }

    if let Some(corruption) = reader.corruption().cloned() {
        tracing::warn!(
            segment = corruption.segment_index,
            offset = corruption.offset,
            reason = %corruption.reason,
            "truncating WAL at corrupt record"
        );
        truncate_segment(&corruption.segment_path, corruption.offset)?;
        for stale in reader.remaining_segments() {
            fs::remove_file(&stale)?;
        }
        report.truncated = true;
    }

    if report.replayed > 0 {
        write_meta(dir, report.last_lsn)?;
    }

    if report.replayed > 0 || report.truncated {
        tracing::info!(
            replayed = report.replayed,
            skipped = report.skipped,
            last_lsn = report.last_lsn,
            truncated = report.truncated,
            "WAL recovery complete"
        );
    }
    Ok(report)
}

fn truncate_segment(path: &Path, offset: u64) -> Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(offset)?;
    file.sync_all()?;
    Ok(())
}
