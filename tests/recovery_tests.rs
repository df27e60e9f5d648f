//! Recovery tests: replay past meta, idempotence, corruption truncation,
//! unknown-database entries.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use kvdb::store::{KvStore, MemStore};
use kvdb::wal::{read_meta, recover, Wal, WalKv};
use tempfile::TempDir;

fn kv(k: &[u8], v: &[u8]) -> WalKv {
    WalKv::new(k.to_vec(), v.to_vec())
}

fn store_map(names: &[&str]) -> HashMap<String, Arc<dyn KvStore>> {
    names
        .iter()
        .map(|name| {
            let store: Arc<dyn KvStore> = Arc::new(MemStore::new());
            (name.to_string(), store)
        })
        .collect()
}

fn get(stores: &HashMap<String, Arc<dyn KvStore>>, db: &str, key: &[u8]) -> Option<Vec<u8>> {
    stores[db].get(key).unwrap()
}

// =============================================================================
// Replay
// =============================================================================

#[test]
fn empty_dir_recovers_to_zero() {
    let dir = TempDir::new().unwrap();
    let stores = store_map(&["t"]);
    let report = recover(dir.path(), &stores).unwrap();
    assert_eq!(report.last_lsn, 0);
    assert_eq!(report.replayed, 0);
    assert!(!report.truncated);
}

#[test]
fn tail_past_meta_is_reapplied() {
    let dir = TempDir::new().unwrap();
    let stores = store_map(&["t"]);

    // Two entries durable in the log; only the first made it into meta:
    // the crash hit between WAL fsync and engine commit of the second.
    {
        let wal = Wal::open_append(dir.path(), 1).unwrap();
        wal.append("t", &[kv(b"x", b"1")]).unwrap();
        wal.append("t", &[kv(b"y", b"2"), kv(b"z", b"3")]).unwrap();
        wal.update_meta(1).unwrap();
    }
    // Simulate the engine state at meta: entry 1 applied, entry 2 lost.
    {
        let mut batch = stores["t"].begin_batch();
        batch.set(b"x".to_vec(), b"1".to_vec());
        batch.commit().unwrap();
    }

    let report = recover(dir.path(), &stores).unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.replayed, 1);
    assert_eq!(report.last_lsn, 2);

    assert_eq!(get(&stores, "t", b"x"), Some(b"1".to_vec()));
    assert_eq!(get(&stores, "t", b"y"), Some(b"2".to_vec()));
    assert_eq!(get(&stores, "t", b"z"), Some(b"3".to_vec()));
    assert_eq!(read_meta(dir.path()).unwrap(), Some(2));
}

#[test]
fn recovery_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let stores = store_map(&["t"]);
    {
        let wal = Wal::open_append(dir.path(), 1).unwrap();
        wal.append("t", &[kv(b"a", b"1")]).unwrap();
        wal.append("t", &[kv(b"a", b"2")]).unwrap();
    }

    let first = recover(dir.path(), &stores).unwrap();
    assert_eq!(first.replayed, 2);
    assert_eq!(get(&stores, "t", b"a"), Some(b"2".to_vec()));

    // Everything is now covered by meta; a second pass changes nothing.
    let second = recover(dir.path(), &stores).unwrap();
    assert_eq!(second.replayed, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.last_lsn, first.last_lsn);
    assert_eq!(get(&stores, "t", b"a"), Some(b"2".to_vec()));
}

#[test]
fn entries_route_to_their_database() {
    let dir = TempDir::new().unwrap();
    let stores = store_map(&["a", "b"]);
    {
        let wal = Wal::open_append(dir.path(), 1).unwrap();
        wal.append("a", &[kv(b"k", b"from-a")]).unwrap();
        wal.append("b", &[kv(b"k", b"from-b")]).unwrap();
    }

    recover(dir.path(), &stores).unwrap();
    assert_eq!(get(&stores, "a", b"k"), Some(b"from-a".to_vec()));
    assert_eq!(get(&stores, "b", b"k"), Some(b"from-b".to_vec()));
}

#[test]
fn unknown_database_is_fatal() {
    let dir = TempDir::new().unwrap();
    {
        let wal = Wal::open_append(dir.path(), 1).unwrap();
        wal.append("gone", &[kv(b"k", b"v")]).unwrap();
    }
    let stores = store_map(&["t"]);
    assert!(recover(dir.path(), &stores).is_err());
}

// =============================================================================
// Corruption cutoff
// =============================================================================

#[test]
fn corrupt_record_truncates_and_later_segments_are_discarded() {
    let dir = TempDir::new().unwrap();
    let stores = store_map(&["t"]);
    {
        let wal = Wal::open_append_with_limit(dir.path(), 1, 64).unwrap();
        wal.append("t", &[kv(b"a", &vec![1u8; 100])]).unwrap();
        wal.append("t", &[kv(b"b", &vec![2u8; 100])]).unwrap();
        wal.append("t", &[kv(b"c", &vec![3u8; 100])]).unwrap();
    }

    // Damage the second segment; the third becomes a hole and must go.
    let victim = dir.path().join("wal.001");
    let mut bytes = fs::read(&victim).unwrap();
    bytes[20] ^= 0xFF;
    fs::write(&victim, &bytes).unwrap();

    let report = recover(dir.path(), &stores).unwrap();
    assert_eq!(report.replayed, 1);
    assert!(report.truncated);
    assert_eq!(report.last_lsn, 1);

    assert_eq!(get(&stores, "t", b"a"), Some(vec![1u8; 100]));
    assert_eq!(get(&stores, "t", b"b"), None);
    assert_eq!(get(&stores, "t", b"c"), None);

    // The damaged segment is now empty and the later one is gone.
    assert_eq!(fs::metadata(&victim).unwrap().len(), 0);
    assert!(!dir.path().join("wal.002").exists());

    // The log keeps working from the cutoff.
    let wal = Wal::open_append(dir.path(), report.last_lsn + 1).unwrap();
    assert_eq!(wal.append("t", &[kv(b"d", b"4")]).unwrap(), 2);
}
