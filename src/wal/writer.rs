//! WAL writer
//!
//! Appends are serialized behind a mutex; the LSN counter and the append
//! position advance together. Every append fsyncs before returning: a
//! returned LSN is on disk. Meta updates go through a temp file + rename +
//! parent fsync so a torn write cannot produce a half-updated meta.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{KvdbError, Result};

use super::{WalEntry, WalKv};

/// Segment roll threshold (64 MiB). A single oversized record still lands
/// in one segment; the roll happens before the next append.
pub const DEFAULT_SEGMENT_BYTES: u64 = 64 * 1024 * 1024;

const META_FILE: &str = "wal.meta";
const META_TMP_FILE: &str = "wal.meta.tmp";

/// The append side of the log.
pub struct Wal {
    dir: PathBuf,
    segment_limit: u64,
    inner: Mutex<WalInner>,
    /// Last LSN durably recorded in `wal.meta`
    meta: Mutex<u64>,
}

struct WalInner {
    file: File,
    segment_index: u32,
    segment_bytes: u64,
    next_lsn: u64,
}

impl Wal {
    /// Open the log for appending after recovery has established `next_lsn`.
    /// Appends continue in the last existing segment.
    pub fn open_append(dir: &Path, next_lsn: u64) -> Result<Self> {
        Self::open_append_with_limit(dir, next_lsn, DEFAULT_SEGMENT_BYTES)
    }

    pub fn open_append_with_limit(dir: &Path, next_lsn: u64, segment_limit: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let (segment_index, path) = match list_segments(dir)?.into_iter().last() {
            Some((index, path)) => (index, path),
            None => (0, dir.join(segment_file_name(0))),
        };
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let segment_bytes = file.metadata()?.len();

        let meta = read_meta(dir)?.unwrap_or(0);

        Ok(Self {
            dir: dir.to_path_buf(),
            segment_limit,
            inner: Mutex::new(WalInner { file, segment_index, segment_bytes, next_lsn }),
            meta: Mutex::new(meta),
        })
    }

    /// Append one entry, assign its LSN, fsync, return the LSN.
    pub fn append(&self, db: &str, ops: &[WalKv]) -> Result<u64> {
        let mut inner = self.inner.lock();

        let lsn = inner.next_lsn;
        let entry = WalEntry::new(lsn, db, ops.to_vec());
        let record = entry.encode_record()?;

        if inner.segment_bytes > 0 && inner.segment_bytes + record.len() as u64 > self.segment_limit
        {
            self.roll_segment(&mut inner)?;
        }

        inner.file.write_all(&record)?;
        inner.file.sync_data()?;
        inner.segment_bytes += record.len() as u64;
        inner.next_lsn += 1;
        Ok(lsn)
    }

    /// Advance the durable meta LSN. Lower values are ignored: with one log
    /// shared by all databases, a later batch may commit its meta first.
    pub fn update_meta(&self, lsn: u64) -> Result<()> {
        let mut current = self.meta.lock();
        if lsn <= *current {
            return Ok(());
        }
        write_meta(&self.dir, lsn)?;
        *current = lsn;
        Ok(())
    }

    /// Last LSN covered by `wal.meta`
    pub fn meta_lsn(&self) -> u64 {
        *self.meta.lock()
    }

    /// The LSN the next append will receive
    pub fn next_lsn(&self) -> u64 {
        self.inner.lock().next_lsn
    }

    fn roll_segment(&self, inner: &mut WalInner) -> Result<()> {
        let next_index = inner.segment_index + 1;
        let path = self.dir.join(segment_file_name(next_index));
        let file = OpenOptions::new().create_new(true).append(true).open(&path)?;
        tracing::debug!(segment = next_index, "rolled WAL segment");

        inner.file = file;
        inner.segment_index = next_index;
        inner.segment_bytes = 0;
        Ok(())
    }
}

// =============================================================================
// Segment naming
// =============================================================================

pub(super) fn segment_file_name(index: u32) -> String {
    format!("wal.{:03}", index)
}

/// Segment files in the directory, sorted by index.
pub(super) fn list_segments(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut segments = Vec::new();
    if !dir.exists() {
        return Ok(segments);
    }
    for dirent in fs::read_dir(dir)? {
        let dirent = dirent?;
        let name = dirent.file_name();
        let name = name.to_string_lossy();
        if let Some(suffix) = name.strip_prefix("wal.") {
            if let Ok(index) = suffix.parse::<u32>() {
                segments.push((index, dirent.path()));
            }
        }
    }
    segments.sort_by_key(|(index, _)| *index);
    Ok(segments)
}

// =============================================================================
// Meta file
// =============================================================================

/// Read `wal.meta`: `lsn u64 BE | crc u32 BE`. `None` if the file does not
/// exist; a checksum failure is corruption, not a fresh log.
pub fn read_meta(dir: &Path) -> Result<Option<u64>> {
    let path = dir.join(META_FILE);
    let mut file = match File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut buf = [0u8; 12];
    file.read_exact(&mut buf)
        .map_err(|e| KvdbError::WalCorruption(format!("short wal.meta: {}", e)))?;

    let lsn = u64::from_be_bytes(buf[0..8].try_into().unwrap());
    let crc = u32::from_be_bytes(buf[8..12].try_into().unwrap());
    if crc != crc32fast::hash(&buf[0..8]) {
        return Err(KvdbError::WalCorruption("wal.meta checksum mismatch".to_string()));
    }
    Ok(Some(lsn))
}

/// Atomically rewrite `wal.meta`: write-to-temp, fsync, rename, fsync the
/// parent directory.
pub(super) fn write_meta(dir: &Path, lsn: u64) -> Result<()> {
    let tmp_path = dir.join(META_TMP_FILE);
    let mut buf = [0u8; 12];
    buf[0..8].copy_from_slice(&lsn.to_be_bytes());
    let crc = crc32fast::hash(&buf[0..8]);
    buf[8..12].copy_from_slice(&crc.to_be_bytes());

    let mut tmp = File::create(&tmp_path)?;
    tmp.write_all(&buf)?;
    tmp.sync_all()?;
    drop(tmp);

    fs::rename(&tmp_path, dir.join(META_FILE))?;
    File::open(dir)?.sync_all()?;
    Ok(())
}
