//! WAL reader
//!
//! Streams records across segment files in index order. Reading stops at
//! the first record that is cut short or fails its checksum; the reader
//! remembers where, so recovery can truncate the log there.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::writer::list_segments;
use super::WalEntry;

/// Where a damaged record starts.
#[derive(Debug, Clone)]
pub struct CorruptionPoint {
    pub segment_index: u32,
    pub segment_path: PathBuf,
    /// Byte offset of the first bad record within the segment
    pub offset: u64,
    pub reason: String,
}

pub struct WalReader {
    segments: std::vec::IntoIter<(u32, PathBuf)>,
    current: Option<OpenSegment>,
    corruption: Option<CorruptionPoint>,
}

struct OpenSegment {
    index: u32,
    path: PathBuf,
    reader: BufReader<File>,
    len: u64,
    offset: u64,
}

impl WalReader {
    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self {
            segments: list_segments(dir)?.into_iter(),
            current: None,
            corruption: None,
        })
    }

    /// Set once the scan has hit a bad record; entries before it were all
    /// returned normally.
    pub fn corruption(&self) -> Option<&CorruptionPoint> {
        self.corruption.as_ref()
    }

    /// Segments with an index greater than the currently open one. After a
    /// corruption stop these are the holes to discard.
    pub fn remaining_segments(self) -> Vec<PathBuf> {
        self.segments.map(|(_, path)| path).collect()
    }

    /// Next entry, or `None` at end of log. The end may be clean or
    /// corrupt; check `corruption()` to tell which.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        if self.corruption.is_some() {
            return Ok(None);
        }

        loop {
            if self.current.is_none() {
                match self.segments.next() {
                    Some((index, path)) => {
                        let file = File::open(&path)?;
                        let len = file.metadata()?.len();
                        self.current = Some(OpenSegment {
                            index,
                            path,
                            reader: BufReader::new(file),
                            len,
                            offset: 0,
                        });
                    }
                    None => return Ok(None),
                }
            }

            let segment = self.current.as_mut().unwrap();
            if segment.offset == segment.len {
                self.current = None;
                continue;
            }

            match read_record(segment) {
                Ok(entry) => return Ok(Some(entry)),
                Err(reason) => {
                    let segment = self.current.take().unwrap();
                    self.corruption = Some(CorruptionPoint {
                        segment_index: segment.index,
                        segment_path: segment.path,
                        offset: segment.offset,
                        reason,
                    });
                    return Ok(None);
                }
            }
        }
    }
}

/// Read one record at the segment's current offset. Any shortfall or
/// checksum failure is reported as a corruption reason, not an I/O error:
/// a torn tail is an expected crash artifact.
fn read_record(segment: &mut OpenSegment) -> std::result::Result<WalEntry, String> {
    let remaining = segment.len - segment.offset;

    let mut header = [0u8; 8];
    if remaining < header.len() as u64 {
        return Err(format!("partial record header ({} bytes)", remaining));
    }
    segment
        .reader
        .read_exact(&mut header)
        .map_err(|e| format!("record header unreadable: {}", e))?;

    let payload_len = u32::from_be_bytes(header[0..4].try_into().unwrap()) as u64;
    let crc = u32::from_be_bytes(header[4..8].try_into().unwrap());

    if remaining - (header.len() as u64) < payload_len {
        return Err(format!(
            "record claims {} payload bytes, segment has {}",
            payload_len,
            remaining - header.len() as u64
        ));
    }

    let mut payload = vec![0u8; payload_len as usize];
    segment
        .reader
        .read_exact(&mut payload)
        .map_err(|e| format!("record payload unreadable: {}", e))?;

    if crc32fast::hash(&payload) != crc {
        return Err("record checksum mismatch".to_string());
    }

    let entry = WalEntry::decode_payload(&payload).map_err(|e| e.to_string())?;
    segment.offset += header.len() as u64 + payload_len;
    Ok(entry)
}
