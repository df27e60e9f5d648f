//! WAL entry definitions
//!
//! One entry per committed write: the assigned LSN, the target database and
//! the full key/value set of the batch.

use serde::{Deserialize, Serialize};

use crate::error::{KvdbError, Result};

/// Bytes before the payload: `len u32 | crc u32`
pub const RECORD_HEADER_SIZE: usize = 8;

/// A single key/value assignment inside an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalKv {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl WalKv {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }
}

/// A redo record: everything needed to re-apply one committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log sequence number, strictly monotonic across the whole log
    pub lsn: u64,

    /// Target database name
    pub db: String,

    /// The batch's assignments
    pub ops: Vec<WalKv>,
}

impl WalEntry {
    pub fn new(lsn: u64, db: impl Into<String>, ops: Vec<WalKv>) -> Self {
        Self { lsn, db: db.into(), ops }
    }

    /// Encode as an on-disk record: header + checksummed payload.
    pub fn encode_record(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let crc = crc32fast::hash(&payload);

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        record.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        record.extend_from_slice(&crc.to_be_bytes());
        record.extend_from_slice(&payload);
        Ok(record)
    }

    /// Decode a record payload after its checksum has been verified.
    pub fn decode_payload(payload: &[u8]) -> Result<WalEntry> {
        bincode::deserialize(payload)
            .map_err(|e| KvdbError::WalCorruption(format!("undecodable entry: {}", e)))
    }
}
