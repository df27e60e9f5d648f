//! Write-Ahead Log (WAL) Module
//!
//! One redo log per server, shared by every database. A write becomes
//! durable in three steps inside the owning database's write lock:
//! append (fsynced) → engine commit → meta update. Anything the meta LSN
//! covers is durable in both the log and the engine; the tail past meta is
//! re-applied on recovery (at-least-once, writes are blind overwrites).
//!
//! ## File Layout
//!
//! ```text
//! <dbs-rootdir>/wal/wal.000      rolling record segments
//! <dbs-rootdir>/wal/wal.001
//! <dbs-rootdir>/wal/wal.meta     last durable LSN, rewritten atomically
//! ```
//!
//! ## Record Format
//!
//! ```text
//! ┌─────────┬─────────┬───────────────────────────────┐
//! │ len (4) │ crc (4) │ payload = bincode(WalEntry)   │
//! └─────────┴─────────┴───────────────────────────────┘
//! ```
//!
//! `crc` is CRC32 of the payload. A record that fails its checksum (or is
//! cut short) truncates the log at that offset; everything after it is
//! discarded, including later segments.

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{WalEntry, WalKv, RECORD_HEADER_SIZE};
pub use reader::{CorruptionPoint, WalReader};
pub use recovery::{recover, RecoveryReport};
pub use writer::{read_meta, Wal, DEFAULT_SEGMENT_BYTES};
