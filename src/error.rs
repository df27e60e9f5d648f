//! Error types for KVDB
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using KvdbError
pub type Result<T> = std::result::Result<T, KvdbError>;

/// Unified error type for KVDB operations
#[derive(Debug, Error)]
pub enum KvdbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Wire Errors (framing / decode; the connection closes)
    // -------------------------------------------------------------------------
    #[error("Frame error: {0}")]
    Frame(String),

    #[error("Decode error: {0}")]
    Decode(String),

    // -------------------------------------------------------------------------
    // Command Errors (session-local, become ERROR responses)
    // -------------------------------------------------------------------------
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("server not ready")]
    NotReady,

    #[error("no such database: {0}")]
    NoSuchDb(String),

    #[error("database already exists: {0}")]
    DbExists(String),

    #[error("invalid argument: {0}")]
    ArgInvalid(String),

    #[error("batch state error: {0}")]
    BatchState(String),

    #[error("batch size not match, expect: {expected}, actually: {actual}")]
    BatchSizeMismatch { expected: u64, actual: u64 },

    #[error("batch too large")]
    BatchTooLarge,

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("engine error: {0}")]
    Engine(String),

    #[error("WAL error: {0}")]
    Wal(String),

    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Cluster Errors
    // -------------------------------------------------------------------------
    #[error("cluster descriptor mismatch: {0}")]
    ClusterMismatch(String),

    // -------------------------------------------------------------------------
    // Catch-all
    // -------------------------------------------------------------------------
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rocksdb::Error> for KvdbError {
    fn from(e: rocksdb::Error) -> Self {
        KvdbError::Engine(e.to_string())
    }
}

impl From<bincode::Error> for KvdbError {
    fn from(e: bincode::Error) -> Self {
        KvdbError::Wal(format!("entry serialization: {}", e))
    }
}

impl KvdbError {
    /// Whether this error must tear down the connection instead of being
    /// reported to the client as an ERROR response.
    pub fn is_wire_error(&self) -> bool {
        matches!(
            self,
            KvdbError::Frame(_) | KvdbError::Decode(_) | KvdbError::Io(_)
        )
    }
}
