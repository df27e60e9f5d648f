//! # KVDB
//!
//! A networked multi-database key-value server with:
//! - A framed binary wire protocol over long-lived TCP sessions
//! - Per-session transactional batches with read-your-own-writes
//! - A shared write-ahead log with checksummed records and crash recovery
//! - Static cluster coordination: peers confirm the namespace shape
//!   before the service port opens up
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │              Service Port          Manager Port              │
//! │           (open commands)       (loopback, admin)            │
//! └───────────────────┬──────────────────┬───────────────────────┘
//!                     │    accept threads│
//! ┌───────────────────▼──────────────────▼───────────────────────┐
//! │                      Worker Pool                              │
//! │        frame codec → message decode → port gate               │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │
//! ┌───────────────────────────▼──────────────────────────────────┐
//! │                     Server Context                            │
//! │        sessions ─ executor registry ─ databases               │
//! └──────────┬─────────────────────────────────────┬─────────────┘
//!            │                                     │
//!            ▼                                     ▼
//!     ┌─────────────┐   append → commit →   ┌─────────────┐
//!     │     WAL     │ ◀──── update meta ──▶ │   Stores    │
//!     │ (one, shared)│                      │ (RocksDB)   │
//!     └─────────────┘                       └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod cluster;
pub mod context;
pub mod database;
pub mod executor;
pub mod network;
pub mod protocol;
pub mod session;
pub mod store;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{KvdbConfig, ServerConfig};
pub use context::ServerContext;
pub use error::{KvdbError, Result};
pub use network::Server;

// =============================================================================
// Process Exit Codes
// =============================================================================

/// Exit codes of `kvdb-server`
pub mod exit_code {
    /// Clean shutdown
    pub const OK: i32 = 0;
    /// Configuration missing or unparseable
    pub const CONFIG: i32 = 1;
    /// Cluster handshake found diverging descriptors
    pub const CLUSTER: i32 = 2;
    /// WAL recovery failed, or durability could not be confirmed at runtime
    pub const WAL: i32 = 3;
    /// A store failed to open
    pub const ENGINE: i32 = 4;
}

/// Current version of KVDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
