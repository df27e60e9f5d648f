//! Session
//!
//! Per-connection state: the bound database, the batch buffer, and the
//! sink responses go out through. The buffer is private to the session
//! until `batch_commit`; other sessions never observe it.
//!
//! ## State machine
//!
//! ```text
//!   INIT ──use(db)──▶ BOUND ──batch_begin──▶ BATCHING
//!     ▲                │                       │
//!     │                │                       ├─batch_abort───▶ BOUND
//!     │                │                       └─batch_commit──▶ BOUND
//!     └──disconnect────┘                         (after durability)
//! ```
//!
//! `batch_begin` and `batch_abort` are idempotent; `use` aborts any active
//! batch before re-binding.

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::database::Database;
use crate::error::{KvdbError, Result};
use crate::protocol::{codec, write_frame, Message};
use crate::wal::WalKv;

/// Cap on batch cardinality, both per `put` call and cumulative.
pub const MAX_BATCH_SIZE: usize = 10_000_000;

pub struct Session {
    /// Source key: the client's `host:port`
    id: String,
    sink: ResponseSink,
    state: Mutex<SessionState>,
}

struct SessionState {
    db: Option<Arc<Database>>,
    batch_mode: bool,
    batch: HashMap<Vec<u8>, Vec<u8>>,
}

impl Session {
    pub fn new(id: impl Into<String>, sink: ResponseSink) -> Self {
        Self {
            id: id.into(),
            sink,
            state: Mutex::new(SessionState {
                db: None,
                batch_mode: false,
                batch: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Bind the session to a database, aborting any active batch first.
    pub fn set_db(&self, db: Arc<Database>) {
        let mut state = self.state.lock();
        state.batch_mode = false;
        state.batch.clear();
        state.db = Some(db);
    }

    pub fn db(&self) -> Option<Arc<Database>> {
        self.state.lock().db.clone()
    }

    pub fn db_name(&self) -> Option<String> {
        self.state.lock().db.as_ref().map(|db| db.name().to_string())
    }

    pub fn batch_mode(&self) -> bool {
        self.state.lock().batch_mode
    }

    /// Send a response to the client. Silently dropped once the connection
    /// is gone, since disconnect can race an in-flight executor.
    pub fn publish(&self, message: &Message) {
        self.sink.publish(message);
    }

    /// Called on disconnect.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.batch_mode = false;
        state.batch.clear();
        drop(state);
        self.sink.close();
    }

    // -------------------------------------------------------------------------
    // Batch lifecycle
    // -------------------------------------------------------------------------

    /// Enter batch mode (idempotent) with an empty buffer.
    pub fn batch_begin(&self) {
        let mut state = self.state.lock();
        state.batch_mode = true;
        state.batch.clear();
    }

    /// Leave batch mode (idempotent), discarding the buffer.
    pub fn batch_abort(&self) {
        let mut state = self.state.lock();
        state.batch_mode = false;
        state.batch.clear();
    }

    /// Commit the buffer as one durable batch. On a size mismatch the
    /// session stays in batch mode with the buffer intact, so the client
    /// can retry with the right count or abort.
    pub fn batch_commit(&self, expected_size: Option<u64>) -> Result<()> {
        let mut state = self.state.lock();
        if !state.batch_mode {
            return Err(KvdbError::BatchState("not in batch mode".to_string()));
        }

        let actual = state.batch.len() as u64;
        let expected = expected_size.unwrap_or(actual);
        if actual != expected {
            return Err(KvdbError::BatchSizeMismatch { expected, actual });
        }

        let db = state.db.clone().ok_or_else(no_db_selected)?;
        state.batch_mode = false;
        let kvs: Vec<WalKv> = state
            .batch
            .drain()
            .map(|(key, value)| WalKv::new(key, value))
            .collect();
        drop(state);

        db.write_durable(kvs)
    }

    // -------------------------------------------------------------------------
    // Reads and writes
    // -------------------------------------------------------------------------

    /// In batch mode, buffer the pairs (one insertion per pair,
    /// last-write-wins). Otherwise apply them immediately through the
    /// durable write path.
    pub fn put(&self, kvs: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        if kvs.len() > MAX_BATCH_SIZE {
            return Err(KvdbError::BatchTooLarge);
        }

        let mut state = self.state.lock();
        let db = state.db.clone().ok_or_else(no_db_selected)?;

        if state.batch_mode {
            if state.batch.len() + kvs.len() > MAX_BATCH_SIZE {
                return Err(KvdbError::BatchTooLarge);
            }
            for (key, value) in kvs {
                state.batch.insert(key, value);
            }
            Ok(())
        } else {
            drop(state);
            db.write_durable(
                kvs.into_iter()
                    .map(|(key, value)| WalKv::new(key, value))
                    .collect(),
            )
        }
    }

    /// Read-your-own-writes: in batch mode the buffer wins, then the
    /// engine.
    pub fn get(&self, keys: &[Vec<u8>]) -> Result<Vec<Option<Vec<u8>>>> {
        let state = self.state.lock();
        let db = state.db.clone().ok_or_else(no_db_selected)?;

        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let buffered = if state.batch_mode {
                state.batch.get(key).cloned()
            } else {
                None
            };
            match buffered {
                Some(value) => values.push(Some(value)),
                None => values.push(db.get(key)?),
            }
        }
        Ok(values)
    }

    pub fn exists(&self, keys: &[Vec<u8>]) -> Result<Vec<bool>> {
        let values = self.get(keys)?;
        Ok(values.iter().map(|v| v.is_some()).collect())
    }
}

fn no_db_selected() -> KvdbError {
    KvdbError::NoSuchDb("no database selected".to_string())
}


// =============================================================================
// Response sink
// =============================================================================

/// Write side of a connection. Publishing after close is a silent drop:
/// an executor may still be running when the client disconnects.
#[derive(Clone)]
pub struct ResponseSink {
    stream: Arc<Mutex<Option<TcpStream>>>,
}

impl ResponseSink {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream: Arc::new(Mutex::new(Some(stream))) }
    }

    /// A sink with no connection behind it; every publish is dropped.
    pub fn detached() -> Self {
        Self { stream: Arc::new(Mutex::new(None)) }
    }

    pub fn publish(&self, message: &Message) {
        let mut guard = self.stream.lock();
        let Some(stream) = guard.as_mut() else {
            tracing::debug!(id = message.id, "dropping response for closed connection");
            return;
        };

        let payload = codec::encode_message(message);
        if let Err(e) = write_frame(stream, &payload) {
            tracing::debug!(id = message.id, error = %e, "write failed, closing sink");
            *guard = None;
        }
    }

    pub fn close(&self) {
        *self.stream.lock() = None;
    }

    pub fn is_closed(&self) -> bool {
        self.stream.lock().is_none()
    }
}
