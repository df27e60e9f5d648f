//! Server context
//!
//! Owns the database registry, the session table, the shared WAL and the
//! executor registry, and routes decoded requests to handlers. Lookups are
//! frequent and mutations rare, so both tables sit behind reader-writer
//! locks.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::{validate_db_name, ClusterConfig, DbConfig, DbList, KvdbConfig, ServerConfig};
use crate::database::Database;
use crate::error::{KvdbError, Result};
use crate::executor::{ExecutorRegistry, Request};
use crate::protocol::{CommandName, Message};
use crate::session::{ResponseSink, Session};
use crate::store::{self, KvStore};
use crate::wal::{self, Wal};

pub struct ServerContext {
    kvdb: KvdbConfig,
    cluster: ClusterConfig,
    dblist: Mutex<DbList>,
    databases: RwLock<HashMap<String, Arc<Database>>>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    wal: Arc<Wal>,
    registry: ExecutorRegistry,
    ready: AtomicBool,
}

impl ServerContext {
    /// Open every enabled store, recover the WAL into them, then open the
    /// log for appending. Error kinds map to the process exit codes: engine
    /// failures here mean the store could not open, WAL failures mean
    /// recovery did not complete.
    pub fn open(config: ServerConfig) -> Result<Self> {
        let ServerConfig { kvdb, dblist, cluster } = config;

        fs::create_dir_all(&kvdb.dbs_rootdir)
            .map_err(|e| KvdbError::Engine(format!("cannot create dbs root: {}", e)))?;

        let mut stores: HashMap<String, Arc<dyn KvStore>> = HashMap::new();
        for db in dblist.enabled() {
            tracing::info!(db = %db.name, partitions = db.partitions, "opening store");
            let opened = store::open_store(&db.db_path(), db.partitions)?;
            stores.insert(db.name.clone(), Arc::new(opened));
        }

        let wal_dir = kvdb.wal_dir();
        let report = wal::recover(&wal_dir, &stores).map_err(as_recovery_error)?;
        let wal = Arc::new(
            Wal::open_append(&wal_dir, report.last_lsn + 1).map_err(as_recovery_error)?,
        );

        let databases = stores
            .into_iter()
            .map(|(name, opened)| {
                let db = Database::new(name.clone(), opened, Arc::clone(&wal));
                (name, Arc::new(db))
            })
            .collect();

        Ok(Self {
            kvdb,
            cluster,
            dblist: Mutex::new(dblist),
            databases: RwLock::new(databases),
            sessions: RwLock::new(HashMap::new()),
            wal,
            registry: ExecutorRegistry::new(),
            ready: AtomicBool::new(false),
        })
    }

    pub fn kvdb_config(&self) -> &KvdbConfig {
        &self.kvdb
    }

    pub fn wal(&self) -> &Arc<Wal> {
        &self.wal
    }

    // -------------------------------------------------------------------------
    // Readiness gate
    // -------------------------------------------------------------------------

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    // -------------------------------------------------------------------------
    // Database registry
    // -------------------------------------------------------------------------

    pub fn database(&self, name: &str) -> Result<Arc<Database>> {
        self.databases
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| KvdbError::NoSuchDb(name.to_string()))
    }

    /// Enabled database names, sorted.
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Create a new database with the configured defaults, register it
    /// enabled, and persist it to the dblist.
    pub fn create_database(&self, name: &str) -> Result<()> {
        validate_db_name(name)?;

        let mut dblist = self.dblist.lock();
        if dblist.contains(name) {
            return Err(KvdbError::DbExists(name.to_string()));
        }

        let db_config = DbConfig {
            name: name.to_string(),
            rootdir: self.kvdb.dbs_rootdir.clone(),
            partitions: self.kvdb.dbs_partitions,
            enabled: true,
        };
        let opened = store::open_store(&db_config.db_path(), db_config.partitions)?;

        dblist.insert(db_config)?;
        dblist.save()?;

        let db = Database::new(name, Arc::new(opened), Arc::clone(&self.wal));
        self.databases.write().insert(name.to_string(), Arc::new(db));

        tracing::info!(db = name, "created database");
        Ok(())
    }

    /// Enable a declared database. A no-op if it is already serving.
    pub fn enable_database(&self, name: &str) -> Result<()> {
        let mut dblist = self.dblist.lock();
        let db_config = dblist
            .get(name)
            .cloned()
            .ok_or_else(|| KvdbError::NoSuchDb(name.to_string()))?;

        if self.databases.read().contains_key(name) {
            return Ok(());
        }

        let opened = store::open_store(&db_config.db_path(), db_config.partitions)?;
        dblist.set_enabled(name, true)?;
        dblist.save()?;

        let db = Database::new(name, Arc::new(opened), Arc::clone(&self.wal));
        self.databases.write().insert(name.to_string(), Arc::new(db));

        tracing::info!(db = name, "enabled database");
        Ok(())
    }

    /// Disable a database: drop it from the registry and persist the flag.
    /// Sessions already bound keep their instance until they rebind.
    pub fn disable_database(&self, name: &str) -> Result<()> {
        let mut dblist = self.dblist.lock();
        if dblist.get(name).is_none() {
            return Err(KvdbError::NoSuchDb(name.to_string()));
        }
        dblist.set_enabled(name, false)?;
        dblist.save()?;

        self.databases.write().remove(name);
        tracing::info!(db = name, "disabled database");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Cluster descriptor
    // -------------------------------------------------------------------------

    /// The clustered slice of the configuration: databases with more than
    /// one peer URL.
    pub fn cluster_descriptor(&self) -> BTreeMap<String, Vec<String>> {
        self.cluster
            .clustered()
            .map(|(name, urls)| (name.clone(), urls.clone()))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Session table
    // -------------------------------------------------------------------------

    /// Resolve the session for a source key, creating it with `sink` on
    /// first sight. The read path stays uncontended; the write lock is
    /// only taken for a new connection.
    pub fn session(&self, source_key: &str, sink: ResponseSink) -> Arc<Session> {
        if let Some(session) = self.sessions.read().get(source_key) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(
            sessions
                .entry(source_key.to_string())
                .or_insert_with(|| Arc::new(Session::new(source_key, sink))),
        )
    }

    pub fn remove_session(&self, source_key: &str) {
        if let Some(session) = self.sessions.write().remove(source_key) {
            session.close();
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    // -------------------------------------------------------------------------
    // Command routing
    // -------------------------------------------------------------------------

    /// Execute a request and publish the response through the session's
    /// sink. Publishing tolerates a concurrent disconnect.
    pub fn process_command(&self, source_key: &str, message: &Message) {
        let session = self.session(source_key, ResponseSink::detached());
        let response = self.execute_for(&session, message);
        session.publish(&response);
    }

    /// Execute a request and hand back the response message.
    pub fn execute(&self, source_key: &str, message: &Message) -> Message {
        let session = self.session(source_key, ResponseSink::detached());
        self.execute_for(&session, message)
    }

    fn execute_for(&self, session: &Arc<Session>, message: &Message) -> Message {
        let command = match message.as_request() {
            Some(command) => command,
            None => return Message::error(message.id, "expected a request"),
        };

        let name = match CommandName::parse(&command.name) {
            Some(name) => name,
            None => {
                return Message::error(
                    message.id,
                    KvdbError::UnknownCommand(command.name.clone()).to_string(),
                )
            }
        };

        tracing::debug!(session = session.id(), command = name.as_str(), "executing");
        let request = Request { ctx: self, session, command };
        let response = self.registry.get(name).execute(&request);
        Message::response(message.id, response)
    }
}

/// Failures while replaying or reopening the log are recovery failures,
/// whatever the underlying kind.
fn as_recovery_error(e: KvdbError) -> KvdbError {
    match e {
        KvdbError::Wal(_) | KvdbError::WalCorruption(_) => e,
        other => KvdbError::Wal(format!("recovery failed: {}", other)),
    }
}
