//! Configuration for KVDB
//!
//! Three flat `key=value` files, `#` for comments:
//!
//! - `config/kvdb.conf`: server identity and defaults
//! - `system/dblist`: per-database blocks, rewritten when databases are
//!   created, enabled or disabled
//! - `config/cluster.conf`: per-database peer lists, `<db>.<n>=host:port`

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{KvdbError, Result};

/// Default service port
pub const DEFAULT_PORT: u16 = 7078;

/// Default manager port (loopback only)
pub const DEFAULT_MANAGER_PORT: u16 = 7060;

/// Default partition count for new databases
pub const DEFAULT_PARTITIONS: u16 = 4;

/// Default cap on a single wire frame (64 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

// =============================================================================
// Flat file reader
// =============================================================================

/// Parse a flat `key=value` file. Blank lines and `#` comments are skipped.
fn read_kv_file(path: &Path) -> Result<Vec<(String, String)>> {
    let text = fs::read_to_string(path)
        .map_err(|e| KvdbError::Config(format!("cannot read {}: {}", path.display(), e)))?;

    let mut pairs = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((k, v)) => pairs.push((k.trim().to_string(), v.trim().to_string())),
            None => {
                return Err(KvdbError::Config(format!(
                    "{}:{}: expected key=value, got {:?}",
                    path.display(),
                    lineno + 1,
                    line
                )))
            }
        }
    }
    Ok(pairs)
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| KvdbError::Config(format!("invalid value for {}: {:?}", key, value)))
}

// =============================================================================
// kvdb.conf
// =============================================================================

/// Server-level configuration from `kvdb.conf`
#[derive(Debug, Clone)]
pub struct KvdbConfig {
    /// Service listener host
    pub host: String,

    /// Service listener port
    pub port: u16,

    /// Manager listener port, bound to loopback
    pub manager_port: u16,

    /// Root directory for database and WAL files
    pub dbs_rootdir: PathBuf,

    /// Default partition count for databases that do not override it
    pub dbs_partitions: u16,

    /// Cap on a single wire frame; larger declared lengths close the connection
    pub max_frame_bytes: usize,
}

impl Default for KvdbConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            manager_port: DEFAULT_MANAGER_PORT,
            dbs_rootdir: PathBuf::from("./dbs"),
            dbs_partitions: DEFAULT_PARTITIONS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl KvdbConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in read_kv_file(path)? {
            match key.as_str() {
                "host" => config.host = value,
                "port" => config.port = parse_num("port", &value)?,
                "manager-port" => config.manager_port = parse_num("manager-port", &value)?,
                "dbs-rootdir" => config.dbs_rootdir = PathBuf::from(value),
                "dbs-partitions" => {
                    config.dbs_partitions = parse_num("dbs-partitions", &value)?;
                    if config.dbs_partitions == 0 {
                        return Err(KvdbError::Config(
                            "dbs-partitions must be at least 1".to_string(),
                        ));
                    }
                }
                "max-frame-bytes" => {
                    config.max_frame_bytes = parse_num("max-frame-bytes", &value)?
                }
                other => {
                    return Err(KvdbError::Config(format!("unknown key in kvdb.conf: {}", other)))
                }
            }
        }
        Ok(config)
    }

    /// Address the service listener binds to
    pub fn service_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address the manager listener binds to (always loopback)
    pub fn manager_addr(&self) -> String {
        format!("127.0.0.1:{}", self.manager_port)
    }

    /// Directory holding WAL segments and meta
    pub fn wal_dir(&self) -> PathBuf {
        self.dbs_rootdir.join("wal")
    }
}

// =============================================================================
// system/dblist
// =============================================================================

/// A single database declaration from `system/dblist`
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub name: String,
    pub rootdir: PathBuf,
    pub partitions: u16,
    pub enabled: bool,
}

impl DbConfig {
    /// Directory of this database's store
    pub fn db_path(&self) -> PathBuf {
        self.rootdir.join(&self.name)
    }
}

/// The mutable database list. Rewritten on `create_db` / `enable_db` /
/// `disable_db` so registrations survive restarts.
#[derive(Debug, Clone)]
pub struct DbList {
    path: PathBuf,
    dbs: BTreeMap<String, DbConfig>,
}

impl DbList {
    /// Parse `system/dblist`. Keys are `<name>.enable`, `<name>.rootdir`,
    /// `<name>.partitions`; missing rootdir/partitions fall back to the
    /// kvdb.conf defaults.
    pub fn load(path: &Path, defaults: &KvdbConfig) -> Result<Self> {
        let mut dbs: BTreeMap<String, DbConfig> = BTreeMap::new();
        for (key, value) in read_kv_file(path)? {
            let (name, field) = key.rsplit_once('.').ok_or_else(|| {
                KvdbError::Config(format!("dblist key {:?} is not <name>.<field>", key))
            })?;
            validate_db_name(name)?;
            let entry = dbs.entry(name.to_string()).or_insert_with(|| DbConfig {
                name: name.to_string(),
                rootdir: defaults.dbs_rootdir.clone(),
                partitions: defaults.dbs_partitions,
                enabled: false,
            });
            match field {
                "enable" => entry.enabled = parse_num::<bool>(&key, &value)?,
                "rootdir" => entry.rootdir = PathBuf::from(value),
                "partitions" => {
                    entry.partitions = parse_num(&key, &value)?;
                    if entry.partitions == 0 {
                        return Err(KvdbError::Config(format!(
                            "{}: partitions must be at least 1",
                            name
                        )));
                    }
                }
                other => {
                    return Err(KvdbError::Config(format!(
                        "unknown dblist field {:?} for database {}",
                        other, name
                    )))
                }
            }
        }
        Ok(Self { path: path.to_path_buf(), dbs })
    }

    /// An empty list that will persist to `path` when first saved.
    pub fn empty(path: &Path) -> Self {
        Self { path: path.to_path_buf(), dbs: BTreeMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<&DbConfig> {
        self.dbs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dbs.contains_key(name)
    }

    /// All declared databases, in name order
    pub fn all(&self) -> impl Iterator<Item = &DbConfig> {
        self.dbs.values()
    }

    /// Only the enabled databases, in name order
    pub fn enabled(&self) -> impl Iterator<Item = &DbConfig> {
        self.dbs.values().filter(|db| db.enabled)
    }

    /// Register a new database. Fails if the name is already declared.
    pub fn insert(&mut self, db: DbConfig) -> Result<()> {
        if self.dbs.contains_key(&db.name) {
            return Err(KvdbError::DbExists(db.name));
        }
        self.dbs.insert(db.name.clone(), db);
        Ok(())
    }

    /// Flip the enable flag. Fails for unknown names.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        match self.dbs.get_mut(name) {
            Some(db) => {
                db.enabled = enabled;
                Ok(())
            }
            None => Err(KvdbError::NoSuchDb(name.to_string())),
        }
    }

    /// Rewrite the dblist file to match in-memory state.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = String::from("# managed by kvdb-server; edits are overwritten\n");
        for db in self.dbs.values() {
            let _ = writeln!(out, "{}.enable={}", db.name, db.enabled);
            let _ = writeln!(out, "{}.rootdir={}", db.name, db.rootdir.display());
            let _ = writeln!(out, "{}.partitions={}", db.name, db.partitions);
        }
        fs::write(&self.path, out)?;
        Ok(())
    }
}

/// Database names end up as directory names and wire strings. "wal" is
/// reserved: the log lives under `<dbs-rootdir>/wal`.
pub fn validate_db_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(KvdbError::ArgInvalid("empty database name".to_string()));
    }
    if name == "wal" {
        return Err(KvdbError::ArgInvalid(
            "database name 'wal' is reserved".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(KvdbError::ArgInvalid(format!(
            "invalid database name: {:?}",
            name
        )));
    }
    Ok(())
}

// =============================================================================
// cluster.conf
// =============================================================================

/// Per-database peer lists from `cluster.conf`.
///
/// A database with more than one peer URL is clustered; its shape must be
/// confirmed by every peer before the service port opens up.
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    cluster: BTreeMap<String, Vec<String>>,
}

impl ClusterConfig {
    /// Parse `cluster.conf` entries `<db>.<n>=host:port`. Indices must be
    /// dense from 0; duplicate URLs within one database are rejected; every
    /// referenced database must exist in the dblist and be enabled.
    pub fn load(path: &Path, dblist: &DbList) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let mut indexed: BTreeMap<String, BTreeMap<u32, String>> = BTreeMap::new();
        for (key, value) in read_kv_file(path)? {
            let (name, index) = key.rsplit_once('.').ok_or_else(|| {
                KvdbError::Config(format!("cluster key {:?} is not <db>.<n>", key))
            })?;
            let index: u32 = parse_num(&key, index)?;
            if indexed
                .entry(name.to_string())
                .or_default()
                .insert(index, value)
                .is_some()
            {
                return Err(KvdbError::Config(format!(
                    "duplicate cluster index {}.{}",
                    name, index
                )));
            }
        }

        let mut cluster = BTreeMap::new();
        for (name, peers) in indexed {
            match dblist.get(&name) {
                Some(db) if db.enabled => {}
                Some(_) => {
                    return Err(KvdbError::Config(format!(
                        "cluster.conf references disabled database {}",
                        name
                    )))
                }
                None => {
                    return Err(KvdbError::Config(format!(
                        "cluster.conf references unknown database {}",
                        name
                    )))
                }
            }

            let mut urls = Vec::with_capacity(peers.len());
            for (expect, (index, url)) in peers.into_iter().enumerate() {
                if index as usize != expect {
                    return Err(KvdbError::Config(format!(
                        "cluster indices for {} are not dense at {}",
                        name, index
                    )));
                }
                if urls.contains(&url) {
                    return Err(KvdbError::Config(format!(
                        "duplicate peer {} for database {}",
                        url, name
                    )));
                }
                urls.push(url);
            }
            cluster.insert(name, urls);
        }

        Ok(Self { cluster })
    }

    pub fn from_map(cluster: BTreeMap<String, Vec<String>>) -> Self {
        Self { cluster }
    }

    pub fn is_empty(&self) -> bool {
        self.cluster.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.cluster.get(name).map(|v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.cluster.iter()
    }

    /// Databases whose peer list has more than one URL
    pub fn clustered(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.cluster.iter().filter(|(_, urls)| urls.len() > 1)
    }
}

// =============================================================================
// ServerConfig
// =============================================================================

/// Everything the server reads at boot, rooted at a home directory:
///
/// ```text
/// <home>/config/kvdb.conf
/// <home>/config/cluster.conf     (optional)
/// <home>/system/dblist
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub kvdb: KvdbConfig,
    pub dblist: DbList,
    pub cluster: ClusterConfig,
}

impl ServerConfig {
    pub fn load(home: &Path) -> Result<Self> {
        let kvdb = KvdbConfig::load(&home.join("config").join("kvdb.conf"))?;
        let dblist_path = home.join("system").join("dblist");
        let dblist = if dblist_path.exists() {
            DbList::load(&dblist_path, &kvdb)?
        } else {
            DbList::empty(&dblist_path)
        };
        let cluster = ClusterConfig::load(&home.join("config").join("cluster.conf"), &dblist)?;
        Ok(Self { kvdb, dblist, cluster })
    }

    /// A config rooted at `home` with no databases and no cluster; used by
    /// tests and by `create_db` on a fresh install.
    pub fn standalone(home: &Path, kvdb: KvdbConfig) -> Self {
        Self {
            kvdb,
            dblist: DbList::empty(&home.join("system").join("dblist")),
            cluster: ClusterConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn kvdb_conf_defaults_and_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kvdb.conf");
        write(
            &path,
            "# server\nhost=0.0.0.0\nport=7078\nmanager-port=7060\ndbs-rootdir=../dbs\ndbs-partitions=4\n",
        );
        let config = KvdbConfig::load(&path).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7078);
        assert_eq!(config.manager_port, 7060);
        assert_eq!(config.dbs_rootdir, PathBuf::from("../dbs"));
        assert_eq!(config.dbs_partitions, 4);
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }

    #[test]
    fn kvdb_conf_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kvdb.conf");
        write(&path, "port seven\n");
        assert!(KvdbConfig::load(&path).is_err());

        write(&path, "no-such-key=1\n");
        assert!(KvdbConfig::load(&path).is_err());
    }

    #[test]
    fn dblist_blocks_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dblist");
        write(
            &path,
            "test1.enable=true\ntest1.partitions=2\ntest2.enable=false\n",
        );
        let defaults = KvdbConfig::default();
        let list = DbList::load(&path, &defaults).unwrap();
        assert_eq!(list.all().count(), 2);
        assert_eq!(list.enabled().count(), 1);

        let test1 = list.get("test1").unwrap();
        assert_eq!(test1.partitions, 2);
        assert_eq!(test1.rootdir, defaults.dbs_rootdir);
        assert!(!list.get("test2").unwrap().enabled);
    }

    #[test]
    fn dblist_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system").join("dblist");
        let defaults = KvdbConfig::default();

        let mut list = DbList::empty(&path);
        list.insert(DbConfig {
            name: "orders".to_string(),
            rootdir: dir.path().join("dbs"),
            partitions: 2,
            enabled: true,
        })
        .unwrap();
        list.save().unwrap();

        let reloaded = DbList::load(&path, &defaults).unwrap();
        let orders = reloaded.get("orders").unwrap();
        assert!(orders.enabled);
        assert_eq!(orders.partitions, 2);
    }

    #[test]
    fn cluster_conf_validation() {
        let dir = TempDir::new().unwrap();
        let defaults = KvdbConfig::default();
        let dblist_path = dir.path().join("dblist");
        write(&dblist_path, "test1.enable=true\ntest2.enable=false\n");
        let dblist = DbList::load(&dblist_path, &defaults).unwrap();

        let path = dir.path().join("cluster.conf");
        write(&path, "test1.0=h1:7078\ntest1.1=h2:7078\n");
        let cluster = ClusterConfig::load(&path, &dblist).unwrap();
        assert_eq!(cluster.get("test1").unwrap().len(), 2);
        assert_eq!(cluster.clustered().count(), 1);

        // unknown database
        write(&path, "nope.0=h1:7078\n");
        assert!(ClusterConfig::load(&path, &dblist).is_err());

        // disabled database
        write(&path, "test2.0=h1:7078\n");
        assert!(ClusterConfig::load(&path, &dblist).is_err());

        // sparse indices
        write(&path, "test1.0=h1:7078\ntest1.2=h2:7078\n");
        assert!(ClusterConfig::load(&path, &dblist).is_err());

        // duplicate peer URL
        write(&path, "test1.0=h1:7078\ntest1.1=h1:7078\n");
        assert!(ClusterConfig::load(&path, &dblist).is_err());

        // absent file is an empty cluster
        let cluster =
            ClusterConfig::load(&dir.path().join("absent.conf"), &dblist).unwrap();
        assert!(cluster.is_empty());
    }

    #[test]
    fn db_name_validation() {
        assert!(validate_db_name("orders_2024").is_ok());
        assert!(validate_db_name("a-b").is_ok());
        assert!(validate_db_name("").is_err());
        assert!(validate_db_name("../evil").is_err());
        assert!(validate_db_name("with space").is_err());
        assert!(validate_db_name("wal").is_err());
    }
}
