//! Command definitions
//!
//! Represents commands from clients. The wire carries a free-form name so
//! unknown commands can be answered with an error response instead of a
//! connection teardown; `CommandName` is the closed set the server executes.

/// The closed set of commands the server knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    Use,
    CreateDb,
    EnableDb,
    DisableDb,
    Exists,
    Get,
    Put,
    BatchBegin,
    BatchAbort,
    BatchCommit,
    ClusterInfo,
    ShowDbs,
}

impl CommandName {
    /// Every command, in wire-name order. The executor registry iterates
    /// this so a new variant without a handler fails to compile there.
    pub const ALL: [CommandName; 12] = [
        CommandName::Use,
        CommandName::CreateDb,
        CommandName::EnableDb,
        CommandName::DisableDb,
        CommandName::Exists,
        CommandName::Get,
        CommandName::Put,
        CommandName::BatchBegin,
        CommandName::BatchAbort,
        CommandName::BatchCommit,
        CommandName::ClusterInfo,
        CommandName::ShowDbs,
    ];

    /// Canonical wire string
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Use => "use",
            CommandName::CreateDb => "create_db",
            CommandName::EnableDb => "enable_db",
            CommandName::DisableDb => "disable_db",
            CommandName::Exists => "exists",
            CommandName::Get => "get",
            CommandName::Put => "put",
            CommandName::BatchBegin => "batch_begin",
            CommandName::BatchAbort => "batch_abort",
            CommandName::BatchCommit => "batch_commit",
            CommandName::ClusterInfo => "cluster_info",
            CommandName::ShowDbs => "show_dbs",
        }
    }

    pub fn parse(name: &str) -> Option<CommandName> {
        CommandName::ALL.iter().copied().find(|c| c.as_str() == name)
    }

    /// Open commands are admissible on the service port once the server is
    /// ready. Admin commands are restricted to the loopback manager port.
    pub fn is_open(&self) -> bool {
        !matches!(
            self,
            CommandName::CreateDb
                | CommandName::EnableDb
                | CommandName::DisableDb
                | CommandName::ShowDbs
        )
    }

    /// The only command admitted on the service port before the cluster
    /// handshake confirms.
    pub fn admitted_pre_ready(&self) -> bool {
        matches!(self, CommandName::ClusterInfo)
    }
}

/// A request payload: command name plus raw byte parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub params: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(name: CommandName, params: Vec<Vec<u8>>) -> Self {
        Self { name: name.as_str().to_string(), params }
    }

    pub fn use_db(db: &str) -> Self {
        Self::new(CommandName::Use, vec![db.as_bytes().to_vec()])
    }

    pub fn create_db(db: &str) -> Self {
        Self::new(CommandName::CreateDb, vec![db.as_bytes().to_vec()])
    }

    pub fn enable_db(db: &str) -> Self {
        Self::new(CommandName::EnableDb, vec![db.as_bytes().to_vec()])
    }

    pub fn disable_db(db: &str) -> Self {
        Self::new(CommandName::DisableDb, vec![db.as_bytes().to_vec()])
    }

    pub fn exists(keys: Vec<Vec<u8>>) -> Self {
        Self::new(CommandName::Exists, keys)
    }

    pub fn get(keys: Vec<Vec<u8>>) -> Self {
        Self::new(CommandName::Get, keys)
    }

    /// Parameters alternate key, value, key, value, ...
    pub fn put(kvs: Vec<Vec<u8>>) -> Self {
        Self::new(CommandName::Put, kvs)
    }

    pub fn batch_begin() -> Self {
        Self::new(CommandName::BatchBegin, Vec::new())
    }

    pub fn batch_abort() -> Self {
        Self::new(CommandName::BatchAbort, Vec::new())
    }

    /// `expected_size` of `None` commits whatever is buffered.
    pub fn batch_commit(expected_size: Option<u64>) -> Self {
        let params = match expected_size {
            Some(n) => vec![n.to_be_bytes().to_vec()],
            None => Vec::new(),
        };
        Self::new(CommandName::BatchCommit, params)
    }

    pub fn cluster_info() -> Self {
        Self::new(CommandName::ClusterInfo, Vec::new())
    }

    pub fn show_dbs() -> Self {
        Self::new(CommandName::ShowDbs, Vec::new())
    }
}
