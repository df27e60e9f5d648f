//! Executor registry
//!
//! One handler per command, looked up by name. Registration is an explicit
//! table built at startup: the match over `CommandName` is exhaustive, so a
//! new command variant without a handler fails to compile here.

mod batch;
mod cluster;
mod db;
mod kv;

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ServerContext;
use crate::error::{KvdbError, Result};
use crate::protocol::{Command, CommandName, Response};
use crate::session::Session;

use batch::{BatchAbortExecutor, BatchBeginExecutor, BatchCommitExecutor};
use cluster::ClusterInfoExecutor;
use db::{
    CreateDbExecutor, DisableDbExecutor, EnableDbExecutor, ShowDbsExecutor, UseExecutor,
};
use kv::{ExistsExecutor, GetExecutor, PutExecutor};

/// Everything a handler may touch.
pub struct Request<'a> {
    pub ctx: &'a ServerContext,
    pub session: &'a Arc<Session>,
    pub command: &'a Command,
}

pub trait Executor: Send + Sync {
    fn execute(&self, req: &Request<'_>) -> Response;
}

pub struct ExecutorRegistry {
    executors: HashMap<CommandName, Box<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        let mut executors: HashMap<CommandName, Box<dyn Executor>> = HashMap::new();
        for name in CommandName::ALL {
            let executor: Box<dyn Executor> = match name {
                CommandName::Use => Box::new(UseExecutor),
                CommandName::CreateDb => Box::new(CreateDbExecutor),
                CommandName::EnableDb => Box::new(EnableDbExecutor),
                CommandName::DisableDb => Box::new(DisableDbExecutor),
                CommandName::Exists => Box::new(ExistsExecutor),
                CommandName::Get => Box::new(GetExecutor),
                CommandName::Put => Box::new(PutExecutor),
                CommandName::BatchBegin => Box::new(BatchBeginExecutor),
                CommandName::BatchAbort => Box::new(BatchAbortExecutor),
                CommandName::BatchCommit => Box::new(BatchCommitExecutor),
                CommandName::ClusterInfo => Box::new(ClusterInfoExecutor),
                CommandName::ShowDbs => Box::new(ShowDbsExecutor),
            };
            executors.insert(name, executor);
        }
        Self { executors }
    }

    pub fn get(&self, name: CommandName) -> &dyn Executor {
        self.executors
            .get(&name)
            .map(|e| e.as_ref())
            .expect("every command name is registered")
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Parameter helpers
// =============================================================================

/// The single UTF-8 parameter of commands like `use <db>`.
fn single_name_param(command: &Command) -> Result<&str> {
    if command.params.len() != 1 {
        return Err(KvdbError::ArgInvalid(format!(
            "{} expects exactly one parameter",
            command.name
        )));
    }
    std::str::from_utf8(&command.params[0])
        .map_err(|_| KvdbError::ArgInvalid("parameter is not UTF-8".to_string()))
}

/// Collapse a handler result into the wire response.
fn respond(result: Result<Vec<Option<Vec<u8>>>>) -> Response {
    match result {
        Ok(values) => Response::success(values),
        Err(e) => Response::error(e.to_string()),
    }
}
