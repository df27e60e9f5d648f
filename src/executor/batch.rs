//! Batch lifecycle commands

use crate::error::{KvdbError, Result};
use crate::protocol::{Command, Response};

use super::{respond, Executor, Request};

pub struct BatchBeginExecutor;

impl Executor for BatchBeginExecutor {
    fn execute(&self, req: &Request<'_>) -> Response {
        if req.session.db().is_none() {
            return Response::error("no database selected");
        }
        req.session.batch_begin();
        Response::success_empty()
    }
}

pub struct BatchAbortExecutor;

impl Executor for BatchAbortExecutor {
    fn execute(&self, req: &Request<'_>) -> Response {
        req.session.batch_abort();
        Response::success_empty()
    }
}

pub struct BatchCommitExecutor;

impl Executor for BatchCommitExecutor {
    fn execute(&self, req: &Request<'_>) -> Response {
        respond(expected_size(req.command).and_then(|expected| {
            req.session.batch_commit(expected)?;
            Ok(Vec::new())
        }))
    }
}

/// Optional expected-size parameter: 8 bytes, big-endian.
fn expected_size(command: &Command) -> Result<Option<u64>> {
    match command.params.as_slice() {
        [] => Ok(None),
        [param] => {
            let bytes: [u8; 8] = param.as_slice().try_into().map_err(|_| {
                KvdbError::ArgInvalid("batch_commit size must be 8 bytes".to_string())
            })?;
            Ok(Some(u64::from_be_bytes(bytes)))
        }
        _ => Err(KvdbError::ArgInvalid(
            "batch_commit expects at most one parameter".to_string(),
        )),
    }
}
