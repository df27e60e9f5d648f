//! Point read/write commands

use crate::error::{KvdbError, Result};
use crate::protocol::Response;

use super::{respond, Executor, Request};

pub struct GetExecutor;

impl Executor for GetExecutor {
    fn execute(&self, req: &Request<'_>) -> Response {
        respond(req.session.get(&req.command.params))
    }
}

pub struct ExistsExecutor;

impl Executor for ExistsExecutor {
    fn execute(&self, req: &Request<'_>) -> Response {
        respond(req.session.exists(&req.command.params).map(|flags| {
            flags
                .into_iter()
                .map(|present| Some(vec![present as u8]))
                .collect()
        }))
    }
}

pub struct PutExecutor;

impl Executor for PutExecutor {
    fn execute(&self, req: &Request<'_>) -> Response {
        respond(paired(&req.command.params).and_then(|kvs| {
            req.session.put(kvs)?;
            Ok(Vec::new())
        }))
    }
}

/// `put` parameters alternate key and value.
fn paired(params: &[Vec<u8>]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    if params.len() % 2 != 0 {
        return Err(KvdbError::ArgInvalid(
            "put expects key/value pairs".to_string(),
        ));
    }
    Ok(params
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}
