//! Database administration commands
//!
//! `use` is open; the rest are admin and only reachable through the
//! manager port.

use crate::protocol::Response;

use super::{respond, single_name_param, Executor, Request};

pub struct UseExecutor;

impl Executor for UseExecutor {
    fn execute(&self, req: &Request<'_>) -> Response {
        respond(single_name_param(req.command).and_then(|name| {
            let db = req.ctx.database(name)?;
            req.session.set_db(db);
            Ok(Vec::new())
        }))
    }
}

pub struct CreateDbExecutor;

impl Executor for CreateDbExecutor {
    fn execute(&self, req: &Request<'_>) -> Response {
        respond(single_name_param(req.command).and_then(|name| {
            req.ctx.create_database(name)?;
            Ok(Vec::new())
        }))
    }
}

pub struct EnableDbExecutor;

impl Executor for EnableDbExecutor {
    fn execute(&self, req: &Request<'_>) -> Response {
        respond(single_name_param(req.command).and_then(|name| {
            req.ctx.enable_database(name)?;
            Ok(Vec::new())
        }))
    }
}

pub struct DisableDbExecutor;

impl Executor for DisableDbExecutor {
    fn execute(&self, req: &Request<'_>) -> Response {
        respond(single_name_param(req.command).and_then(|name| {
            req.ctx.disable_database(name)?;
            Ok(Vec::new())
        }))
    }
}

pub struct ShowDbsExecutor;

impl Executor for ShowDbsExecutor {
    fn execute(&self, req: &Request<'_>) -> Response {
        let names = req.ctx.database_names();
        Response::success(
            names
                .into_iter()
                .map(|name| Some(name.into_bytes()))
                .collect(),
        )
    }
}
