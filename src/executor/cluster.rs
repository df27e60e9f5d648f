//! Cluster topology command
//!
//! `cluster_info` is the one command admitted on the service port before
//! readiness: peers use it to confirm the cluster's shape against each
//! other during the handshake.

use crate::protocol::{codec, Response};

use super::{Executor, Request};

pub struct ClusterInfoExecutor;

impl Executor for ClusterInfoExecutor {
    fn execute(&self, req: &Request<'_>) -> Response {
        let descriptor = req.ctx.cluster_descriptor();
        Response::success(vec![Some(codec::encode_cluster_info(&descriptor))])
    }
}
