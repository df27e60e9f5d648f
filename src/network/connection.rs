//! Connection handler
//!
//! Owns one client connection for its lifetime: frame read → decode →
//! admission check → execute → respond. Wire errors (framing, undecodable
//! payloads) close the connection; command errors go back as ERROR
//! responses and the loop continues.

use std::io::BufReader;
use std::net::TcpStream;
use std::sync::Arc;

use crate::context::ServerContext;
use crate::error::KvdbError;
use crate::protocol::{codec, read_frame, CommandName, Message};
use crate::session::ResponseSink;

use super::PortClass;

pub(super) fn handle_connection(ctx: &Arc<ServerContext>, stream: TcpStream, port: PortClass) {
    let peer = match stream.peer_addr() {
        Ok(peer) => peer,
        Err(e) => {
            tracing::debug!(error = %e, "connection lost before handshake");
            return;
        }
    };
    let source_key = format!("{}:{}", peer.ip(), peer.port());
    tracing::debug!(client = %source_key, ?port, "client connected");

    let write_half = match stream.try_clone() {
        Ok(clone) => clone,
        Err(e) => {
            tracing::warn!(client = %source_key, error = %e, "cannot clone stream");
            return;
        }
    };
    let _ = stream.set_nodelay(true);

    let session = ctx.session(&source_key, ResponseSink::new(write_half));
    let max_frame_bytes = ctx.kvdb_config().max_frame_bytes;
    let mut reader = BufReader::new(stream);

    loop {
        let payload = match read_frame(&mut reader, max_frame_bytes) {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(client = %source_key, error = %e, "closing on frame error");
                break;
            }
        };

        let message = match codec::decode_message(&payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(client = %source_key, error = %e, "closing on decode error");
                break;
            }
        };

        match admit(ctx, port, &message) {
            Admission::Admit => ctx.process_command(&source_key, &message),
            Admission::Reject(reason) => session.publish(&Message::error(message.id, reason)),
        }
    }

    ctx.remove_session(&source_key);
    tracing::debug!(client = %source_key, "client disconnected");
}

enum Admission {
    Admit,
    Reject(String),
}

/// Port gating. The manager port admits everything. The service port
/// admits only `cluster_info` before readiness, and only open commands
/// after; unknown names pass through so the executor layer can answer
/// with its unknown-command error.
fn admit(ctx: &ServerContext, port: PortClass, message: &Message) -> Admission {
    let command = match message.as_request() {
        Some(command) => command,
        None => return Admission::Reject("expected a request".to_string()),
    };
    let name = CommandName::parse(&command.name);

    match port {
        PortClass::Manager => Admission::Admit,
        PortClass::Service if !ctx.is_ready() => match name {
            Some(name) if name.admitted_pre_ready() => Admission::Admit,
            _ => Admission::Reject(KvdbError::NotReady.to_string()),
        },
        PortClass::Service => match name {
            Some(name) if name.is_open() => Admission::Admit,
            Some(name) => Admission::Reject(format!(
                "{} requires the manager port",
                name.as_str()
            )),
            None => Admission::Admit,
        },
    }
}
