//! Message envelope
//!
//! Pairs a client-chosen id with either a request or a response. The id is
//! opaque to the server; responses echo it back so clients can match
//! replies on a pipelined connection.

use super::{Command, Response};

/// Wire tag for request payloads
pub const KIND_REQUEST: u8 = 0x00;

/// Wire tag for response payloads
pub const KIND_RESPONSE: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Request(Command),
    Response(Response),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub content: MessageContent,
}

impl Message {
    pub fn request(id: u64, command: Command) -> Self {
        Self { id, content: MessageContent::Request(command) }
    }

    pub fn response(id: u64, response: Response) -> Self {
        Self { id, content: MessageContent::Response(response) }
    }

    pub fn success(id: u64, result: Vec<Option<Vec<u8>>>) -> Self {
        Self::response(id, Response::success(result))
    }

    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self::response(id, Response::error(message))
    }

    pub fn kind(&self) -> u8 {
        match self.content {
            MessageContent::Request(_) => KIND_REQUEST,
            MessageContent::Response(_) => KIND_RESPONSE,
        }
    }

    pub fn as_request(&self) -> Option<&Command> {
        match &self.content {
            MessageContent::Request(c) => Some(c),
            MessageContent::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match &self.content {
            MessageContent::Response(r) => Some(r),
            MessageContent::Request(_) => None,
        }
    }
}
