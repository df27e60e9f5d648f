//! Response definitions
//!
//! Represents responses to clients.

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0x00,
    Error = 0x01,
}

impl StatusCode {
    pub fn from_u8(byte: u8) -> Option<StatusCode> {
        match byte {
            0x00 => Some(StatusCode::Success),
            0x01 => Some(StatusCode::Error),
            _ => None,
        }
    }
}

/// A response to send to a client. `result` entries are nullable so `get`
/// can report missing keys positionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: StatusCode,
    pub message: String,
    pub result: Vec<Option<Vec<u8>>>,
}

impl Response {
    pub fn success(result: Vec<Option<Vec<u8>>>) -> Self {
        Self { code: StatusCode::Success, message: String::new(), result }
    }

    pub fn success_empty() -> Self {
        Self::success(Vec::new())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { code: StatusCode::Error, message: message.into(), result: Vec::new() }
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }
}
