//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Framing
//!
//! Every message travels in a length-prefixed frame:
//!
//! ```text
//! ┌──────────────┬─────────────────────────────┐
//! │ len u32 (BE) │         payload             │
//! └──────────────┴─────────────────────────────┘
//! ```
//!
//! `len` excludes itself. Frames above the configured cap close the
//! connection.
//!
//! ## Message Payload
//!
//! ```text
//! ┌─────────┬──────────┬───────────────────────┐
//! │ id (8)  │ kind (1) │    request | response │
//! └─────────┴──────────┴───────────────────────┘
//! ```
//!
//! - kind 0x00: request: `name_len u32 | name | param_count u32 |
//!   (param_len u32 | param)*`
//! - kind 0x01: response: `code u8 | msg_len u32 | msg | result_count u32 |
//!   (0xFF | 0x00 entry_len u32 entry)*`
//!
//! All integers are big-endian. Responses echo the request id.

mod command;
mod frame;
mod message;
mod response;

pub mod codec;

pub use command::{Command, CommandName};
pub use frame::{read_frame, write_frame};
pub use message::{Message, MessageContent};
pub use response::{Response, StatusCode};
