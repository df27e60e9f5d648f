//! Protocol codec
//!
//! Encoding and decoding of frame payloads. The layout is fixed, so this is
//! hand-rolled big-endian plumbing rather than a serde format; every length
//! is validated before it is trusted.

use std::collections::BTreeMap;

use crate::error::{KvdbError, Result};

use super::message::{KIND_REQUEST, KIND_RESPONSE};
use super::{Command, Message, MessageContent, Response, StatusCode};

/// Marker byte for a null result entry
const RESULT_NULL: u8 = 0xFF;

/// Marker byte for a present result entry
const RESULT_PRESENT: u8 = 0x00;

// =============================================================================
// Message Encoding
// =============================================================================

pub fn encode_message(message: &Message) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&message.id.to_be_bytes());
    out.push(message.kind());
    match &message.content {
        MessageContent::Request(command) => encode_command(command, &mut out),
        MessageContent::Response(response) => encode_response(response, &mut out),
    }
    out
}

fn encode_command(command: &Command, out: &mut Vec<u8>) {
    let name = command.name.as_bytes();
    out.extend_from_slice(&(name.len() as u32).to_be_bytes());
    out.extend_from_slice(name);
    out.extend_from_slice(&(command.params.len() as u32).to_be_bytes());
    for param in &command.params {
        out.extend_from_slice(&(param.len() as u32).to_be_bytes());
        out.extend_from_slice(param);
    }
}

fn encode_response(response: &Response, out: &mut Vec<u8>) {
    out.push(response.code as u8);
    let message = response.message.as_bytes();
    out.extend_from_slice(&(message.len() as u32).to_be_bytes());
    out.extend_from_slice(message);
    out.extend_from_slice(&(response.result.len() as u32).to_be_bytes());
    for entry in &response.result {
        match entry {
            None => out.push(RESULT_NULL),
            Some(bytes) => {
                out.push(RESULT_PRESENT);
                out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                out.extend_from_slice(bytes);
            }
        }
    }
}

// =============================================================================
// Message Decoding
// =============================================================================

pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    let mut cursor = Cursor::new(bytes);
    let id = cursor.take_u64()?;
    let kind = cursor.take_u8()?;
    let content = match kind {
        KIND_REQUEST => MessageContent::Request(decode_command(&mut cursor)?),
        KIND_RESPONSE => MessageContent::Response(decode_response(&mut cursor)?),
        other => {
            return Err(KvdbError::Decode(format!(
                "unknown message kind: 0x{:02x}",
                other
            )))
        }
    };
    cursor.finish()?;
    Ok(Message { id, content })
}

fn decode_command(cursor: &mut Cursor<'_>) -> Result<Command> {
    let name_len = cursor.take_u32()? as usize;
    let name = String::from_utf8(cursor.take_bytes(name_len)?.to_vec())
        .map_err(|_| KvdbError::Decode("command name is not UTF-8".to_string()))?;
    let count = cursor.take_u32()? as usize;
    let mut params = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let len = cursor.take_u32()? as usize;
        params.push(cursor.take_bytes(len)?.to_vec());
    }
    Ok(Command { name, params })
}

fn decode_response(cursor: &mut Cursor<'_>) -> Result<Response> {
    let code = cursor.take_u8()?;
    let code = StatusCode::from_u8(code)
        .ok_or_else(|| KvdbError::Decode(format!("unknown status code: 0x{:02x}", code)))?;
    let msg_len = cursor.take_u32()? as usize;
    let message = String::from_utf8(cursor.take_bytes(msg_len)?.to_vec())
        .map_err(|_| KvdbError::Decode("response message is not UTF-8".to_string()))?;
    let count = cursor.take_u32()? as usize;
    let mut result = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        match cursor.take_u8()? {
            RESULT_NULL => result.push(None),
            RESULT_PRESENT => {
                let len = cursor.take_u32()? as usize;
                result.push(Some(cursor.take_bytes(len)?.to_vec()));
            }
            other => {
                return Err(KvdbError::Decode(format!(
                    "unknown result marker: 0x{:02x}",
                    other
                )))
            }
        }
    }
    Ok(Response { code, message, result })
}

// =============================================================================
// Cluster Descriptor
// =============================================================================

/// Encode a cluster descriptor (`db_name -> [peer_url]`) as the result blob
/// of `cluster_info`. Databases are emitted in name order so equal
/// descriptors encode identically.
pub fn encode_cluster_info(cluster: &BTreeMap<String, Vec<String>>) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&(cluster.len() as u32).to_be_bytes());
    for (name, urls) in cluster {
        out.extend_from_slice(&(name.len() as u32).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&(urls.len() as u32).to_be_bytes());
        for url in urls {
            out.extend_from_slice(&(url.len() as u32).to_be_bytes());
            out.extend_from_slice(url.as_bytes());
        }
    }
    out
}

pub fn decode_cluster_info(bytes: &[u8]) -> Result<BTreeMap<String, Vec<String>>> {
    let mut cursor = Cursor::new(bytes);
    let db_count = cursor.take_u32()? as usize;
    let mut cluster = BTreeMap::new();
    for _ in 0..db_count {
        let name_len = cursor.take_u32()? as usize;
        let name = String::from_utf8(cursor.take_bytes(name_len)?.to_vec())
            .map_err(|_| KvdbError::Decode("database name is not UTF-8".to_string()))?;
        let url_count = cursor.take_u32()? as usize;
        let mut urls = Vec::with_capacity(url_count.min(1024));
        for _ in 0..url_count {
            let url_len = cursor.take_u32()? as usize;
            urls.push(
                String::from_utf8(cursor.take_bytes(url_len)?.to_vec())
                    .map_err(|_| KvdbError::Decode("peer URL is not UTF-8".to_string()))?,
            );
        }
        cluster.insert(name, urls);
    }
    cursor.finish()?;
    Ok(cluster)
}

// =============================================================================
// Cursor
// =============================================================================

/// Bounds-checked reader over a frame payload.
struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take_u8(&mut self) -> Result<u8> {
        let byte = self.take_bytes(1)?;
        Ok(byte[0])
    }

    fn take_u32(&mut self) -> Result<u32> {
        let bytes = self.take_bytes(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn take_u64(&mut self) -> Result<u64> {
        let bytes = self.take_bytes(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len).ok_or_else(|| {
            KvdbError::Decode("length overflows payload".to_string())
        })?;
        if end > self.bytes.len() {
            return Err(KvdbError::Decode(format!(
                "payload truncated: need {} bytes at offset {}, have {}",
                len,
                self.offset,
                self.bytes.len() - self.offset
            )));
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    /// All bytes must be consumed; trailing garbage is a decode error.
    fn finish(&self) -> Result<()> {
        if self.offset != self.bytes.len() {
            return Err(KvdbError::Decode(format!(
                "{} trailing bytes after payload",
                self.bytes.len() - self.offset
            )));
        }
        Ok(())
    }
}
