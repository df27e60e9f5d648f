//! Frame codec
//!
//! Length-prefixed framing over a byte stream: `len u32 (BE) || payload`.
//! Reads are stateful across TCP segment boundaries: `read_exact` keeps
//! pulling until the frame is complete. A declared length above the cap is
//! a frame error and the caller closes the connection.

use std::io::{ErrorKind, Read, Write};

use crate::error::{KvdbError, Result};

/// Read one frame. Returns `Ok(None)` on a clean EOF between frames; EOF in
/// the middle of a frame is a frame error.
pub fn read_frame(reader: &mut impl Read, max_frame_bytes: usize) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match read_exact_or_eof(reader, &mut len_buf)? {
        ReadOutcome::Eof => return Ok(None),
        ReadOutcome::Full => {}
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame_bytes {
        return Err(KvdbError::Frame(format!(
            "declared frame length {} exceeds cap {}",
            len, max_frame_bytes
        )));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .map_err(|e| KvdbError::Frame(format!("truncated frame: {}", e)))?;
    Ok(Some(payload))
}

/// Write one frame and flush it.
pub fn write_frame(writer: &mut impl Write, payload: &[u8]) -> Result<()> {
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

enum ReadOutcome {
    Full,
    Eof,
}

/// Like `read_exact`, but an EOF before the first byte is a clean close
/// rather than an error.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(ReadOutcome::Eof),
            Ok(0) => {
                return Err(KvdbError::Frame(
                    "connection closed mid-frame".to_string(),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(KvdbError::Io(e)),
        }
    }
    Ok(ReadOutcome::Full)
}
