//! Codec for encoding and decoding Parley frames.
//!
//! Binary WebSocket messages carry MessagePack behind a 4-byte big-endian
//! length prefix; several frames may share one message. Text WebSocket
//! messages carry a single JSON-encoded frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::Frame;

/// Largest payload accepted in either encoding (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload larger than [`MAX_FRAME_SIZE`].
    #[error("Frame of {0} bytes exceeds the {MAX_FRAME_SIZE} byte limit")]
    FrameTooLarge(usize),

    /// The input ends before the frame does.
    #[error("Truncated frame: {0} bytes missing")]
    Incomplete(usize),

    #[error("MessagePack encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("JSON frame rejected: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read the declared payload length, if the whole prefix is present.
fn payload_len(data: &[u8]) -> Result<Option<usize>, ProtocolError> {
    let Some(mut prefix) = data.get(..LENGTH_PREFIX_SIZE) else {
        return Ok(None);
    };
    let len = prefix.get_u32() as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    Ok(Some(len))
}

/// Append one length-prefixed frame to `buf`.
///
/// The payload is serialized in place; on error `buf` is left as it was.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let start = buf.len();
    buf.put_u32(0);

    let written = rmp_serde::encode::write_named(&mut (&mut *buf).writer(), frame);
    let len = buf.len() - start - LENGTH_PREFIX_SIZE;
    let checked = match written {
        Ok(()) if len > MAX_FRAME_SIZE => Err(ProtocolError::FrameTooLarge(len)),
        other => other.map_err(ProtocolError::from),
    };
    if let Err(e) = checked {
        buf.truncate(start);
        return Err(e);
    }

    buf[start..start + LENGTH_PREFIX_SIZE].copy_from_slice(&(len as u32).to_be_bytes());
    Ok(())
}

/// Encode a single frame for a binary message.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::with_capacity(64);
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode the first frame in `data`.
///
/// # Errors
///
/// Returns an error if the data is truncated, too large, or not a frame.
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    let len = payload_len(data)?
        .ok_or_else(|| ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()))?;
    let end = LENGTH_PREFIX_SIZE + len;
    let payload = data
        .get(LENGTH_PREFIX_SIZE..end)
        .ok_or_else(|| ProtocolError::Incomplete(end - data.len()))?;
    Ok(rmp_serde::from_slice(payload)?)
}

/// Take the next complete frame off the front of `buf`.
///
/// Returns `Ok(None)` and leaves `buf` untouched while the frame is still
/// arriving.
///
/// # Errors
///
/// Returns an error if the declared length is too large or the payload is
/// not a frame. The bad payload has been consumed by then.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    let Some(len) = payload_len(buf)? else {
        return Ok(None);
    };
    if buf.len() < LENGTH_PREFIX_SIZE + len {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(len);
    Ok(Some(rmp_serde::from_slice(&payload)?))
}

/// Encode a frame as JSON text.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_text(frame: &Frame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode a frame from JSON text.
///
/// # Errors
///
/// Returns an error if the text is too large or not a valid frame.
pub fn decode_text(text: &str) -> Result<Frame, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}
