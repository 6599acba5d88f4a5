//! Length-prefixed message framing.
//!
//! Every message on an RPC stream is preceded by a 5-byte header: one flag
//! byte (`1` = compressed) and a big-endian `u32` length. Compression is not
//! supported; compressed frames are rejected.
//!
//! Call outcomes travel in trailers (`grpc-status`, `grpc-message`).

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use duplex_core::{Code, Status};
use http::{HeaderMap, HeaderValue};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Size of a frame header.
pub const HEADER_LEN: usize = 5;

/// Default maximum size of a single message (4 MiB).
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4 * 1024 * 1024;

/// Trailer carrying the numeric status code.
pub const GRPC_STATUS: &str = "grpc-status";

/// Trailer carrying the percent-encoded status message.
pub const GRPC_MESSAGE: &str = "grpc-message";

/// Framing errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Reading or writing the stream failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame carries a compressed message.
    #[error("compressed messages are not supported")]
    Compressed,

    /// The message exceeds the configured limit.
    #[error("message of {len} bytes exceeds limit of {max} bytes")]
    TooLarge {
        /// Declared length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// The body ended inside a frame.
    #[error("truncated frame")]
    Truncated,
}

impl From<FrameError> for Status {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Compressed => Self::unimplemented(err.to_string()),
            FrameError::TooLarge { .. } => Self::resource_exhausted(err.to_string()),
            FrameError::Io(_) | FrameError::Truncated => Self::internal(err.to_string()),
        }
    }
}

/// Codec for length-prefixed frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_len: usize,
}

impl FrameCodec {
    /// Creates a codec accepting messages up to `max_len` bytes.
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        if src[0] != 0 {
            return Err(FrameError::Compressed);
        }
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if len > self.max_len {
            return Err(FrameError::TooLarge { len, max: self.max_len });
        }
        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }
        src.advance(HEADER_LEN);
        Ok(Some(src.split_to(len).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::Truncated),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), FrameError> {
        let len = u32::try_from(item.len())
            .ok()
            .filter(|len| *len as usize <= self.max_len)
            .ok_or(FrameError::TooLarge {
                len: item.len(),
                max: self.max_len,
            })?;
        dst.reserve(HEADER_LEN + item.len());
        dst.put_u8(0);
        dst.put_u32(len);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// Splits a complete request body into messages.
///
/// # Errors
///
/// Fails on compressed, oversized or truncated frames.
pub fn decode_messages(body: Bytes, max_len: usize) -> Result<Vec<Bytes>, FrameError> {
    let mut codec = FrameCodec::new(max_len);
    let mut buf = BytesMut::from(body.as_ref());
    let mut messages = Vec::new();
    while let Some(message) = codec.decode_eof(&mut buf)? {
        messages.push(message);
    }
    Ok(messages)
}

/// Frames a single message.
pub fn encode_frame(message: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + message.len());
    buf.put_u8(0);
    buf.put_u32(u32::try_from(message.len()).unwrap_or(u32::MAX));
    buf.extend_from_slice(message);
    buf.freeze()
}

/// Builds the trailers reporting a call outcome.
pub fn status_trailers(code: Code, message: &str) -> HeaderMap {
    let mut trailers = HeaderMap::new();
    trailers.insert(GRPC_STATUS, HeaderValue::from(code.as_i32()));
    if !message.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&urlencoding::encode(message)) {
            trailers.insert(GRPC_MESSAGE, value);
        }
    }
    trailers
}

/// Parses a `grpc-timeout` header value such as `250m` or `5S`.
///
/// At most eight digits followed by one unit: `H`ours, `M`inutes,
/// `S`econds, `m`illis, `u`micros or `n`anos.
pub fn parse_timeout(value: &str) -> Option<Duration> {
    if !value.is_ascii() || value.len() < 2 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    let duration = match unit {
        "H" => Duration::from_secs(amount * 3600),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(duration)
}
