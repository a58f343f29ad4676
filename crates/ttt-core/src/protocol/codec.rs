//! Framed JSON codec for the TTT-Over-TCP wire protocol.
//!
//! Wire format:
//! ```text
//! [header_len:2 (big-endian)][header: UTF-8 JSON, header_len bytes][content: content-length bytes]
//! ```
//! The header is a [`FrameHeader`]; its `content-length` field gives the
//! exact byte count of the content section. Encoding is stateless; decoding
//! is an incremental state machine that can be fed a buffer growing in
//! arbitrary chunks and never consumes bytes until the section they belong
//! to is complete.

use serde::Serialize;
use thiserror::Error;

use crate::protocol::messages::{
    FrameHeader, Request, Response, CONTENT_ENCODING_UTF8, CONTENT_TYPE_JSON,
};

/// Size of the big-endian header-length prefix.
pub const PREFIX_LEN: usize = 2;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    /// The JSON header was unparseable or missing a required field.
    #[error("malformed frame header: {0}")]
    MalformedHeader(String),

    /// The frame content could not be parsed as the expected JSON body.
    #[error("malformed frame content: {0}")]
    MalformedContent(String),

    /// The encoded header does not fit the 2-byte length prefix.
    #[error("header length {0} exceeds the 65535-byte prefix limit")]
    HeaderTooLarge(usize),
}

/// One complete header + content unit from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub content: Vec<u8>,
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes a full frame around already-serialized content bytes.
///
/// # Errors
///
/// Returns [`CodecError::HeaderTooLarge`] if the JSON header would not fit
/// the u16 length prefix.
pub fn encode_frame(
    content: &[u8],
    content_type: &str,
    content_encoding: &str,
) -> Result<Vec<u8>, CodecError> {
    let header = FrameHeader {
        byteorder: host_byteorder().to_string(),
        content_type: content_type.to_string(),
        content_encoding: content_encoding.to_string(),
        content_length: content.len(),
    };
    let header_bytes =
        serde_json::to_vec(&header).map_err(|e| CodecError::MalformedHeader(e.to_string()))?;
    if header_bytes.len() > u16::MAX as usize {
        return Err(CodecError::HeaderTooLarge(header_bytes.len()));
    }

    let mut frame = Vec::with_capacity(PREFIX_LEN + header_bytes.len() + content.len());
    frame.extend_from_slice(&(header_bytes.len() as u16).to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(content);
    Ok(frame)
}

/// Encodes a [`Request`] body as a JSON frame.
pub fn encode_request(request: &Request) -> Result<Vec<u8>, CodecError> {
    encode_json(request)
}

/// Encodes a [`Response`] body as a JSON frame.
pub fn encode_response(response: &Response) -> Result<Vec<u8>, CodecError> {
    encode_json(response)
}

fn encode_json<T: Serialize>(body: &T) -> Result<Vec<u8>, CodecError> {
    let content =
        serde_json::to_vec(body).map_err(|e| CodecError::MalformedContent(e.to_string()))?;
    encode_frame(&content, CONTENT_TYPE_JSON, CONTENT_ENCODING_UTF8)
}

/// Parses a frame's content as a [`Request`] body.
pub fn decode_request(frame: &Frame) -> Result<Request, CodecError> {
    serde_json::from_slice(&frame.content).map_err(|e| CodecError::MalformedContent(e.to_string()))
}

/// Parses a frame's content as a [`Response`] body.
pub fn decode_response(frame: &Frame) -> Result<Response, CodecError> {
    serde_json::from_slice(&frame.content).map_err(|e| CodecError::MalformedContent(e.to_string()))
}

fn host_byteorder() -> &'static str {
    if cfg!(target_endian = "big") {
        "big"
    } else {
        "little"
    }
}

// ── Incremental decoding ──────────────────────────────────────────────────────

/// Decode progress for one receive stream.
#[derive(Debug, Default)]
enum DecodeState {
    /// Waiting for the 2-byte header-length prefix.
    #[default]
    Prefix,
    /// Prefix consumed; waiting for `header_len` bytes of JSON header.
    Header { header_len: usize },
    /// Header consumed; waiting for `content-length` bytes of content.
    Content { header: FrameHeader },
}

/// Restartable incremental frame decoder.
///
/// Call [`decode`](FrameDecoder::decode) repeatedly against the same growing
/// buffer: it returns `Ok(None)` until a complete section is buffered, then
/// drains exactly the bytes it consumed. After a full frame is returned the
/// decoder is back in its initial state, so the next call starts on the
/// following frame. Several frames received in one read are drained by
/// looping until `Ok(None)`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    state: DecodeState,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the decode state machine against `buf`, consuming only the
    /// bytes belonging to completed sections.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedHeader`] when the header section is
    /// not a valid [`FrameHeader`] (including any missing required field).
    /// A decode error is a protocol violation; the connection it came from
    /// should be closed.
    pub fn decode(&mut self, buf: &mut Vec<u8>) -> Result<Option<Frame>, CodecError> {
        loop {
            match &self.state {
                DecodeState::Prefix => {
                    if buf.len() < PREFIX_LEN {
                        return Ok(None);
                    }
                    let header_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
                    buf.drain(..PREFIX_LEN);
                    self.state = DecodeState::Header { header_len };
                }
                DecodeState::Header { header_len } => {
                    let header_len = *header_len;
                    if buf.len() < header_len {
                        return Ok(None);
                    }
                    let header: FrameHeader = serde_json::from_slice(&buf[..header_len])
                        .map_err(|e| CodecError::MalformedHeader(e.to_string()))?;
                    buf.drain(..header_len);
                    self.state = DecodeState::Content { header };
                }
                DecodeState::Content { header } => {
                    if buf.len() < header.content_length {
                        return Ok(None);
                    }
                    let header = header.clone();
                    let content: Vec<u8> = buf.drain(..header.content_length).collect();
                    self.state = DecodeState::Prefix;
                    return Ok(Some(Frame { header, content }));
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
