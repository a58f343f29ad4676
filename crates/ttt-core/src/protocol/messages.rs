//! Wire message types shared by the server and client.
//!
//! Every frame body is a UTF-8 JSON object. Client→server bodies are
//! [`Request`]s; server→client bodies are [`Response`]s. The `action` field
//! carries an [`EventKind`] discriminant as a plain integer; those values
//! are the wire contract and must stay stable across client and server
//! builds.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Protocol constants ────────────────────────────────────────────────────────

/// MIME type carried in every frame header.
pub const CONTENT_TYPE_JSON: &str = "text/json";

/// Text encoding carried in every frame header.
pub const CONTENT_ENCODING_UTF8: &str = "utf-8";

// ── Event kinds ───────────────────────────────────────────────────────────────

/// All game events defined by the protocol.
///
/// `Register` through `Move` are client requests; the rest are
/// server-initiated pushes. Discriminant values travel on the wire in the
/// `action` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    Register = 1,
    Deregister = 2,
    Start = 3,
    Stop = 4,
    Move = 5,
    BoardUpdate = 6,
    Fin = 7,
    Order = 8,
    PlayerJoined = 9,
    PlayerLeft = 10,
}

impl EventKind {
    /// Upper-case protocol name, used for menus and logging.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Register => "REGISTER",
            EventKind::Deregister => "DEREGISTER",
            EventKind::Start => "START",
            EventKind::Stop => "STOP",
            EventKind::Move => "MOVE",
            EventKind::BoardUpdate => "BOARD_UPDATE",
            EventKind::Fin => "FIN",
            EventKind::Order => "ORDER",
            EventKind::PlayerJoined => "PLAYER_JOINED",
            EventKind::PlayerLeft => "PLAYER_LEFT",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl From<EventKind> for u8 {
    fn from(kind: EventKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for EventKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            1 => Ok(EventKind::Register),
            2 => Ok(EventKind::Deregister),
            3 => Ok(EventKind::Start),
            4 => Ok(EventKind::Stop),
            5 => Ok(EventKind::Move),
            6 => Ok(EventKind::BoardUpdate),
            7 => Ok(EventKind::Fin),
            8 => Ok(EventKind::Order),
            9 => Ok(EventKind::PlayerJoined),
            10 => Ok(EventKind::PlayerLeft),
            _ => Err(()),
        }
    }
}

// ── Frame header ──────────────────────────────────────────────────────────────

/// Self-describing header that follows the 2-byte length prefix of every
/// frame.
///
/// All four fields are required; a header missing any of them fails
/// decoding with a malformed-header error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Byte order of the sending host ("little" or "big"); informational.
    pub byteorder: String,
    #[serde(rename = "content-type")]
    pub content_type: String,
    #[serde(rename = "content-encoding")]
    pub content_encoding: String,
    /// Exact byte count of the content that follows this header.
    #[serde(rename = "content-length")]
    pub content_length: usize,
}

// ── Request / Response bodies ─────────────────────────────────────────────────

/// A client→server request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Raw [`EventKind`] discriminant. Kept as the wire integer so the
    /// server can answer an unknown action with `success: false` instead of
    /// treating it as a protocol violation.
    pub action: u8,
    /// Action-specific payload: a player name, a cell index, or empty.
    pub data: Value,
}

impl Request {
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self {
            action: kind.into(),
            data,
        }
    }

    /// The typed event kind, when the action integer is a known one.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::try_from(self.action).ok()
    }
}

/// A server→client response or push body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub action: u8,
    pub success: bool,
    /// Action-specific payload: a human-readable line, a turn-order string,
    /// or a board snapshot.
    pub data: Value,
    /// True for server-initiated pushes (broadcasts and catch-up replays);
    /// not forwarded to application logic on the client.
    pub internal_request: bool,
}

impl Response {
    /// Direct reply to a client request.
    pub fn reply(action: u8, success: bool, data: Value) -> Self {
        Self {
            action,
            success,
            data,
            internal_request: false,
        }
    }

    /// Server-initiated push (broadcast or private catch-up send).
    pub fn push(kind: EventKind, data: Value) -> Self {
        Self {
            action: kind.into(),
            success: true,
            data,
            internal_request: true,
        }
    }

    /// The typed event kind, when the action integer is a known one.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::try_from(self.action).ok()
    }

    /// The payload as display text.
    pub fn text(&self) -> String {
        match self.data.as_str() {
            Some(text) => text.to_string(),
            None => self.data.to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
