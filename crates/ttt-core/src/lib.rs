//! # ttt-core
//!
//! Shared library for TTT-Over-TCP containing the framed wire protocol,
//! the tic-tac-toe game rules, and the readiness-driven networking used by
//! both the server and client applications.
//!
//! TTT-Over-TCP is a two-party tic-tac-toe game played over persistent TCP
//! connections. One authoritative server multiplexes every client on a
//! single reactor thread; clients mirror the game state purely from the
//! message stream. This crate is the shared foundation. It defines:
//!
//! - **`protocol`** – How bytes travel over the network. Every message is a
//!   JSON body wrapped in a self-describing frame (2-byte length prefix +
//!   JSON header + content), decoded incrementally so partial reads never
//!   produce partial messages.
//!
//! - **`game`** – Pure game logic with no I/O dependencies: the 9-cell
//!   board, the X/O symbols, and the win/draw rules.
//!
//! - **`net`** – The per-connection buffer handler and the single-threaded
//!   `mio` reactor that drives it. Application logic plugs in through the
//!   [`net::reactor::FrameDispatch`] trait and never touches a socket.

pub mod game;
pub mod net;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `ttt_core::Board` instead of `ttt_core::game::board::Board`.
pub use game::board::{Board, Cell, Symbol};
pub use net::connection::{Connection, ConnectionError};
pub use net::reactor::{ConnId, FrameDispatch, Outbound, Reactor, ReactorHandle};
pub use protocol::codec::{
    decode_request, decode_response, encode_frame, encode_request, encode_response, CodecError,
    Frame, FrameDecoder,
};
pub use protocol::messages::{EventKind, FrameHeader, Request, Response};
