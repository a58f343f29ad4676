//! Per-connection buffer and framing state.
//!
//! A [`Connection`] owns one non-blocking socket plus everything the
//! reactor must preserve between readiness notifications: the append-only
//! receive buffer, the prefix-consumed send buffer, and the incremental
//! decode progress. A would-block result is never an error here; it simply
//! means the operation resumes on the next notification.

use std::io::{Read, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;
use thiserror::Error;

use crate::protocol::codec::{CodecError, Frame, FrameDecoder};

/// Read chunk size for draining the socket.
const READ_CHUNK: usize = 4096;

/// Errors surfaced while servicing one connection. Every variant is fatal
/// to that connection only; the reactor and the other connections survive.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer closed the connection (zero-length read).
    #[error("peer closed the connection")]
    Closed,

    /// The inbound stream violated the framing protocol.
    #[error(transparent)]
    Protocol(#[from] CodecError),

    /// An I/O error other than would-block.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One socket with its buffered read/write state.
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    recv_buf: Vec<u8>,
    send_buf: Vec<u8>,
    decoder: FrameDecoder,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            peer_addr,
            recv_buf: Vec::new(),
            send_buf: Vec::new(),
            decoder: FrameDecoder::new(),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The underlying socket, for registry (de)registration by the reactor.
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Drains all currently available bytes from the socket and returns
    /// every complete frame they finish.
    ///
    /// Readiness is edge-style, so the socket is read until it would block.
    /// A frame is only returned once all of its `content-length` bytes have
    /// actually arrived; it is never partially dispatched.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Closed`] on a zero-length read,
    /// [`ConnectionError::Protocol`] on a framing violation, and
    /// [`ConnectionError::Io`] for any other socket error.
    pub fn on_readable(&mut self) -> Result<Vec<Frame>, ConnectionError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ConnectionError::Closed),
                Ok(n) => self.recv_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        // Several frames may have arrived in one readiness notification;
        // all of them are decoded before control returns to the reactor.
        let mut frames = Vec::new();
        while let Some(frame) = self.decoder.decode(&mut self.recv_buf)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Appends encoded bytes to the send buffer. Call
    /// [`on_writable`](Connection::on_writable) afterwards to push them.
    pub fn queue(&mut self, bytes: &[u8]) {
        self.send_buf.extend_from_slice(bytes);
    }

    /// Pushes as many buffered bytes as the socket accepts, keeping the
    /// unsent suffix for the next writable notification.
    pub fn on_writable(&mut self) -> Result<(), ConnectionError> {
        while !self.send_buf.is_empty() {
            match self.stream.write(&self.send_buf) {
                Ok(0) => return Err(ConnectionError::Closed),
                Ok(n) => {
                    self.send_buf.drain(..n);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn has_pending_write(&self) -> bool {
        !self.send_buf.is_empty()
    }
}
