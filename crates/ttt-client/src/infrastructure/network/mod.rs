//! Network wiring for the client.
//!
//! Connects the shared reactor to the mirror state: inbound frames are
//! decoded and applied to the [`SharedClientState`], and a [`RequestSender`]
//! lets the menu thread queue outbound requests without ever touching the
//! socket.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, error, info};

use ttt_core::net::reactor::{ConnId, FrameDispatch, Outbound, ReactorHandle};
use ttt_core::protocol::codec::{decode_response, encode_request, CodecError, Frame};
use ttt_core::protocol::messages::Request;

use crate::application::SharedClientState;

/// Reactor callbacks that feed the mirror state.
pub struct MirrorDispatch {
    state: Arc<SharedClientState>,
}

impl MirrorDispatch {
    pub fn new(state: Arc<SharedClientState>) -> Self {
        Self { state }
    }
}

impl FrameDispatch for MirrorDispatch {
    fn on_connected(&mut self, id: ConnId, addr: SocketAddr) -> Vec<Outbound> {
        info!("{id}: connection to {addr} established");
        Vec::new()
    }

    fn on_frame(&mut self, _id: ConnId, frame: Frame) -> Result<Vec<Outbound>, CodecError> {
        let response = decode_response(&frame)?;
        debug!("received server message: {response:?}");
        self.state.apply(&response);
        Ok(Vec::new())
    }

    fn on_disconnected(&mut self, id: ConnId) -> Vec<Outbound> {
        info!("{id}: connection closed");
        self.state.mark_connection_closed();
        Vec::new()
    }
}

/// Sends encoded requests into the reactor from the menu thread.
#[derive(Clone)]
pub struct RequestSender {
    handle: ReactorHandle,
    server: ConnId,
}

impl RequestSender {
    pub fn new(handle: ReactorHandle, server: ConnId) -> Self {
        Self { handle, server }
    }

    /// Encodes and queues one request for the server connection.
    pub fn send(&self, request: &Request) {
        debug!("sending request to server: {request:?}");
        match encode_request(request) {
            Ok(bytes) => self.handle.send(self.server, bytes),
            Err(e) => error!("failed to encode request: {e}"),
        }
    }

    /// Asks the reactor to close the connection and return.
    pub fn shutdown(&self) {
        self.handle.shutdown();
    }
}
