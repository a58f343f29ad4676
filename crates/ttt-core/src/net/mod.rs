//! Socket-facing networking shared by the server and client: the
//! per-connection buffer handler and the single-threaded readiness reactor.

pub mod connection;
pub mod reactor;

pub use connection::{Connection, ConnectionError};
pub use reactor::{ConnId, FrameDispatch, Outbound, Reactor, ReactorHandle};
