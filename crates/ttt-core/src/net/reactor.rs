//! Single-threaded readiness reactor built on `mio`.
//!
//! The reactor is the sole owner of socket lifecycle: it accepts, registers,
//! services, and closes connections, and hands every completed frame to an
//! injected [`FrameDispatch`] implementation. Application logic never
//! touches a socket: each callback answers with [`Outbound`] records that
//! the reactor copies onto the right connection's send buffer and flushes.
//!
//! # Event flow
//!
//! ```text
//! poll() ──▶ listener readable ──▶ accept + register + on_connected
//!        ──▶ waker              ──▶ drain the cross-thread outbox
//!        ──▶ connection ready   ──▶ on_readable / on_writable
//!                                     └─ frames ──▶ on_frame ──▶ Outbound
//! ```
//!
//! A failure while servicing one connection (protocol violation, I/O error,
//! peer close) closes and deregisters only that connection; the loop itself
//! never aborts for a single connection. With a listening socket the loop
//! runs until the process terminates; without one it ends when the last
//! connection closes or [`ReactorHandle::shutdown`] is called.
//!
//! Readiness is edge-style: freshly queued bytes are flushed eagerly
//! because a writable event only fires again after the socket was full.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, error, info, warn};

use crate::net::connection::{Connection, ConnectionError};
use crate::protocol::codec::{CodecError, Frame};

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);
const FIRST_CONNECTION_TOKEN: usize = 2;
const EVENT_CAPACITY: usize = 128;

// ── Identity ──────────────────────────────────────────────────────────────────

/// Opaque identity of one connection, stable for the connection's lifetime.
///
/// Tokens are never reused within a reactor's lifetime, so maps keyed by
/// `ConnId` cannot confuse an old connection with a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(usize);

impl ConnId {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

impl From<Token> for ConnId {
    fn from(token: Token) -> Self {
        Self(token.0)
    }
}

impl From<ConnId> for Token {
    fn from(id: ConnId) -> Self {
        Token(id.0)
    }
}

// ── Dispatch interface ────────────────────────────────────────────────────────

/// One encoded frame addressed to one connection.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: ConnId,
    pub frame: Vec<u8>,
}

impl Outbound {
    pub fn new(to: ConnId, frame: Vec<u8>) -> Self {
        Self { to, frame }
    }
}

/// Application-side handler driven by the reactor.
///
/// Every callback runs on the reactor thread, so state touched only here
/// needs no locking. This is what keeps the server synchronizer lock-free.
pub trait FrameDispatch {
    /// A connection was accepted (server) or established (client).
    fn on_connected(&mut self, id: ConnId, addr: SocketAddr) -> Vec<Outbound>;

    /// A complete frame arrived. Returning `Err` marks it a protocol
    /// violation: the reactor closes this connection, and only it.
    fn on_frame(&mut self, id: ConnId, frame: Frame) -> Result<Vec<Outbound>, CodecError>;

    /// The connection is gone (peer close, protocol violation, I/O error,
    /// or shutdown). Returned records go to the surviving connections.
    fn on_disconnected(&mut self, id: ConnId) -> Vec<Outbound>;
}

// ── Cross-thread handle ───────────────────────────────────────────────────────

/// Cross-thread handle into a running reactor.
///
/// [`send`](ReactorHandle::send) enqueues an encoded frame for a connection
/// and wakes the poll loop; [`shutdown`](ReactorHandle::shutdown) asks the
/// loop to close every connection and return. This is how the client's menu
/// thread reaches the I/O thread without ever touching the socket.
#[derive(Clone)]
pub struct ReactorHandle {
    waker: Arc<Waker>,
    outbox: Arc<Mutex<VecDeque<Outbound>>>,
    shutdown: Arc<AtomicBool>,
}

impl ReactorHandle {
    pub fn send(&self, to: ConnId, frame: Vec<u8>) {
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.push_back(Outbound::new(to, frame));
        }
        if let Err(e) = self.waker.wake() {
            warn!("reactor waker failed: {e}");
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Err(e) = self.waker.wake() {
            warn!("reactor waker failed: {e}");
        }
    }
}

// ── Reactor ───────────────────────────────────────────────────────────────────

/// The readiness loop and its registration table.
pub struct Reactor {
    poll: Poll,
    events: Events,
    listener: Option<TcpListener>,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    timeout: Option<Duration>,
    waker: Arc<Waker>,
    outbox: Arc<Mutex<VecDeque<Outbound>>>,
    shutdown: Arc<AtomicBool>,
}

impl Reactor {
    /// Creates a reactor with no listening socket (client side).
    ///
    /// `timeout` bounds each poll so housekeeping (shutdown checks) runs
    /// even when no socket becomes ready.
    pub fn new(timeout: Option<Duration>) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener: None,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
            timeout,
            waker,
            outbox: Arc::new(Mutex::new(VecDeque::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Creates a reactor that owns a listening socket (server side).
    ///
    /// The listener is a special registration whose readiness means
    /// "accept, construct a connection, register it".
    pub fn with_listener(addr: SocketAddr) -> io::Result<Self> {
        let mut reactor = Self::new(None)?;
        let mut listener = TcpListener::bind(addr)?;
        reactor
            .poll
            .registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        reactor.listener = Some(listener);
        Ok(reactor)
    }

    /// The listener's bound address, when one exists (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Starts a non-blocking connect and registers the new connection.
    ///
    /// The connection may still be in progress when this returns; queued
    /// bytes are flushed once the socket reports writable.
    pub fn connect(&mut self, addr: SocketAddr) -> io::Result<ConnId> {
        let mut stream = TcpStream::connect(addr)?;
        let token = self.alloc_token();
        self.poll.registry().register(
            &mut stream,
            token,
            Interest::READABLE | Interest::WRITABLE,
        )?;
        self.connections.insert(token, Connection::new(stream, addr));
        info!("starting connection to {addr}");
        Ok(ConnId::from(token))
    }

    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            waker: Arc::clone(&self.waker),
            outbox: Arc::clone(&self.outbox),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Runs the readiness loop until shutdown is requested or, when no
    /// listener is held, the last connection closes.
    pub fn run(&mut self, dispatch: &mut dyn FrameDispatch) -> io::Result<()> {
        // Announce connections made before the loop started (client side).
        let preconnected: Vec<(Token, SocketAddr)> = self
            .connections
            .iter()
            .map(|(token, conn)| (*token, conn.peer_addr()))
            .collect();
        for (token, addr) in preconnected {
            let records = dispatch.on_connected(ConnId::from(token), addr);
            self.deliver(records, dispatch);
        }

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("reactor shutdown requested");
                self.close_all(dispatch);
                return Ok(());
            }

            if let Err(e) = self.poll.poll(&mut self.events, self.timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }

            let ready: Vec<(Token, bool, bool)> = self
                .events
                .iter()
                .map(|event| (event.token(), event.is_readable(), event.is_writable()))
                .collect();

            for (token, readable, writable) in ready {
                match token {
                    LISTENER_TOKEN => self.accept_pending(dispatch),
                    WAKER_TOKEN => {}
                    token => self.service(token, readable, writable, dispatch),
                }
            }

            self.drain_outbox(dispatch);

            if self.listener.is_none() && self.connections.is_empty() {
                debug!("no connections left; reactor loop ending");
                return Ok(());
            }
        }
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Accepts every pending connection on the listener.
    fn accept_pending(&mut self, dispatch: &mut dyn FrameDispatch) {
        loop {
            let accepted = match self.listener.as_ref() {
                Some(listener) => listener.accept(),
                None => return,
            };
            match accepted {
                Ok((mut stream, addr)) => {
                    let token = self.alloc_token();
                    if let Err(e) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        error!("failed to register connection from {addr}: {e}");
                        continue;
                    }
                    info!("accepted connection from {addr}");
                    self.connections.insert(token, Connection::new(stream, addr));
                    let records = dispatch.on_connected(ConnId::from(token), addr);
                    self.deliver(records, dispatch);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("accept failed: {e}");
                    return;
                }
            }
        }
    }

    /// Services one ready connection.
    fn service(
        &mut self,
        token: Token,
        readable: bool,
        writable: bool,
        dispatch: &mut dyn FrameDispatch,
    ) {
        if writable {
            let flushed = match self.connections.get_mut(&token) {
                Some(conn) => conn.on_writable(),
                None => return,
            };
            if let Err(e) = flushed {
                self.close(token, dispatch, &e);
                return;
            }
        }

        if readable {
            let drained = match self.connections.get_mut(&token) {
                Some(conn) => conn.on_readable(),
                None => return,
            };
            match drained {
                Ok(frames) => {
                    for frame in frames {
                        match dispatch.on_frame(ConnId::from(token), frame) {
                            Ok(records) => self.deliver(records, dispatch),
                            Err(e) => {
                                self.close(token, dispatch, &ConnectionError::Protocol(e));
                                return;
                            }
                        }
                    }
                }
                Err(e) => self.close(token, dispatch, &e),
            }
        }
    }

    /// Queues outbound frames on their target connections and flushes
    /// eagerly.
    fn deliver(&mut self, records: Vec<Outbound>, dispatch: &mut dyn FrameDispatch) {
        for record in records {
            let token = Token::from(record.to);
            let flushed = match self.connections.get_mut(&token) {
                Some(conn) => {
                    conn.queue(&record.frame);
                    conn.on_writable()
                }
                None => {
                    debug!("dropping outbound frame for closed {}", record.to);
                    continue;
                }
            };
            if let Err(e) = flushed {
                self.close(token, dispatch, &e);
            }
        }
    }

    /// Pulls frames queued by [`ReactorHandle::send`] into the loop.
    fn drain_outbox(&mut self, dispatch: &mut dyn FrameDispatch) {
        loop {
            let record = match self.outbox.lock() {
                Ok(mut outbox) => outbox.pop_front(),
                Err(_) => return,
            };
            match record {
                Some(record) => self.deliver(vec![record], dispatch),
                None => return,
            }
        }
    }

    /// Closes one connection and delivers its disconnect side effects to
    /// the survivors.
    fn close(&mut self, token: Token, dispatch: &mut dyn FrameDispatch, reason: &ConnectionError) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };
        let id = ConnId::from(token);
        match reason {
            ConnectionError::Closed => info!("{id} ({}) disconnected", conn.peer_addr()),
            other => warn!("closing {id} ({}): {other}", conn.peer_addr()),
        }
        if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
            error!("failed to deregister {id}: {e}");
        }
        let records = dispatch.on_disconnected(id);
        self.deliver(records, dispatch);
    }

    /// Shutdown path: flush what we can, then drop every connection.
    fn close_all(&mut self, dispatch: &mut dyn FrameDispatch) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            if let Some(mut conn) = self.connections.remove(&token) {
                let _ = conn.on_writable();
                if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
                    error!("failed to deregister {}: {e}", ConnId::from(token));
                }
                let _ = dispatch.on_disconnected(ConnId::from(token));
            }
        }
    }
}
