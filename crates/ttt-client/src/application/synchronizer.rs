//! ClientSynchronizer: the mirrored game state and menu derivation.
//!
//! The synchronizer consumes every inbound server message and derives
//! (a) the set of currently valid actions, (b) human-readable output lines,
//! and (c) an edge-triggered "state changed" signal for the menu loop. It
//! never emits network requests itself; it only changes what the console
//! layer is allowed to offer next.
//!
//! # Thread safety
//!
//! One writer (the I/O reactor thread) and two readers (menu and output
//! threads) share the mirror through [`SharedClientState`], a `Mutex` +
//! `Condvar` pair. Each inbound handler commits every related field before
//! the change signal fires, so readers never observe a partial update.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use tracing::warn;

use ttt_core::game::board::{Board, Cell, Symbol};
use ttt_core::protocol::messages::{EventKind, Response};

/// The per-client mirror of the authoritative state.
#[derive(Default)]
pub struct ClientSynchronizer {
    registered: bool,
    register_ack_received: bool,
    game_active: bool,
    /// Another player is present, so START is worth offering.
    can_start: bool,
    board: Option<Board>,
    my_symbol: Option<Symbol>,
    my_turn: bool,
    /// Set after a successful DEREGISTER; the session is over.
    exited: bool,
    /// Set by the I/O thread when the reactor drops the connection.
    connection_closed: bool,
    /// Edge-triggered: reads as true exactly once per change.
    state_changed: bool,
    output_queue: VecDeque<String>,
}

impl ClientSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one server message, updating the mirror and queueing output.
    ///
    /// Every branch sets the change flag, including plain acks: the menu
    /// loop re-derives its options after any inbound message.
    pub fn apply(&mut self, response: &Response) {
        match EventKind::try_from(response.action) {
            Ok(EventKind::Register) => {
                self.registered = response.success;
                self.register_ack_received = true;
                self.push_output(response.text());
            }
            Ok(EventKind::Start) => {
                // A rejected START leaves the game inactive; both the direct
                // ack and the broadcast carry success on a real start.
                if response.success {
                    self.game_active = true;
                }
                self.push_output(response.text());
            }
            Ok(EventKind::Order) => self.apply_order(&response.text()),
            Ok(EventKind::BoardUpdate) => self.apply_board_update(response),
            Ok(EventKind::Fin) => {
                self.game_active = false;
                self.my_symbol = None;
                self.my_turn = false;
                self.board = None;
                self.push_output(response.text());
            }
            Ok(EventKind::PlayerJoined) => {
                self.can_start = true;
                self.push_output(response.text());
            }
            Ok(EventKind::PlayerLeft) => {
                self.can_start = false;
                self.push_output(response.text());
            }
            Ok(EventKind::Deregister) => {
                if response.success {
                    self.registered = false;
                    self.exited = true;
                } else {
                    // A failed deregister leaves the registration standing.
                    self.registered = true;
                }
                self.push_output(response.text());
            }
            Ok(EventKind::Move) | Ok(EventKind::Stop) => {
                // Plain acks: surface the server-supplied reason either way.
                self.push_output(response.text());
            }
            Err(()) => {
                self.push_output(format!("Error: invalid action \"{}\".", response.action));
            }
        }
        self.state_changed = true;
    }

    /// ORDER payload is `"<ordinal>:<symbol>"`; ordinal 0 moves first.
    fn apply_order(&mut self, data: &str) {
        let Some((ordinal, symbol)) = data.split_once(':') else {
            warn!("unparseable turn order payload: {data:?}");
            return;
        };
        self.my_symbol = Symbol::try_from(symbol.trim()).ok();
        self.my_turn = ordinal.trim() == "0";
    }

    fn apply_board_update(&mut self, response: &Response) {
        let board: Board = match serde_json::from_value(response.data.clone()) {
            Ok(board) => board,
            Err(e) => {
                warn!("undecodable board update: {e}");
                return;
            }
        };

        // The first update of a game arrives right after ORDER, which
        // already fixed whose turn it is. Every later update means the
        // other player moved, so the turn flips, unless the board is full
        // and the game is about to end.
        if self.board.is_some() {
            self.my_turn = if board.has_empty_cell() {
                !self.my_turn
            } else {
                false
            };
        }

        self.push_output(format_board(&board));
        if self.my_turn {
            let mark = self.my_symbol.map(Symbol::as_str).unwrap_or("?");
            self.push_output(format!("It is your turn to place \"{mark}\""));
        }
        self.board = Some(board);
    }

    /// The commands the player may submit right now. Evaluated fresh on
    /// every call; no side effects.
    pub fn valid_commands(&self) -> Vec<EventKind> {
        if !self.registered {
            return vec![EventKind::Register];
        }

        let mut commands = Vec::new();
        if self.game_active {
            if self.board.is_some() && self.my_turn {
                commands.push(EventKind::Move);
            }
            commands.push(EventKind::Stop);
        } else if self.can_start {
            commands.push(EventKind::Start);
        }
        commands.push(EventKind::Deregister);
        commands
    }

    /// Edge-triggered read: returns the change flag and clears it.
    pub fn poll_state_changed(&mut self) -> bool {
        std::mem::take(&mut self.state_changed)
    }

    pub fn mark_connection_closed(&mut self) {
        self.connection_closed = true;
        if !self.exited {
            self.push_output("Lost connection to the server.".to_string());
        }
        self.state_changed = true;
    }

    fn push_output(&mut self, line: String) {
        self.output_queue.push_back(line);
    }

    pub fn pop_output(&mut self) -> Option<String> {
        self.output_queue.pop_front()
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn register_ack_received(&self) -> bool {
        self.register_ack_received
    }

    pub fn game_active(&self) -> bool {
        self.game_active
    }

    pub fn can_start(&self) -> bool {
        self.can_start
    }

    pub fn board(&self) -> Option<Board> {
        self.board.clone()
    }

    pub fn my_symbol(&self) -> Option<Symbol> {
        self.my_symbol
    }

    pub fn my_turn(&self) -> bool {
        self.my_turn
    }

    pub fn exited(&self) -> bool {
        self.exited
    }

    pub fn connection_closed(&self) -> bool {
        self.connection_closed
    }
}

// ── Board rendering ───────────────────────────────────────────────────────────

/// Renders a board update for display.
pub fn format_board(board: &Board) -> String {
    let mut rendered = String::from("Updated board received:\n");
    render_cells(&mut rendered, board, |_, cell| {
        cell.as_wire_str().to_string()
    });
    rendered
}

/// Renders the board for the move picker: empty cells show their index.
pub fn format_possible_moves(board: &Board) -> String {
    let mut rendered = String::new();
    render_cells(&mut rendered, board, |index, cell| match cell {
        Cell::Empty => index.to_string(),
        taken => taken.as_wire_str().to_string(),
    });
    rendered
}

fn render_cells(rendered: &mut String, board: &Board, show: impl Fn(usize, Cell) -> String) {
    for (index, cell) in board.cells().iter().enumerate() {
        rendered.push_str(&format!("| {} |", show(index, *cell)));
        if (index + 1) % 3 == 0 {
            rendered.push('\n');
        }
    }
}

// ── Shared wrapper ────────────────────────────────────────────────────────────

/// Thread-safe wrapper around the mirror: one writer, many readers.
#[derive(Default)]
pub struct SharedClientState {
    inner: Mutex<ClientSynchronizer>,
    signal: Condvar,
}

impl SharedClientState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an inbound message and wakes every waiting thread.
    pub fn apply(&self, response: &Response) {
        if let Ok(mut state) = self.inner.lock() {
            state.apply(response);
        }
        self.signal.notify_all();
    }

    pub fn mark_connection_closed(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.mark_connection_closed();
        }
        self.signal.notify_all();
    }

    /// Consumes the edge-triggered change flag, waiting up to `tick` for
    /// one to appear. Returns true when a change was observed.
    pub fn wait_for_change(&self, tick: Duration) -> bool {
        let Ok(state) = self.inner.lock() else {
            return false;
        };
        let mut state = state;
        if state.poll_state_changed() {
            return true;
        }
        match self.signal.wait_timeout(state, tick) {
            Ok((mut state, _)) => state.poll_state_changed(),
            Err(_) => false,
        }
    }

    /// Blocks until an output line is available. Returns `None` once the
    /// session is over (connection closed or exited) and the queue is
    /// drained.
    pub fn next_output(&self) -> Option<String> {
        let Ok(mut state) = self.inner.lock() else {
            return None;
        };
        loop {
            if let Some(line) = state.pop_output() {
                return Some(line);
            }
            if state.connection_closed() || state.exited() {
                return None;
            }
            state = match self.signal.wait(state) {
                Ok(guard) => guard,
                Err(_) => return None,
            };
        }
    }

    /// Runs `f` against the locked mirror.
    pub fn with<T>(&self, f: impl FnOnce(&ClientSynchronizer) -> T) -> Option<T> {
        self.inner.lock().ok().map(|state| f(&state))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
