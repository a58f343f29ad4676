//! ServerSynchronizer: the single authoritative game state.
//!
//! One instance exists per server process, constructed in `main` and
//! injected into the reactor. Every callback runs on the reactor thread, so
//! the entire game state is mutated from exactly one thread and needs no
//! locking. The synchronizer never touches a socket: each request produces
//! the direct reply plus any broadcast/catch-up frames as [`Outbound`]
//! records for the reactor to deliver.
//!
//! # Request lifecycle
//!
//! ```text
//! Reactor ──frame──▶ on_frame ──▶ process_request ──▶ (success, text)
//!                                    │
//!                                    ├─ direct reply to the requester
//!                                    └─ pushes: PLAYER_JOINED / START / ORDER /
//!                                       BOARD_UPDATE / FIN / PLAYER_LEFT
//! ```
//!
//! Broadcast fan-out targets every *registered* identity except an optional
//! excluded one; an empty exclusion reaches all registered players, and
//! private sends (ORDER, catch-up replays) are routed to exactly one.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use ttt_core::game::board::{Board, Symbol};
use ttt_core::net::reactor::{ConnId, FrameDispatch, Outbound};
use ttt_core::protocol::codec::{decode_request, encode_response, CodecError, Frame};
use ttt_core::protocol::messages::{EventKind, Request, Response};

/// A registered player. Registration order matters: the first registrant
/// always plays X when a game starts.
#[derive(Debug, Clone)]
struct RegisteredPlayer {
    id: ConnId,
    name: String,
}

/// Ordinal and symbol held by one player while a game is active.
#[derive(Debug, Clone, Copy)]
struct TurnSlot {
    ordinal: u8,
    symbol: Symbol,
}

/// The authoritative roster, turn order, and board.
#[derive(Default)]
pub struct ServerSynchronizer {
    /// Every live connection, registered or not.
    connected: Vec<ConnId>,
    /// Registered players in registration order; names are unique.
    registered: Vec<RegisteredPlayer>,
    /// Populated only while a game is active; cleared on game end.
    turn_order: HashMap<ConnId, TurnSlot>,
    board: Board,
    /// Identity allowed to move next while a game is active.
    current_turn: Option<ConnId>,
    game_active: bool,
}

impl FrameDispatch for ServerSynchronizer {
    fn on_connected(&mut self, id: ConnId, addr: SocketAddr) -> Vec<Outbound> {
        info!("{id} connected from {addr}");
        self.connected.push(id);
        Vec::new()
    }

    fn on_frame(&mut self, id: ConnId, frame: Frame) -> Result<Vec<Outbound>, CodecError> {
        let request = decode_request(&frame)?;
        Ok(self.process_request(id, request))
    }

    fn on_disconnected(&mut self, id: ConnId) -> Vec<Outbound> {
        self.remove_connected(id)
    }
}

impl ServerSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one client request and returns every frame it produced: the
    /// direct reply first, then broadcasts and private sends.
    pub fn process_request(&mut self, id: ConnId, request: Request) -> Vec<Outbound> {
        let mut pushes = Vec::new();
        let (success, text) = match request.kind() {
            Some(EventKind::Register) => self.register(id, &request.data, &mut pushes),
            Some(EventKind::Deregister) => self.deregister(id, &request.data, &mut pushes),
            Some(EventKind::Start) => self.start(id, &mut pushes),
            Some(EventKind::Stop) => self.stop(id, &mut pushes),
            Some(EventKind::Move) => self.player_move(id, &request.data, &mut pushes),
            _ => (false, format!("Error: invalid action \"{}\".", request.action)),
        };
        info!("{id} action {} -> success={success}: {text}", request.action);

        let reply = Response::reply(request.action, success, Value::String(text));
        let mut out = Vec::with_capacity(1 + pushes.len());
        push_response(&mut out, id, &reply);
        out.extend(pushes);
        out
    }

    /// Reactor-driven disconnect: performs the deregister side effects
    /// without a matching client request.
    pub fn remove_connected(&mut self, id: ConnId) -> Vec<Outbound> {
        self.connected.retain(|&conn| conn != id);
        let mut out = Vec::new();
        self.drop_registration(id, &mut out);
        out
    }

    // ── Request handlers ──────────────────────────────────────────────────────

    fn register(&mut self, id: ConnId, data: &Value, out: &mut Vec<Outbound>) -> (bool, String) {
        info!("processing register request from {id}");
        let name = text_of(data);

        if self.find_registered(id).is_some() {
            return (false, format!("\"{name}\" has already been registered."));
        }
        if self.registered.iter().any(|player| player.name == name) {
            return (
                false,
                format!("\"{name}\" has already been taken as a player name."),
            );
        }

        // Catch-up: a late joiner must learn about every player already
        // present, so replay one PLAYER_JOINED per existing registrant
        // directly to the new client.
        for player in &self.registered {
            let replay = Response::push(
                EventKind::PlayerJoined,
                json!(format!("\"{}\" has joined the game.", player.name)),
            );
            push_response(out, id, &replay);
        }

        self.registered.push(RegisteredPlayer {
            id,
            name: name.clone(),
        });

        let text = format!("\"{name}\" has joined the game.");
        self.broadcast(
            out,
            Some(id),
            &Response::push(EventKind::PlayerJoined, json!(text)),
        );
        (true, text)
    }

    fn deregister(&mut self, id: ConnId, data: &Value, out: &mut Vec<Outbound>) -> (bool, String) {
        info!("processing deregister request from {id}");
        let name = text_of(data);

        // Strict identity-to-name validation: the request must name exactly
        // the registration this connection holds.
        let holds_name = self
            .find_registered(id)
            .map(|player| player.name == name)
            .unwrap_or(false);
        if !holds_name {
            return (false, format!("\"{name}\" was not already registered."));
        }

        self.drop_registration(id, out);
        (true, format!("\"{name}\" has successfully de-registered."))
    }

    fn start(&mut self, id: ConnId, out: &mut Vec<Outbound>) -> (bool, String) {
        info!("processing start request from {id}");
        let Some(starter) = self.find_registered(id) else {
            return (false, "You must register before starting a game.".to_string());
        };
        let starter_name = starter.name.clone();

        if self.registered.len() < 2 {
            return (
                false,
                "Not enough players have registered to start the game".to_string(),
            );
        }
        if self.game_active {
            return (false, "The game has already been started".to_string());
        }

        self.board = Board::new();
        self.game_active = true;

        let text = format!("{starter_name} has started the game");
        self.broadcast(out, Some(id), &Response::push(EventKind::Start, json!(text)));

        // ORDER must reach each player before the shared BOARD_UPDATE so a
        // client already knows its symbol when the first board arrives.
        self.assign_turn_order(out);
        let snapshot = self.board_snapshot();
        self.broadcast(
            out,
            None,
            &Response::push(EventKind::BoardUpdate, snapshot),
        );
        (true, text)
    }

    fn stop(&mut self, id: ConnId, out: &mut Vec<Outbound>) -> (bool, String) {
        info!("processing stop request from {id}");
        if !self.game_active {
            return (false, "The game has not been started yet".to_string());
        }
        let name = self.display_name(id);
        let text = format!("{name} has stopped the game");
        self.end_game(out, text.clone());
        (true, text)
    }

    fn player_move(&mut self, id: ConnId, data: &Value, out: &mut Vec<Outbound>) -> (bool, String) {
        info!("processing move request from {id}");
        if !self.game_active || self.current_turn != Some(id) {
            return (false, "It is not your turn to make a move".to_string());
        }
        let Some(slot) = self.turn_order.get(&id).copied() else {
            return (false, "It is not your turn to make a move".to_string());
        };
        let Some(index) = data.as_u64().map(|cell| cell as usize) else {
            return (false, "A move must be the index of a board cell".to_string());
        };
        if !self.board.place(index, slot.symbol) {
            return (false, format!("{index} is not a cell on the board"));
        }

        let name = self.display_name(id);
        // Snapshot the board at broadcast time so a later move cannot alias
        // into this update.
        let snapshot = self.board_snapshot();
        self.broadcast(
            out,
            None,
            &Response::push(EventKind::BoardUpdate, snapshot),
        );

        if self.board.has_winning_line(slot.symbol) {
            self.end_game(out, format!("{name} has won. Game over."));
        } else if self.board.is_full() {
            self.end_game(out, "DRAW! Game over.".to_string());
        } else {
            self.current_turn = self.other_turn_holder(id);
        }

        (true, format!("{name} placed {} on cell {index}", slot.symbol))
    }

    // ── Shared transitions ────────────────────────────────────────────────────

    /// Removes a registration and performs its side effects: FIN to the
    /// remaining player when a game is active (abnormal exit), PLAYER_LEFT
    /// broadcast otherwise. Shared by DEREGISTER and abrupt disconnects.
    fn drop_registration(&mut self, id: ConnId, out: &mut Vec<Outbound>) {
        let Some(index) = self.registered.iter().position(|player| player.id == id) else {
            return;
        };
        let player = self.registered.remove(index);
        self.turn_order.remove(&id);
        info!("\"{}\" has left the game", player.name);

        if self.game_active {
            // The match cannot continue without this player.
            self.end_game(
                out,
                format!("\"{}\" has left the game. Game over.", player.name),
            );
        } else {
            let text = format!("\"{}\" has left the game.", player.name);
            self.broadcast(out, None, &Response::push(EventKind::PlayerLeft, json!(text)));
        }
    }

    /// Ends the active game: FIN to every registered player, state cleared.
    fn end_game(&mut self, out: &mut Vec<Outbound>, text: String) {
        self.game_active = false;
        self.current_turn = None;
        self.turn_order.clear();
        self.broadcast(out, None, &Response::push(EventKind::Fin, json!(text)));
    }

    /// Randomly assigns ordinals to the first two registrants; the player
    /// registered first always plays X, and whoever draws ordinal 0 moves
    /// first.
    fn assign_turn_order(&mut self, out: &mut Vec<Outbound>) {
        let first_bit = coin_flip();
        let assignments: Vec<(ConnId, u8, Symbol)> = self
            .registered
            .iter()
            .take(2)
            .enumerate()
            .map(|(index, player)| {
                let ordinal = if index == 0 { first_bit } else { 1 - first_bit };
                let symbol = if index == 0 { Symbol::X } else { Symbol::O };
                (player.id, ordinal, symbol)
            })
            .collect();

        for (id, ordinal, symbol) in assignments {
            self.turn_order.insert(id, TurnSlot { ordinal, symbol });
            if ordinal == 0 {
                self.current_turn = Some(id);
            }
            let order = Response::push(EventKind::Order, json!(format!("{ordinal}:{symbol}")));
            push_response(out, id, &order);
        }
    }

    /// Queues `response` for every registered player except `exclude`.
    fn broadcast(&self, out: &mut Vec<Outbound>, exclude: Option<ConnId>, response: &Response) {
        for player in &self.registered {
            if Some(player.id) == exclude {
                continue;
            }
            push_response(out, player.id, response);
        }
    }

    // ── Lookups ───────────────────────────────────────────────────────────────

    fn find_registered(&self, id: ConnId) -> Option<&RegisteredPlayer> {
        self.registered.iter().find(|player| player.id == id)
    }

    fn display_name(&self, id: ConnId) -> String {
        self.find_registered(id)
            .map(|player| player.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn other_turn_holder(&self, id: ConnId) -> Option<ConnId> {
        self.turn_order.keys().find(|&&other| other != id).copied()
    }

    fn board_snapshot(&self) -> Value {
        match serde_json::to_value(&self.board) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("failed to serialize board snapshot: {e}");
                Value::Null
            }
        }
    }

    // ── Introspection (used by the integration tests) ─────────────────────────

    pub fn game_active(&self) -> bool {
        self.game_active
    }

    pub fn current_turn(&self) -> Option<ConnId> {
        self.current_turn
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.registered
            .iter()
            .map(|player| player.name.clone())
            .collect()
    }

    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }
}

fn push_response(out: &mut Vec<Outbound>, to: ConnId, response: &Response) {
    match encode_response(response) {
        Ok(bytes) => out.push(Outbound::new(to, bytes)),
        Err(e) => error!("failed to encode response for {to}: {e}"),
    }
}

fn text_of(data: &Value) -> String {
    match data.as_str() {
        Some(text) => text.to_string(),
        None => {
            warn!("expected a string payload, got {data}");
            data.to_string()
        }
    }
}

/// Picks the random bit for turn assignment.
fn coin_flip() -> u8 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::SystemTime;

    let mut hasher = DefaultHasher::new();
    SystemTime::now().hash(&mut hasher);
    std::process::id().hash(&mut hasher);
    (hasher.finish() & 1) as u8
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ttt_core::protocol::codec::{decode_response, FrameDecoder};

    fn conn(raw: usize) -> ConnId {
        ConnId::new(raw)
    }

    fn decode_all(out: &[Outbound]) -> Vec<(ConnId, Response)> {
        out.iter()
            .map(|record| {
                let mut decoder = FrameDecoder::new();
                let mut buf = record.frame.clone();
                let frame = decoder
                    .decode(&mut buf)
                    .expect("frame decodes")
                    .expect("frame complete");
                (record.to, decode_response(&frame).expect("response body"))
            })
            .collect()
    }

    fn register(sync: &mut ServerSynchronizer, id: ConnId, name: &str) -> Vec<(ConnId, Response)> {
        let out = sync.process_request(id, Request::new(EventKind::Register, json!(name)));
        decode_all(&out)
    }

    #[test]
    fn test_register_succeeds_and_acknowledges() {
        let mut sync = ServerSynchronizer::new();
        let responses = register(&mut sync, conn(2), "alice");

        assert_eq!(responses.len(), 1, "first registrant gets only the ack");
        let (to, ack) = &responses[0];
        assert_eq!(*to, conn(2));
        assert!(ack.success);
        assert_eq!(ack.kind(), Some(EventKind::Register));
        assert_eq!(sync.registered_names(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_register_same_identity_twice_fails() {
        let mut sync = ServerSynchronizer::new();
        register(&mut sync, conn(2), "carol");

        let responses = register(&mut sync, conn(2), "carol");
        let (_, ack) = &responses[0];
        assert!(!ack.success);
        assert!(ack.text().contains("already been registered"));
    }

    #[test]
    fn test_register_taken_name_from_other_identity_fails() {
        let mut sync = ServerSynchronizer::new();
        register(&mut sync, conn(2), "carol");

        let responses = register(&mut sync, conn(3), "carol");
        let (_, ack) = &responses[0];
        assert!(!ack.success);
        assert!(ack.text().contains("already been taken"));
        assert_eq!(sync.registered_names(), vec!["carol".to_string()]);
    }

    #[test]
    fn test_second_registrant_receives_catch_up_replay() {
        let mut sync = ServerSynchronizer::new();
        register(&mut sync, conn(2), "alice");

        let responses = register(&mut sync, conn(3), "bob");

        // Direct ack first, then the catch-up PLAYER_JOINED about alice,
        // then the broadcast to alice about bob.
        assert_eq!(responses[0].0, conn(3));
        assert!(responses[0].1.success);

        let to_bob: Vec<&Response> = responses
            .iter()
            .filter(|(to, _)| *to == conn(3))
            .map(|(_, r)| r)
            .collect();
        assert_eq!(to_bob.len(), 2);
        assert_eq!(to_bob[1].kind(), Some(EventKind::PlayerJoined));
        assert!(to_bob[1].text().contains("alice"));
        assert!(to_bob[1].internal_request);

        let to_alice: Vec<&Response> = responses
            .iter()
            .filter(|(to, _)| *to == conn(2))
            .map(|(_, r)| r)
            .collect();
        assert_eq!(to_alice.len(), 1);
        assert_eq!(to_alice[0].kind(), Some(EventKind::PlayerJoined));
        assert!(to_alice[0].text().contains("bob"));
    }

    #[test]
    fn test_start_fails_with_fewer_than_two_players() {
        let mut sync = ServerSynchronizer::new();
        register(&mut sync, conn(2), "alice");

        let out = sync.process_request(conn(2), Request::new(EventKind::Start, json!("")));
        let responses = decode_all(&out);
        assert!(!responses[0].1.success);
        assert!(!sync.game_active());
    }

    #[test]
    fn test_start_fails_when_game_already_active() {
        let mut sync = ServerSynchronizer::new();
        register(&mut sync, conn(2), "alice");
        register(&mut sync, conn(3), "bob");
        sync.process_request(conn(3), Request::new(EventKind::Start, json!("")));
        assert!(sync.game_active());

        let out = sync.process_request(conn(2), Request::new(EventKind::Start, json!("")));
        let responses = decode_all(&out);
        assert!(!responses[0].1.success);
        assert!(responses[0].1.text().contains("already been started"));
    }

    #[test]
    fn test_move_out_of_turn_is_rejected() {
        let mut sync = ServerSynchronizer::new();
        register(&mut sync, conn(2), "alice");
        register(&mut sync, conn(3), "bob");
        sync.process_request(conn(2), Request::new(EventKind::Start, json!("")));

        let waiting = if sync.current_turn() == Some(conn(2)) {
            conn(3)
        } else {
            conn(2)
        };
        let out = sync.process_request(waiting, Request::new(EventKind::Move, json!(0)));
        let responses = decode_all(&out);
        assert!(!responses[0].1.success);
        assert!(responses[0].1.text().contains("not your turn"));
    }

    #[test]
    fn test_turns_alternate_after_each_move() {
        let mut sync = ServerSynchronizer::new();
        register(&mut sync, conn(2), "alice");
        register(&mut sync, conn(3), "bob");
        sync.process_request(conn(2), Request::new(EventKind::Start, json!("")));

        let first = sync.current_turn().expect("a player holds the turn");
        let second = if first == conn(2) { conn(3) } else { conn(2) };

        sync.process_request(first, Request::new(EventKind::Move, json!(0)));
        assert_eq!(sync.current_turn(), Some(second));

        sync.process_request(second, Request::new(EventKind::Move, json!(4)));
        assert_eq!(sync.current_turn(), Some(first));
    }

    #[test]
    fn test_deregister_with_wrong_name_fails() {
        let mut sync = ServerSynchronizer::new();
        register(&mut sync, conn(2), "alice");

        let out = sync.process_request(conn(2), Request::new(EventKind::Deregister, json!("bob")));
        let responses = decode_all(&out);
        assert!(!responses[0].1.success);
        assert_eq!(sync.registered_names(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_deregister_when_not_registered_fails() {
        let mut sync = ServerSynchronizer::new();
        let out = sync.process_request(conn(5), Request::new(EventKind::Deregister, json!("ghost")));
        let responses = decode_all(&out);
        assert!(!responses[0].1.success);
        assert!(responses[0].1.text().contains("not already registered"));
    }

    #[test]
    fn test_deregister_outside_game_broadcasts_player_left() {
        let mut sync = ServerSynchronizer::new();
        register(&mut sync, conn(2), "alice");
        register(&mut sync, conn(3), "bob");

        let out =
            sync.process_request(conn(2), Request::new(EventKind::Deregister, json!("alice")));
        let responses = decode_all(&out);

        assert!(responses[0].1.success);
        let to_bob: Vec<&Response> = responses
            .iter()
            .filter(|(to, _)| *to == conn(3))
            .map(|(_, r)| r)
            .collect();
        assert_eq!(to_bob.len(), 1);
        assert_eq!(to_bob[0].kind(), Some(EventKind::PlayerLeft));
    }

    #[test]
    fn test_unknown_action_fails_without_closing_anything() {
        let mut sync = ServerSynchronizer::new();
        let out = sync.process_request(conn(2), Request { action: 42, data: json!(null) });
        let responses = decode_all(&out);
        assert!(!responses[0].1.success);
        assert!(responses[0].1.text().contains("invalid action \"42\""));
    }

    #[test]
    fn test_stop_without_active_game_fails() {
        let mut sync = ServerSynchronizer::new();
        register(&mut sync, conn(2), "alice");
        let out = sync.process_request(conn(2), Request::new(EventKind::Stop, json!("")));
        let responses = decode_all(&out);
        assert!(!responses[0].1.success);
        assert!(responses[0].1.text().contains("not been started"));
    }
}
