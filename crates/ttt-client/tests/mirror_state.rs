//! Integration tests for the client mirror.
//!
//! These feed real encoded frames through the codec into the synchronizer
//! (the same path the I/O thread takes) and check the cross-thread wrapper
//! that the menu and output threads rely on.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::json;

use ttt_client::application::{ClientSynchronizer, SharedClientState};
use ttt_core::protocol::codec::{decode_response, encode_response, FrameDecoder};
use ttt_core::protocol::messages::{EventKind, Response};

/// Encodes a response, reassembles it from bytes, and applies it: the full
/// wire path of one inbound server message.
fn apply_over_wire(sync: &mut ClientSynchronizer, response: &Response) {
    let bytes = encode_response(response).expect("encode");
    let mut decoder = FrameDecoder::new();
    let mut buf = bytes;
    let frame = decoder
        .decode(&mut buf)
        .expect("decode")
        .expect("complete frame");
    let decoded = decode_response(&frame).expect("response body");
    sync.apply(&decoded);
}

#[test]
fn test_mirror_reconstructs_a_game_from_the_wire() {
    let mut sync = ClientSynchronizer::new();

    apply_over_wire(
        &mut sync,
        &Response::reply(
            EventKind::Register.into(),
            true,
            json!("\"alice\" has joined the game."),
        ),
    );
    apply_over_wire(
        &mut sync,
        &Response::push(EventKind::PlayerJoined, json!("\"bob\" has joined the game.")),
    );
    apply_over_wire(
        &mut sync,
        &Response::push(EventKind::Start, json!("bob has started the game")),
    );
    apply_over_wire(&mut sync, &Response::push(EventKind::Order, json!("0:X")));
    apply_over_wire(
        &mut sync,
        &Response::push(
            EventKind::BoardUpdate,
            json!([" ", " ", " ", " ", " ", " ", " ", " ", " "]),
        ),
    );

    assert!(sync.is_registered());
    assert!(sync.game_active());
    assert!(sync.my_turn());
    assert_eq!(
        sync.valid_commands(),
        vec![EventKind::Move, EventKind::Stop, EventKind::Deregister]
    );

    // Output arrived in stream order.
    assert_eq!(
        sync.pop_output(),
        Some("\"alice\" has joined the game.".to_string())
    );
    assert_eq!(
        sync.pop_output(),
        Some("\"bob\" has joined the game.".to_string())
    );
    assert_eq!(
        sync.pop_output(),
        Some("bob has started the game".to_string())
    );
    let board_line = sync.pop_output().expect("board rendering");
    assert!(board_line.starts_with("Updated board received:"));
    let turn_line = sync.pop_output().expect("turn notice");
    assert!(turn_line.contains("your turn"));
}

#[test]
fn test_shared_state_wakes_a_waiting_thread_on_apply() {
    let state = Arc::new(SharedClientState::new());

    let waiter = Arc::clone(&state);
    let watcher = thread::spawn(move || {
        // Generous timeout: the main thread applies a message right away.
        waiter.wait_for_change(Duration::from_secs(5))
    });

    // Give the watcher a moment to start waiting.
    thread::sleep(Duration::from_millis(50));
    state.apply(&Response::push(EventKind::PlayerJoined, json!("joined")));

    assert!(
        watcher.join().expect("watcher thread"),
        "the waiting thread must observe the change"
    );
}

#[test]
fn test_shared_state_change_flag_is_consumed_once() {
    let state = SharedClientState::new();
    state.apply(&Response::push(EventKind::PlayerJoined, json!("joined")));

    assert!(state.wait_for_change(Duration::from_millis(10)));
    assert!(
        !state.wait_for_change(Duration::from_millis(10)),
        "the flag is edge-triggered"
    );
}

#[test]
fn test_next_output_drains_lines_then_ends_with_the_connection() {
    let state = Arc::new(SharedClientState::new());
    state.apply(&Response::push(EventKind::PlayerJoined, json!("first")));
    state.apply(&Response::push(EventKind::PlayerLeft, json!("second")));

    let reader = Arc::clone(&state);
    let printer = thread::spawn(move || {
        let mut lines = Vec::new();
        while let Some(line) = reader.next_output() {
            lines.push(line);
        }
        lines
    });

    thread::sleep(Duration::from_millis(50));
    state.mark_connection_closed();

    let lines = printer.join().expect("printer thread");
    assert_eq!(lines[0], "first");
    assert_eq!(lines[1], "second");
    assert_eq!(
        lines.last().map(String::as_str),
        Some("Lost connection to the server."),
        "the disconnect notice is the final line"
    );
}

#[test]
fn test_rejected_start_leaves_the_mirror_inactive() {
    let mut sync = ClientSynchronizer::new();
    apply_over_wire(
        &mut sync,
        &Response::reply(EventKind::Register.into(), true, json!("ok")),
    );
    apply_over_wire(
        &mut sync,
        &Response::reply(
            EventKind::Start.into(),
            false,
            json!("Not enough players have registered to start the game"),
        ),
    );

    assert!(!sync.game_active());
    assert_eq!(sync.valid_commands(), vec![EventKind::Deregister]);
}
