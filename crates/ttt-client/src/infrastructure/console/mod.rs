//! Console front end: stdin collection, the interactive menu loop, and the
//! server-output printer.
//!
//! Three loops cooperate around [`SharedClientState`]:
//!
//! - [`spawn_input_thread`] blocks on stdin and forwards complete lines into
//!   a channel, so typing never stalls the I/O reactor.
//! - [`MenuLoop::run`] owns the prompt/response cycle: it derives the valid
//!   commands from the mirror, validates the selection, submits the request,
//!   and soft-waits for the resulting state change.
//! - [`run_output_loop`] prints queued server lines as they arrive.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::json;
use tracing::warn;

use ttt_core::protocol::messages::{EventKind, Request};

use crate::application::{format_possible_moves, SharedClientState};
use crate::infrastructure::network::RequestSender;

/// Ticks of [`WAIT_TICK`] before asking whether to keep waiting.
const WAIT_TICKS: u32 = 30;
/// Length of one soft-wait tick.
const WAIT_TICK: Duration = Duration::from_secs(1);
/// A progress notice is printed every this many ticks.
const WAIT_NOTICE_TICKS: u32 = 5;

/// Reads stdin lines into a channel so user input never blocks the reactor.
pub fn spawn_input_thread() -> (Receiver<String>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("stdin read failed: {e}");
                    break;
                }
            }
        }
    });
    (rx, handle)
}

/// Prints queued server output until the session ends.
pub fn run_output_loop(state: Arc<SharedClientState>) {
    while let Some(line) = state.next_output() {
        println!("{line}");
    }
}

/// The interactive prompt/response cycle.
pub struct MenuLoop {
    state: Arc<SharedClientState>,
    sender: RequestSender,
    lines: Receiver<String>,
    /// The name this client last submitted in a REGISTER, echoed back in
    /// DEREGISTER so the server can validate the binding.
    last_name: Option<String>,
    stdin_closed: bool,
}

impl MenuLoop {
    pub fn new(state: Arc<SharedClientState>, sender: RequestSender, lines: Receiver<String>) -> Self {
        Self {
            state,
            sender,
            lines,
            last_name: None,
            stdin_closed: false,
        }
    }

    /// Runs until the player deregisters, the connection drops, or stdin
    /// closes. Asks the reactor to shut down on the way out.
    pub fn run(&mut self) {
        let mut initial_register_sent = false;
        loop {
            if self.finished() {
                break;
            }

            let request = if !initial_register_sent {
                initial_register_sent = true;
                self.prompt_register()
            } else if self.needs_new_name() {
                println!("Player name already registered, please pick a different name");
                self.prompt_register()
            } else if self.is_registered() {
                self.prompt_menu()
            } else {
                // Register ack still in flight; wait for the next change.
                None
            };

            if self.finished() {
                break;
            }
            if let Some(request) = request {
                self.sender.send(&request);
            }
            if !self.await_update() {
                break;
            }
        }
        self.sender.shutdown();
    }

    // ── Prompts ───────────────────────────────────────────────────────────────

    fn prompt_register(&mut self) -> Option<Request> {
        println!("What would you like your player name to be?");
        let name = self.read_line()?.trim().to_string();
        self.last_name = Some(name.clone());
        Some(Request::new(EventKind::Register, json!(name)))
    }

    fn prompt_menu(&mut self) -> Option<Request> {
        let commands = self.state.with(|s| s.valid_commands()).unwrap_or_default();
        if commands.is_empty() {
            return None;
        }

        let mut prompt = String::from("What would you like to do?\n");
        for (index, command) in commands.iter().enumerate() {
            prompt.push_str(&format!("\"{index}\". \"{command}\"\n"));
        }
        println!("{prompt}");

        loop {
            let line = self.read_line()?;
            match line.trim().parse::<usize>() {
                Ok(choice) if choice < commands.len() => {
                    return self.build_request(commands[choice]);
                }
                Ok(_) => println!(
                    "That's not a valid option, please input a number between 0 and {}",
                    commands.len() - 1
                ),
                Err(_) => println!("That's not a valid option, please input a number"),
            }
        }
    }

    fn build_request(&mut self, command: EventKind) -> Option<Request> {
        match command {
            EventKind::Register => self.prompt_register(),
            EventKind::Start => Some(Request::new(EventKind::Start, json!(""))),
            EventKind::Stop => Some(Request::new(EventKind::Stop, json!(""))),
            EventKind::Move => self.prompt_move(),
            EventKind::Deregister => {
                let name = self.last_name.clone().unwrap_or_default();
                Some(Request::new(EventKind::Deregister, json!(name)))
            }
            _ => None,
        }
    }

    /// Shows the possible-moves board and reads a valid empty-cell index.
    fn prompt_move(&mut self) -> Option<Request> {
        let Some(board) = self.state.with(|s| s.board()).flatten() else {
            println!("No board has been received yet");
            return None;
        };
        println!("{}", format_possible_moves(&board));
        let open_cells = board.empty_cells();

        loop {
            println!("Select a spot that you would like to place your next move:");
            let line = self.read_line()?;
            let condensed: String = line.split_whitespace().collect();
            match condensed.parse::<usize>() {
                Ok(cell) if open_cells.contains(&cell) => {
                    return Some(Request::new(EventKind::Move, json!(cell)));
                }
                _ => println!("That's not a valid move, please try again"),
            }
        }
    }

    // ── Waiting ───────────────────────────────────────────────────────────────

    /// Soft-waits for the next state change: up to 30 one-second ticks with
    /// a progress notice every 5, then asks whether to keep waiting. This is
    /// advisory UI behavior only; the connection has no protocol timeout.
    ///
    /// Returns false when the session ended while waiting.
    fn await_update(&mut self) -> bool {
        let mut ticks = 0u32;
        loop {
            if self.finished() {
                return false;
            }
            if self.state.wait_for_change(WAIT_TICK) {
                return true;
            }

            ticks += 1;
            if ticks < WAIT_TICKS && ticks % WAIT_NOTICE_TICKS == 0 {
                println!("Waiting for updates from server");
            }
            if ticks == WAIT_TICKS {
                println!(
                    "Timed out waiting for new updates from server, \
                     would you like to keep waiting for updates? (y/n)"
                );
                loop {
                    let Some(answer) = self.read_line() else {
                        return false;
                    };
                    match answer.trim().to_lowercase().as_str() {
                        "y" => {
                            ticks = 0;
                            break;
                        }
                        // Back to the menu without an update.
                        "n" => return true,
                        _ => println!("Invalid option, select y for yes or n for no"),
                    }
                }
            }
        }
    }

    // ── State checks ──────────────────────────────────────────────────────────

    fn read_line(&mut self) -> Option<String> {
        match self.lines.recv() {
            Ok(line) => Some(line),
            Err(_) => {
                self.stdin_closed = true;
                None
            }
        }
    }

    fn finished(&self) -> bool {
        self.stdin_closed
            || self
                .state
                .with(|s| s.exited() || s.connection_closed())
                .unwrap_or(true)
    }

    fn is_registered(&self) -> bool {
        self.state.with(|s| s.is_registered()).unwrap_or(false)
    }

    fn needs_new_name(&self) -> bool {
        self.state
            .with(|s| !s.is_registered() && s.register_ack_received())
            .unwrap_or(false)
    }
}
