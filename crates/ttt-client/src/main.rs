//! TTT-Over-TCP client entry point.
//!
//! Wires the reactor, the mirror state, and the console threads together.
//!
//! # Threading model
//!
//! ```text
//! main()
//!  ├─ I/O thread      -- reactor: owns the socket, decodes/encodes frames
//!  ├─ stdin thread    -- blocks on user input, feeds a channel
//!  ├─ output thread   -- prints queued server lines
//!  └─ menu loop       -- prompts, validates, submits requests (main thread)
//! ```
//!
//! Transport details go to the log file so the interactive console only
//! ever shows game output and prompts.

use std::fs::File;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ttt_client::application::SharedClientState;
use ttt_client::infrastructure::console::{run_output_loop, spawn_input_thread, MenuLoop};
use ttt_client::infrastructure::network::{MirrorDispatch, RequestSender};
use ttt_core::net::reactor::Reactor;

/// How often the reactor wakes for housekeeping when idle.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Interactive tic-tac-toe client.
#[derive(Debug, Parser)]
#[command(name = "ttt-client")]
struct Args {
    /// Server IP address.
    #[arg(short = 'i', long = "ip")]
    ip: IpAddr,
    /// Server TCP port.
    #[arg(short = 'p', long = "port")]
    port: u16,
    /// Log file path.
    #[arg(long, default_value = "ttt-client.log")]
    log_file: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_file = File::create(&args.log_file)
        .with_context(|| format!("failed to create log file {}", args.log_file))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .init();

    let addr = SocketAddr::new(args.ip, args.port);
    info!("starting tic-tac-toe client, connecting to {addr}");

    let mut reactor = Reactor::new(Some(POLL_TIMEOUT)).context("failed to create reactor")?;
    let server = reactor
        .connect(addr)
        .with_context(|| format!("failed to connect to {addr}"))?;
    let sender = RequestSender::new(reactor.handle(), server);

    let state = Arc::new(SharedClientState::new());

    let io_state = Arc::clone(&state);
    let io_thread = thread::spawn(move || {
        let mut dispatch = MirrorDispatch::new(io_state);
        if let Err(e) = reactor.run(&mut dispatch) {
            error!("client reactor failed: {e}");
        }
    });

    let output_state = Arc::clone(&state);
    let output_thread = thread::spawn(move || run_output_loop(output_state));

    let (lines, _input_thread) = spawn_input_thread();

    let mut menu = MenuLoop::new(Arc::clone(&state), sender, lines);
    menu.run();

    io_thread.join().ok();
    output_thread.join().ok();
    // The stdin thread may still be blocked on a read; it dies with the
    // process instead of being joined.
    info!("client exiting");
    Ok(())
}
