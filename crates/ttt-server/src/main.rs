//! TTT-Over-TCP server entry point.
//!
//! Parses the listening port, initialises logging, builds the one
//! authoritative [`ServerSynchronizer`], and injects it into the reactor.
//! The reactor loop runs until the process is terminated.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ttt_core::net::reactor::Reactor;
use ttt_server::application::ServerSynchronizer;

/// Authoritative tic-tac-toe game server.
#[derive(Debug, Parser)]
#[command(name = "ttt-server")]
struct Args {
    /// TCP port to listen on.
    port: u16,
}

fn main() -> anyhow::Result<()> {
    // Initialise structured logging. Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.port);

    info!("starting tic-tac-toe server");
    let mut synchronizer = ServerSynchronizer::new();
    let mut reactor =
        Reactor::with_listener(addr).with_context(|| format!("failed to listen on {addr}"))?;

    info!("listening on {addr}");
    println!("Server has started");

    reactor
        .run(&mut synchronizer)
        .context("server reactor failed")?;
    Ok(())
}
