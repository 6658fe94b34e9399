#![warn(missing_docs)]

//! A length-prefixed chat relay built on tokio tasks and channels.
//!
//! Every frame is a 4 byte ASCII decimal body length followed by the body.
//! The server fans each received frame out to every connected session and
//! replays the last hundred frames to newcomers. The client posts writes from
//! any thread to a single I/O task.

use anyhow::Context;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber: formatted output filtered by `RUST_LOG`
/// (default `info`), plus a console layer publishing on `console` if given.
pub fn init_tracing(console: Option<SocketAddr>) -> anyhow::Result<()> {
    let console = console.map(|addr| {
        console_subscriber::ConsoleLayer::builder()
            .retention(Duration::from_secs(60))
            .server_addr(addr)
            .spawn()
    });
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(console)
        .with(fmt::layer().with_filter(filter))
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Command line arguments of the server and client binaries.
pub mod arguments;

/// Connect to a server, post writes from any thread, and surface received messages.
pub mod client;

/// The [`message::Message`] frame and its [`tokio_util::codec`] framing.
pub mod message;

/// Room membership, bounded history, and the task that serializes room updates
/// received over a [`tokio::sync::mpsc`] channel.
pub mod room;

/// Accept loop handing each connection to a session.
pub mod server;

/// Per-connection read and write pipelines.
pub mod session;
