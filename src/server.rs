use crate::room::{self, RoomHandle, SessionId, HISTORY_CAPACITY};
use crate::session;
use anyhow::Context;
use std::{net::SocketAddr, time::Duration};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

/// Default bound on each session's send queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Pause before accepting again after a failed accept.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accepts connections and joins each one to a single room.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    queue_capacity: usize,
}

impl Server {
    /// Bind the listening socket. Failing to bind is fatal to the caller.
    ///
    /// `queue_capacity` is raised to fit a full history replay if needed.
    pub async fn bind<A>(addr: A, queue_capacity: usize) -> anyhow::Result<Self>
    where
        A: ToSocketAddrs + std::fmt::Debug,
    {
        let listener = TcpListener::bind(&addr)
            .await
            .context(format!("Failed to bind on {:?}", addr))?;
        Ok(Self {
            listener,
            queue_capacity: queue_capacity.max(HISTORY_CAPACITY + 1),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Start the room task and accept connections forever.
    ///
    /// A failed accept is logged and the loop keeps going.
    pub async fn run(self) -> anyhow::Result<()> {
        let (room, rx) = room::channel(64);
        tokio::spawn(room::serve(rx));

        info!(address = %self.local_addr()?, "Server started");

        let mut next_id: SessionId = 0;
        loop {
            let (socket, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Failed to accept on socket");
                    // Persistent errors such as EMFILE would otherwise spin.
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };
            next_id += 1;
            info!(session = next_id, peer = %addr, "Accepted connection");
            spawn_session(next_id, socket, room.clone(), self.queue_capacity);
        }
    }
}

fn spawn_session(id: SessionId, mut socket: TcpStream, room: RoomHandle, queue_capacity: usize) {
    tokio::spawn(async move {
        let (reader, writer) = socket.split();
        if let Err(e) =
            session::handle_connection(id, reader, writer, room, queue_capacity).await
        {
            debug!(session = id, error = %format!("{e:#}"), "Session ended with error");
        }
    });
}
