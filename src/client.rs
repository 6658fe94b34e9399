use crate::message::{Message, MessageCodec};
use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::mpsc,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

/// Work posted to the client's I/O task.
#[derive(Debug)]
pub enum Command {
    /// Queue a message for sending.
    Write(Message),

    /// Flush what is queued, then close the connection.
    Close,
}

/// Producer side of a client connection. Usable from any thread: every call
/// only posts a [`Command`] to the task running [`run`].
#[derive(Debug, Clone)]
pub struct Client {
    tx: mpsc::UnboundedSender<Command>,
}

impl Client {
    /// Post `message` to the send queue.
    pub fn write(&self, message: Message) -> anyhow::Result<()> {
        self.post(Command::Write(message))
    }

    /// Post a close after every write posted so far.
    pub fn close(&self) -> anyhow::Result<()> {
        self.post(Command::Close)
    }

    fn post(&self, command: Command) -> anyhow::Result<()> {
        self.tx
            .send(command)
            .map_err(|_| anyhow::anyhow!("Client connection is no longer running"))
    }
}

/// Create a [`Client`] and the command receiver to hand to [`run`].
pub fn channel() -> (Client, mpsc::UnboundedReceiver<Command>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Client { tx }, rx)
}

/// Resolve `host` and connect to the first address that accepts.
pub async fn connect(host: &str, port: u16) -> anyhow::Result<TcpStream> {
    let stream = TcpStream::connect((host, port))
        .await
        .context(format!("Failed to connect to {host}:{port}"))?;
    info!(peer = %stream.peer_addr().context("Failed to read peer address")?, "Connected");
    Ok(stream)
}

/// Drive one connection: surface every decoded frame from `reader` through
/// `on_message`, and write the posted messages onto `writer` in order.
///
/// # Termination
/// If a [`Command::Close`] is processed or every [`Client`] is dropped, the
/// writer is shut down and the future terminates.
/// If EOF is signalled on `reader`, the future terminates.
/// If a frame fails to decode or an I/O error occurs, the future terminates with the error.
pub async fn run<Reader, Writer, F>(
    reader: Reader,
    writer: Writer,
    commands: mpsc::UnboundedReceiver<Command>,
    on_message: F,
) -> anyhow::Result<()>
where
    Reader: AsyncRead + Unpin,
    Writer: AsyncWrite + Unpin,
    F: FnMut(Message),
{
    tokio::select! {
        result = read_frames(reader, on_message) => result.context("Failed to read from server"),
        result = write_frames(writer, commands) => result.context("Failed to write to server"),
    }
}

async fn read_frames<Reader, F>(reader: Reader, mut on_message: F) -> anyhow::Result<()>
where
    Reader: AsyncRead + Unpin,
    F: FnMut(Message),
{
    let mut frames = FramedRead::new(reader, MessageCodec::new());
    while let Some(frame) = frames.next().await {
        let message = frame.map_err(|e| {
            warn!(error = %e, "Closing connection on bad frame");
            e
        })?;
        debug!(body = %String::from_utf8_lossy(message.body()), "Message read");
        on_message(message);
    }
    info!("Server closed the connection");
    Ok(())
}

async fn write_frames<Writer>(
    writer: Writer,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> anyhow::Result<()>
where
    Writer: AsyncWrite + Unpin,
{
    let mut frames = FramedWrite::new(writer, MessageCodec::new());
    while let Some(command) = commands.recv().await {
        match command {
            Command::Write(message) => {
                let body = String::from_utf8_lossy(message.body()).into_owned();
                frames.send(message).await?;
                debug!(body = %body, "Message written");
            }
            Command::Close => break,
        }
    }
    // Flush data in writer.
    frames.close().await?;
    Ok(())
}
