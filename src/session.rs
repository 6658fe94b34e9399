use crate::{
    message::{Message, MessageCodec},
    room::{RoomHandle, SessionId},
};
use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

/// Join the `room`, then run the read and write pipelines of one connection
/// until either of them stops.
///
/// The read pipeline decodes frames from `reader` and hands each to the room.
/// The write pipeline drains this session's send queue (bounded by
/// `queue_capacity`) onto `writer`, one frame at a time and in queue order.
///
/// # Termination
/// If EOF is signalled on `reader`, or a frame fails to decode, or any I/O
/// error occurs, or the room drops the send queue, leave the room and
/// terminate. Messages still queued are discarded.
pub async fn handle_connection<Reader, Writer>(
    id: SessionId,
    reader: Reader,
    writer: Writer,
    room: RoomHandle,
    queue_capacity: usize,
) -> anyhow::Result<()>
where
    Reader: AsyncRead + Unpin,
    Writer: AsyncWrite + Unpin,
{
    let (queue, rx) = mpsc::channel(queue_capacity);
    room.join(id, queue).await.context("Failed to join the room")?;

    let outcome = tokio::select! {
        result = read_frames(id, reader, &room) => result.context("Failed to read from peer"),
        result = write_frames(id, writer, rx) => result.context("Failed to write to peer"),
    };

    room.leave(id).await.context("Failed to leave the room")?;
    let remaining = room.members().await?;
    info!(session = id, remaining, "Session closed");
    outcome
}

async fn read_frames<Reader>(
    id: SessionId,
    reader: Reader,
    room: &RoomHandle,
) -> anyhow::Result<()>
where
    Reader: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, MessageCodec::new());
    while let Some(frame) = frames.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                warn!(session = id, error = %e, "Closing connection on bad frame");
                return Err(e.into());
            }
        };
        debug!(session = id, body = %String::from_utf8_lossy(message.body()), "Message read");
        room.deliver(message).await?;
    }
    Ok(()) // EOF detected.
}

async fn write_frames<Writer>(
    id: SessionId,
    writer: Writer,
    mut rx: mpsc::Receiver<Message>,
) -> anyhow::Result<()>
where
    Writer: AsyncWrite + Unpin,
{
    let mut frames = FramedWrite::new(writer, MessageCodec::new());
    while let Some(message) = rx.recv().await {
        let body = String::from_utf8_lossy(message.body()).into_owned();
        frames.send(message).await?;
        debug!(session = id, body = %body, "Message written");
    }
    Ok(())
}
