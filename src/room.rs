use crate::message::Message;
use anyhow::Context;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Number of recent messages replayed to a member when it joins.
pub const HISTORY_CAPACITY: usize = 100;

/// Identifies one connection for as long as the server runs.
pub type SessionId = u64;

/// Anything that can be handed a message by the room.
pub trait Participant {
    /// Queue `message` for transmission. An error means the participant can
    /// take no more messages and should be dropped from the room.
    fn deliver(&self, message: &Message) -> anyhow::Result<()>;
}

/// A session's send queue: the room holds the sending half, the session's
/// write pipeline drains the receiving half in order.
impl Participant for mpsc::Sender<Message> {
    fn deliver(&self, message: &Message) -> anyhow::Result<()> {
        self.try_send(message.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => anyhow::anyhow!("send queue is full"),
            mpsc::error::TrySendError::Closed(_) => anyhow::anyhow!("send queue is closed"),
        })
    }
}

/// Membership set plus a bounded history of recently delivered messages.
#[derive(Debug)]
pub struct Room<P> {
    members: BTreeMap<SessionId, P>,
    history: VecDeque<Message>,
}

impl<P: Participant> Room<P> {
    /// An empty room with no history.
    pub fn new() -> Self {
        Self {
            members: BTreeMap::new(),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Add `participant` and replay the history to it, oldest first.
    ///
    /// A participant that cannot take the replay is not kept.
    pub fn join(&mut self, id: SessionId, participant: P) {
        for message in &self.history {
            if let Err(e) = participant.deliver(message) {
                warn!(session = id, error = %e, "Dropping member during history replay");
                return;
            }
        }
        info!(session = id, replayed = self.history.len(), "Room join");
        self.members.insert(id, participant);
    }

    /// Remove a member. Returns whether it was present; leaving twice is harmless.
    pub fn leave(&mut self, id: SessionId) -> bool {
        let removed = self.members.remove(&id).is_some();
        if removed {
            info!(session = id, "Room leave");
        }
        removed
    }

    /// Record `message` in the history and queue it on every current member.
    ///
    /// Members whose queue rejects the message are removed.
    pub fn deliver(&mut self, message: &Message) {
        self.history.push_back(message.clone());
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }

        let mut rejected = Vec::new();
        for (id, participant) in &self.members {
            if let Err(e) = participant.deliver(message) {
                warn!(session = *id, error = %e, "Dropping member that cannot keep up");
                rejected.push(*id);
            }
        }
        for id in rejected {
            self.leave(id);
        }
    }

    /// Number of current members.
    pub fn members(&self) -> usize {
        self.members.len()
    }

    /// Recent messages, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Message> {
        self.history.iter()
    }
}

impl<P: Participant> Default for Room<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// A request to the room task.
#[derive(Debug)]
pub enum Command {
    /// Add a member with the given send queue.
    Join {
        /// The joining session.
        id: SessionId,
        /// Its send queue.
        queue: mpsc::Sender<Message>,
    },

    /// Remove a member.
    Leave {
        /// The leaving session.
        id: SessionId,
    },

    /// Fan a message out to every member.
    Deliver(Message),

    /// Request the current member count.
    Members {
        /// A oneshot channel for sending the reply.
        reply: oneshot::Sender<usize>,
    },
}

/// Cloneable handle through which sessions reach the room task.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    tx: mpsc::Sender<Command>,
}

impl RoomHandle {
    /// Join session `id` with its send queue.
    pub async fn join(&self, id: SessionId, queue: mpsc::Sender<Message>) -> anyhow::Result<()> {
        self.send(Command::Join { id, queue }).await
    }

    /// Remove session `id` from the room.
    pub async fn leave(&self, id: SessionId) -> anyhow::Result<()> {
        self.send(Command::Leave { id }).await
    }

    /// Fan `message` out to the room.
    pub async fn deliver(&self, message: Message) -> anyhow::Result<()> {
        self.send(Command::Deliver(message)).await
    }

    /// Ask the room how many members it has.
    pub async fn members(&self) -> anyhow::Result<usize> {
        let (reply, receiver) = oneshot::channel();
        self.send(Command::Members { reply }).await?;
        receiver.await.context("Room dropped the member count request")
    }

    async fn send(&self, command: Command) -> anyhow::Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("Room task has stopped"))
    }
}

/// Create a room command channel. Pass the receiver to [`serve`].
pub fn channel(buffer: usize) -> (RoomHandle, mpsc::Receiver<Command>) {
    let (tx, rx) = mpsc::channel(buffer);
    (RoomHandle { tx }, rx)
}

/// Apply room commands one at a time, in arrival order.
///
/// A request that cannot be answered is logged and skipped; the room keeps
/// serving.
///
/// # Termination
/// In case there are no more handles, terminate the future.
pub async fn serve(mut rx: mpsc::Receiver<Command>) {
    let mut room = Room::new();
    while let Some(command) = rx.recv().await {
        match command {
            Command::Join { id, queue } => room.join(id, queue),
            Command::Leave { id } => {
                room.leave(id);
            }
            Command::Deliver(message) => {
                debug!(body = %String::from_utf8_lossy(message.body()), "Room deliver");
                room.deliver(&message);
            }
            Command::Members { reply } => {
                if reply.send(room.members()).is_err() {
                    warn!("Member count requester went away");
                }
            }
        }
    }
}
