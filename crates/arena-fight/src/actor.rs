//! Fight actor: an isolated Tokio task that owns one coordinator.
//!
//! Player commands arrive over a bounded mpsc channel and timer events
//! over the fight's shared timer channel. The actor `select!`s over both,
//! so every mutation of a fight happens on one task, one at a time.

use arena_protocol::{FightEnvelope, FightId, UserId};
use tokio::sync::{mpsc, oneshot};

use crate::player::PlayerSender;
use crate::{Coordinator, FightError, FightGame, FightSnapshot, View};

type Reply<T> = oneshot::Sender<Result<T, FightError>>;

/// Commands sent to a fight actor through its channel.
pub(crate) enum FightCommand<G: FightGame> {
    Join {
        player: UserId,
        channel: Option<PlayerSender<G::Event>>,
        reply: Reply<()>,
    },
    Ready {
        player: UserId,
        reply: Reply<()>,
    },
    Action {
        player: UserId,
        action: G::Action,
        reply: Reply<()>,
    },
    Connect {
        player: UserId,
        channel: Option<PlayerSender<G::Event>>,
        reply: Reply<()>,
    },
    Disconnect {
        player: UserId,
        reply: Reply<()>,
    },
    Snapshot {
        reply: oneshot::Sender<FightSnapshot>,
    },
    Log {
        reply: oneshot::Sender<Vec<FightEnvelope<G::Event>>>,
    },
    Abort {
        reason: String,
    },
    /// Destroy the fight and stop the actor.
    Shutdown,
}

/// Handle to a running fight actor.
///
/// Cheap to clone; it's just an `mpsc::Sender` wrapper.
pub struct FightHandle<G: FightGame> {
    fight_id: FightId,
    sender: mpsc::Sender<FightCommand<G>>,
}

impl<G: FightGame> Clone for FightHandle<G> {
    fn clone(&self) -> Self {
        Self {
            fight_id: self.fight_id,
            sender: self.sender.clone(),
        }
    }
}

impl<G: FightGame> FightHandle<G> {
    pub fn fight_id(&self) -> FightId {
        self.fight_id
    }

    /// `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Joins `player`, optionally (re)attaching their outbound channel.
    pub async fn join(
        &self,
        player: UserId,
        channel: Option<PlayerSender<G::Event>>,
    ) -> Result<(), FightError> {
        self.request(|reply| FightCommand::Join {
            player,
            channel,
            reply,
        })
        .await?
    }

    pub async fn ready(&self, player: UserId) -> Result<(), FightError> {
        self.request(|reply| FightCommand::Ready { player, reply })
            .await?
    }

    /// Sends an in-game action and waits for the game's verdict.
    pub async fn act(
        &self,
        player: UserId,
        action: G::Action,
    ) -> Result<(), FightError> {
        self.request(|reply| FightCommand::Action {
            player,
            action,
            reply,
        })
        .await?
    }

    pub async fn connect(
        &self,
        player: UserId,
        channel: Option<PlayerSender<G::Event>>,
    ) -> Result<(), FightError> {
        self.request(|reply| FightCommand::Connect {
            player,
            channel,
            reply,
        })
        .await?
    }

    pub async fn disconnect(&self, player: UserId) -> Result<(), FightError> {
        self.request(|reply| FightCommand::Disconnect { player, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<FightSnapshot, FightError> {
        self.request(|reply| FightCommand::Snapshot { reply }).await
    }

    /// The fight's event log, oldest first.
    pub async fn log(&self) -> Result<Vec<FightEnvelope<G::Event>>, FightError> {
        self.request(|reply| FightCommand::Log { reply }).await
    }

    /// Ends the fight with no winner (fire-and-forget).
    pub async fn abort(&self, reason: impl Into<String>) -> Result<(), FightError> {
        self.send(FightCommand::Abort {
            reason: reason.into(),
        })
        .await
    }

    /// Tells the actor to destroy the fight and stop.
    pub async fn shutdown(&self) -> Result<(), FightError> {
        self.send(FightCommand::Shutdown).await
    }

    async fn send(&self, cmd: FightCommand<G>) -> Result<(), FightError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| FightError::Unavailable(self.fight_id))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> FightCommand<G>,
    ) -> Result<T, FightError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| FightError::Unavailable(self.fight_id))
    }
}

/// The internal actor state. Runs inside a Tokio task.
struct FightActor<G: FightGame> {
    coordinator: Coordinator<G>,
    receiver: mpsc::Receiver<FightCommand<G>>,
}

impl<G: FightGame> FightActor<G> {
    async fn run(mut self) {
        let fight_id = self.coordinator.fight_id();
        tracing::info!(%fight_id, "fight actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(FightCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                Some(event) = self.coordinator.next_timer_event() => {
                    self.coordinator.timer_event(event);
                }
            }
        }

        self.coordinator.destroy();
        tracing::info!(%fight_id, "fight actor stopped");
    }

    fn handle(&mut self, cmd: FightCommand<G>) {
        match cmd {
            FightCommand::Join {
                player,
                channel,
                reply,
            } => {
                let result = self.join(&player, channel);
                let _ = reply.send(result);
            }
            FightCommand::Ready { player, reply } => {
                let _ = reply.send(self.coordinator.player_ready(&player));
            }
            FightCommand::Action {
                player,
                action,
                reply,
            } => {
                let result = self.coordinator.handle_action(&player, action);
                if let Err(err) = &result {
                    tracing::debug!(fight_id = %self.coordinator.fight_id(), %player, %err, "action refused");
                }
                let _ = reply.send(result);
            }
            FightCommand::Connect {
                player,
                channel,
                reply,
            } => {
                let _ = reply.send(self.coordinator.connect(&player, channel));
            }
            FightCommand::Disconnect { player, reply } => {
                let _ = reply.send(self.coordinator.disconnect(&player));
            }
            FightCommand::Snapshot { reply } => {
                let _ = reply.send(self.coordinator.snapshot());
            }
            FightCommand::Log { reply } => {
                let _ = reply.send(self.coordinator.log());
            }
            FightCommand::Abort { reason } => {
                self.coordinator.abort(reason);
            }
            FightCommand::Shutdown => {}
        }
    }

    fn join(
        &mut self,
        player: &UserId,
        channel: Option<PlayerSender<G::Event>>,
    ) -> Result<(), FightError> {
        // Assert before attaching so a refused join leaves the fight as is.
        self.coordinator
            .context()
            .assert_view(player, "join", &[View::None])?;
        if let Some(channel) = channel {
            self.coordinator.attach(player, channel)?;
        }
        self.coordinator.player_join(player)
    }
}

/// Spawns a fight actor and returns a handle to it.
///
/// `channel_size` bounds the command channel; senders wait while it is
/// full. Subscribe to the coordinator's lifecycle before calling this.
pub fn spawn_fight<G: FightGame>(
    coordinator: Coordinator<G>,
    channel_size: usize,
) -> FightHandle<G> {
    let (sender, receiver) = mpsc::channel(channel_size.max(1));
    let fight_id = coordinator.fight_id();
    let actor = FightActor {
        coordinator,
        receiver,
    };
    tokio::spawn(actor.run());
    FightHandle { fight_id, sender }
}
