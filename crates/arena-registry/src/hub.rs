//! Per-user notice channels.
//!
//! The hub maps each connected user to one typed, unbounded channel of
//! [`Notice`]s: invitations and the events of the fights they take part
//! in. The gateway subscribes a user on connect and writes whatever
//! arrives to the socket.

use std::collections::HashMap;

use arena_fight::PlayerSender;
use arena_protocol::{Notice, UserId};
use tokio::sync::{Mutex, mpsc};

/// Receiving half of a user's notice channel.
pub type NoticeReceiver<E> = mpsc::UnboundedReceiver<Notice<E>>;

pub struct Hub<E> {
    channels: Mutex<HashMap<UserId, PlayerSender<E>>>,
}

impl<E> Default for Hub<E> {
    fn default() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }
}

impl<E: Send + 'static> Hub<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a fresh channel for `user`, replacing any previous one.
    ///
    /// Returns the sender too, so the caller can later unsubscribe exactly
    /// this channel and not a newer one.
    pub async fn subscribe(&self, user: UserId) -> (PlayerSender<E>, NoticeReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let replaced = self.channels.lock().await.insert(user.clone(), tx.clone());
        tracing::debug!(%user, replaced = replaced.is_some(), "user subscribed");
        (tx, rx)
    }

    /// Removes `user`'s channel if it is still `channel`.
    pub async fn unsubscribe(&self, user: &UserId, channel: &PlayerSender<E>) -> bool {
        let mut channels = self.channels.lock().await;
        let current = channels.get(user).is_some_and(|tx| tx.same_channel(channel));
        if current {
            channels.remove(user);
            tracing::debug!(%user, "user unsubscribed");
        }
        current
    }

    /// A clone of `user`'s current channel.
    pub async fn sender(&self, user: &UserId) -> Option<PlayerSender<E>> {
        self.channels.lock().await.get(user).cloned()
    }

    pub async fn is_subscribed(&self, user: &UserId) -> bool {
        self.channels.lock().await.contains_key(user)
    }

    /// Pushes a notice to `user`. Returns `false` if nobody is listening.
    pub async fn publish(&self, user: &UserId, notice: Notice<E>) -> bool {
        match self.channels.lock().await.get(user) {
            Some(tx) => tx.send(notice).is_ok(),
            None => false,
        }
    }
}
