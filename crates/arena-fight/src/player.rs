//! Per-player lifecycle state machine.
//!
//! Tracks one participant's milestone and connection, and owns the
//! outbound channel that fight events are delivered on. Every operation is
//! idempotent: an out-of-order call leaves the machine untouched and
//! reports nothing.

use arena_protocol::{Notice, UserId};
use tokio::sync::mpsc;
use tracing::trace;

use crate::PlayerView;

/// Outbound channel of one user: everything the gateway should write to
/// that user's socket.
pub type PlayerSender<E> = mpsc::UnboundedSender<Notice<E>>;

/// What a state change means for the rest of the fight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Joined(UserId),
    Ready(UserId),
    Reconnect(UserId),
    Disconnect(UserId),
}

/// Lifecycle of one fight participant.
pub struct PlayerStateMachine<E> {
    id: UserId,
    view: PlayerView,
    connected: bool,
    joined: bool,
    channel: Option<PlayerSender<E>>,
    cleaned_up: bool,
}

impl<E> PlayerStateMachine<E> {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            view: PlayerView::None,
            connected: false,
            joined: false,
            channel: None,
            cleaned_up: false,
        }
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }

    pub fn view(&self) -> PlayerView {
        self.view
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// `true` once the player has actually joined. A fight aborted before
    /// anyone joined moves every view to `GameEnded` without setting this.
    pub fn has_joined(&self) -> bool {
        self.joined
    }

    /// `true` while an outbound channel is attached.
    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    /// Attaches (or replaces) the outbound channel. Ignored after cleanup.
    pub fn attach(&mut self, channel: PlayerSender<E>) {
        if !self.cleaned_up {
            self.channel = Some(channel);
        }
    }

    /// Drops the outbound channel without touching the lifecycle.
    pub fn detach(&mut self) {
        self.channel = None;
    }

    /// Delivers a notice on the attached channel.
    ///
    /// Returns `false` when there is no channel or the receiver is gone;
    /// an unreachable player simply misses the notice.
    pub fn send(&self, notice: Notice<E>) -> bool {
        match &self.channel {
            Some(channel) => channel.send(notice).is_ok(),
            None => false,
        }
    }

    /// `→ joined`. Also marks the player connected. Repeating it while
    /// still `joined` reports again; once committed it is a no-op.
    pub fn join(&mut self) -> Option<PlayerEvent> {
        if self.view.is_committed() {
            return None;
        }
        self.view = PlayerView::Joined;
        self.connected = true;
        self.joined = true;
        trace!(player = %self.id, "player joined");
        Some(PlayerEvent::Joined(self.id.clone()))
    }

    /// `joined → ready`.
    pub fn ready(&mut self) -> Option<PlayerEvent> {
        if self.view != PlayerView::Joined {
            return None;
        }
        self.view = PlayerView::Ready;
        trace!(player = %self.id, "player ready");
        Some(PlayerEvent::Ready(self.id.clone()))
    }

    /// `ready → in-game`.
    pub fn game_start(&mut self) {
        if self.view == PlayerView::Ready {
            self.view = PlayerView::InGame;
        }
    }

    /// Any view → `game-ended`. Reachable early when a fight is aborted.
    pub fn game_end(&mut self) {
        self.view = PlayerView::GameEnded;
    }

    /// Marks the player connected. Reports a reconnect only for a
    /// committed player who was actually disconnected.
    pub fn connect(&mut self) -> Option<PlayerEvent> {
        if self.connected {
            return None;
        }
        self.connected = true;
        self.view
            .is_committed()
            .then(|| PlayerEvent::Reconnect(self.id.clone()))
    }

    /// Marks the player disconnected. Reports it only for a committed
    /// player.
    pub fn disconnect(&mut self) -> Option<PlayerEvent> {
        if !self.connected {
            return None;
        }
        self.connected = false;
        self.view
            .is_committed()
            .then(|| PlayerEvent::Disconnect(self.id.clone()))
    }

    /// Releases the outbound channel for good. Runs once.
    pub fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        self.channel = None;
        trace!(player = %self.id, "player cleaned up");
    }
}

impl<E> std::fmt::Debug for PlayerStateMachine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerStateMachine")
            .field("id", &self.id)
            .field("view", &self.view)
            .field("connected", &self.connected)
            .field("joined", &self.joined)
            .field("has_channel", &self.channel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use arena_protocol::{FightEnvelope, FightEvent, FightId};

    use super::*;

    fn machine() -> PlayerStateMachine<()> {
        PlayerStateMachine::new(UserId::from("alice"))
    }

    #[test]
    fn test_join_then_ready() {
        let mut player = machine();
        assert_eq!(
            player.join(),
            Some(PlayerEvent::Joined(UserId::from("alice")))
        );
        assert!(player.is_connected());
        assert_eq!(
            player.ready(),
            Some(PlayerEvent::Ready(UserId::from("alice")))
        );
        assert_eq!(player.view(), PlayerView::Ready);
    }

    #[test]
    fn test_out_of_order_calls_are_noops() {
        let mut player = machine();
        assert_eq!(player.ready(), None);
        assert_eq!(player.view(), PlayerView::None);

        player.join();
        player.game_start(); // not ready yet
        assert_eq!(player.view(), PlayerView::Joined);
    }

    #[test]
    fn test_join_is_repeatable_until_committed() {
        let mut player = machine();
        player.join();
        assert_eq!(
            player.join(),
            Some(PlayerEvent::Joined(UserId::from("alice")))
        );
        assert_eq!(player.view(), PlayerView::Joined);

        player.ready();
        assert_eq!(player.join(), None);
        assert_eq!(player.view(), PlayerView::Ready);
    }

    #[test]
    fn test_game_end_reachable_from_any_view() {
        let mut player = machine();
        player.game_end();
        assert_eq!(player.view(), PlayerView::GameEnded);
        assert!(!player.has_joined());
        assert_eq!(player.join(), None);
    }

    #[test]
    fn test_uncommitted_disconnect_is_silent() {
        let mut player = machine();
        player.join();
        assert_eq!(player.disconnect(), None);
        assert!(!player.is_connected());
        assert_eq!(player.connect(), None);
        assert!(player.is_connected());
    }

    #[test]
    fn test_committed_disconnect_and_reconnect_are_reported() {
        let mut player = machine();
        player.join();
        player.ready();
        assert_eq!(
            player.disconnect(),
            Some(PlayerEvent::Disconnect(UserId::from("alice")))
        );
        assert_eq!(player.disconnect(), None);
        assert_eq!(
            player.connect(),
            Some(PlayerEvent::Reconnect(UserId::from("alice")))
        );
        assert_eq!(player.connect(), None);
    }

    #[test]
    fn test_send_requires_channel_and_stops_after_cleanup() {
        let mut player = machine();
        let notice = || {
            Notice::Fight(FightEnvelope {
                event: FightEvent::AllJoined,
                fight_id: FightId::new(),
            })
        };
        assert!(!player.send(notice()));

        let (tx, mut rx) = mpsc::unbounded_channel();
        player.attach(tx);
        assert!(player.send(notice()));
        assert!(rx.try_recv().is_ok());

        player.cleanup();
        assert!(!player.has_channel());
        let (tx, _rx) = mpsc::unbounded_channel();
        player.attach(tx);
        assert!(!player.has_channel(), "attach after cleanup is ignored");
    }
}
