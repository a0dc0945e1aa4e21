//! The `FightGame` trait: the extension point for concrete games.
//!
//! The coordinator owns the shared lifecycle (join, ready, connection
//! tracking, the end of the fight). A game only supplies the rules of the
//! in-game phase and talks back to the fight through the
//! [`FightContext`] it is handed on every call.

use std::fmt;

use arena_countdown::TimerEvent;
use arena_protocol::UserId;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{FightConfig, FightContext, FightError};

/// The core trait that game developers implement.
///
/// Each associated type defines the shape of the game's data:
/// - `Config`: game-specific settings (rounds to win, time limits, ...)
/// - `View`: the in-game sub-view of a player, refining `View::Playing`
/// - `Action`: what clients can send once the game is running
/// - `Event`: the game's own events, carried in `FightEvent::Game`
pub trait FightGame: Sized + Send + 'static {
    /// Game-specific configuration.
    type Config: Clone + Default + Send + Sync + 'static;

    /// Per-player in-game sub-view. Barriers compare these.
    type View: Copy + PartialEq + fmt::Debug + Send + 'static;

    /// Client actions during the in-game phase.
    type Action: fmt::Debug + Send + Serialize + DeserializeOwned + 'static;

    /// Game events sent to players.
    type Event: Clone + fmt::Debug + Send + Serialize + DeserializeOwned + 'static;

    /// Name announced in invitations.
    const NAME: &'static str;

    /// Creates the game for a fight between `players`.
    fn create(config: &Self::Config, players: &[UserId]) -> Self;

    /// The sub-view every player gets when the game starts.
    fn initial_view(&self) -> Self::View;

    /// Called once, right after `allReady` was broadcast.
    fn on_start(&mut self, ctx: &mut FightContext<Self>);

    /// Processes an action from a player whose view is `Playing`.
    ///
    /// Returning an error rejects the action; the game must not have
    /// emitted anything in that case.
    fn handle_action(
        &mut self,
        ctx: &mut FightContext<Self>,
        player: &UserId,
        action: Self::Action,
    ) -> Result<(), FightError>;

    /// Called for every event of every timer this fight started.
    /// Default: ignore.
    fn on_timer(&mut self, _ctx: &mut FightContext<Self>, _event: TimerEvent) {}

    /// A committed player lost their connection while the game runs.
    /// Default: keep playing.
    fn on_disconnect(&mut self, _ctx: &mut FightContext<Self>, _player: &UserId) {}

    /// A committed player came back while the game runs. Default: no-op.
    fn on_reconnect(&mut self, _ctx: &mut FightContext<Self>, _player: &UserId) {}

    /// Teardown. Cancel every timer the game still owns.
    fn destroy(&mut self);

    /// Returns the actor configuration for this game type.
    fn fight_config() -> FightConfig {
        FightConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Outcome & lifecycle
// ---------------------------------------------------------------------------

/// How a fight ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FightOutcome {
    /// A participant won. `game_delta` is the game's own score award for
    /// the winner, applied when it beats the flat victory bonus.
    #[serde(rename_all = "camelCase")]
    Won { winner: UserId, game_delta: i64 },

    /// Nobody won; scores stay untouched.
    Aborted { reason: String },
}

impl FightOutcome {
    /// A win with no game-specific award.
    pub fn won(winner: UserId) -> Self {
        Self::Won {
            winner,
            game_delta: 0,
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    pub fn winner(&self) -> Option<&UserId> {
        match self {
            Self::Won { winner, .. } => Some(winner),
            Self::Aborted { .. } => None,
        }
    }
}

/// Notifications on a fight's lifecycle channel, separate from the events
/// sent to players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Everybody was ready and the game started.
    Started,
    /// The fight ended. Sent exactly once.
    Ended(FightOutcome),
}
