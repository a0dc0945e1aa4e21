//! Views, fight phases, and fight configuration.
//!
//! A *view* is the synchronization milestone a player has reached. Every
//! coordinator operation asserts the caller's view before mutating
//! anything, which is what makes stale or replayed client messages
//! harmless.

use std::collections::BTreeMap;
use std::fmt;

use arena_protocol::{FightId, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PlayerView
// ---------------------------------------------------------------------------

/// Lifecycle milestone of one participant.
///
/// Strictly monotonic:
///
/// ```text
/// None → Joined → Ready → InGame → GameEnded
/// ```
///
/// A player is *committed* once they are ready; only committed players'
/// connection changes are reported to opponents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum PlayerView {
    None,
    Joined,
    Ready,
    InGame,
    GameEnded,
}

impl PlayerView {
    /// `true` from `Ready` onwards.
    pub fn is_committed(self) -> bool {
        self >= Self::Ready
    }
}

impl fmt::Display for PlayerView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Joined => "joined",
            Self::Ready => "ready",
            Self::InGame => "in-game",
            Self::GameEnded => "game-ended",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// View: the coordinator's per-player view
// ---------------------------------------------------------------------------

/// The coordinator's view of a player: the shared milestones, with the
/// in-game milestone refined by the concrete game's own sub-view `V`.
///
/// Rock-paper-scissors, for instance, uses `V = Choosing | Chosen` so the
/// same barrier that gates "all ready" can gate "all chosen".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum View<V> {
    None,
    Joined,
    Ready,
    Playing(V),
    Ended,
}

impl<V> View<V> {
    /// The shared lifecycle milestone this view corresponds to.
    pub fn milestone(&self) -> PlayerView {
        match self {
            Self::None => PlayerView::None,
            Self::Joined => PlayerView::Joined,
            Self::Ready => PlayerView::Ready,
            Self::Playing(_) => PlayerView::InGame,
            Self::Ended => PlayerView::GameEnded,
        }
    }

    /// `true` while the player is in the game proper.
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing(_))
    }
}

impl<V: fmt::Debug> fmt::Display for View<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing(sub) => write!(f, "in-game:{sub:?}"),
            other => write!(f, "{}", other.milestone()),
        }
    }
}

// ---------------------------------------------------------------------------
// FightPhase
// ---------------------------------------------------------------------------

/// Fight-level server state.
///
/// Transitions are strictly ordered, except that any live phase may jump
/// straight to `Ended` when the fight is aborted:
///
/// ```text
/// Init → Joining → Readying → InProgress → Ended
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FightPhase {
    /// Created, nobody joined yet.
    Init,
    /// At least one player joined.
    Joining,
    /// Everybody joined; waiting for everyone to be ready.
    Readying,
    /// The game is running.
    InProgress,
    /// Finished or aborted. Terminal.
    Ended,
}

impl FightPhase {
    /// The next phase in the regular order, `None` once ended.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Joining),
            Self::Joining => Some(Self::Readying),
            Self::Readying => Some(Self::InProgress),
            Self::InProgress => Some(Self::Ended),
            Self::Ended => None,
        }
    }

    /// Returns `true` if moving to `target` is legal.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target) || (target == Self::Ended && self != Self::Ended)
    }

    /// `true` until the fight has ended.
    pub fn is_live(self) -> bool {
        self != Self::Ended
    }
}

impl fmt::Display for FightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Joining => "joining",
            Self::Readying => "readying",
            Self::InProgress => "in-progress",
            Self::Ended => "ended",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// FightConfig
// ---------------------------------------------------------------------------

/// Per-game tuning of the fight actor.
///
/// Games override these through `FightGame::fight_config()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FightConfig {
    /// Capacity of the actor's command channel. Senders wait when full.
    pub command_buffer: usize,

    /// Maximum number of envelopes kept in the in-memory event log.
    /// Oldest entries are dropped first.
    pub log_capacity: usize,
}

impl Default for FightConfig {
    fn default() -> Self {
        Self {
            command_buffer: 64,
            log_capacity: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// FightSnapshot
// ---------------------------------------------------------------------------

/// A diagnostic snapshot of a fight's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FightSnapshot {
    pub fight_id: FightId,
    pub server_state: FightPhase,
    /// Players that have joined, in roster order.
    pub joined_players: Vec<UserId>,
    /// Each player's current view, rendered as text.
    pub players: BTreeMap<UserId, String>,
    /// Players whose connection is currently up.
    pub connected: Vec<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_view_is_ordered() {
        assert!(PlayerView::None < PlayerView::Joined);
        assert!(PlayerView::Joined < PlayerView::Ready);
        assert!(PlayerView::Ready < PlayerView::InGame);
        assert!(PlayerView::InGame < PlayerView::GameEnded);
    }

    #[test]
    fn test_commitment_starts_at_ready() {
        assert!(!PlayerView::None.is_committed());
        assert!(!PlayerView::Joined.is_committed());
        assert!(PlayerView::Ready.is_committed());
        assert!(PlayerView::GameEnded.is_committed());
    }

    #[test]
    fn test_phase_next_follows_strict_order() {
        assert_eq!(FightPhase::Init.next(), Some(FightPhase::Joining));
        assert_eq!(FightPhase::Joining.next(), Some(FightPhase::Readying));
        assert_eq!(FightPhase::Readying.next(), Some(FightPhase::InProgress));
        assert_eq!(FightPhase::InProgress.next(), Some(FightPhase::Ended));
        assert_eq!(FightPhase::Ended.next(), None);
    }

    #[test]
    fn test_phase_can_abort_from_anywhere_live() {
        assert!(FightPhase::Init.can_transition_to(FightPhase::Ended));
        assert!(FightPhase::Readying.can_transition_to(FightPhase::Ended));
        assert!(!FightPhase::Ended.can_transition_to(FightPhase::Ended));
        assert!(!FightPhase::Init.can_transition_to(FightPhase::InProgress));
    }

    #[test]
    fn test_view_display() {
        #[derive(Debug, Clone, Copy, PartialEq)]
        enum Sub {
            Choosing,
        }
        assert_eq!(View::<Sub>::Joined.to_string(), "joined");
        assert_eq!(View::Playing(Sub::Choosing).to_string(), "in-game:Choosing");
        assert_eq!(View::<Sub>::Ended.to_string(), "game-ended");
    }

    #[test]
    fn test_phase_serializes_kebab_case() {
        let json = serde_json::to_string(&FightPhase::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
    }
}
