//! Error types for the fight layer.

use arena_protocol::{FightId, UserId};

/// Errors that can occur during fight operations.
///
/// A failed operation never mutates the fight. `Clone` lets the same error
/// be handed to every waiter on a fight's completion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FightError {
    /// The player called an operation their current view doesn't allow,
    /// e.g. `ready` before `join`, or any stale client retry.
    #[error(
        "player {player} cannot {action} while {current} (allowed: {})",
        .allowed.join(", ")
    )]
    IllegalTransition {
        player: UserId,
        action: String,
        current: String,
        allowed: Vec<String>,
    },

    /// The user is not a participant of this fight.
    #[error("player {player} is not part of fight {fight_id}")]
    UnknownPlayer { player: UserId, fight_id: FightId },

    /// The game refused the action (wrong turn, malformed move, ...).
    #[error("action rejected: {0}")]
    Rejected(String),

    /// The fight's command channel is full or closed.
    #[error("fight {0} is unavailable")]
    Unavailable(FightId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_transition_lists_allowed_views() {
        let err = FightError::IllegalTransition {
            player: UserId::from("alice"),
            action: "ready".into(),
            current: "none".into(),
            allowed: vec!["joined".into()],
        };
        assert_eq!(
            err.to_string(),
            "player alice cannot ready while none (allowed: joined)"
        );
    }
}
