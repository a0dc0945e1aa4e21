//! Error types for the registry layer.

use arena_fight::FightError;
use arena_protocol::{FightId, UserId};

/// Failures of a [`FightStore`](crate::FightStore) backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No row for this fight.
    #[error("fight {0} not found in store")]
    FightNotFound(FightId),

    /// A row with this id already exists.
    #[error("fight {0} already stored")]
    DuplicateFight(FightId),

    /// The backend itself failed (connection lost, constraint violated...).
    #[error("store backend failed: {0}")]
    Backend(String),
}

/// Errors that can occur during registry operations.
///
/// `Clone` because the same result is handed to every waiter on a fight's
/// completion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The user failed the role check.
    #[error("user {0} is not allowed to fight")]
    Forbidden(UserId),

    #[error("user {0} cannot challenge themselves")]
    SelfChallenge(UserId),

    /// The user already has a pending or active fight.
    #[error("user {0} already has a fight in progress")]
    DuplicateFight(UserId),

    /// No live fight with this id.
    #[error("fight {0} not found")]
    NotFound(FightId),

    /// The registry was shut down and takes no new fights.
    #[error("registry is shut down")]
    Closed,

    #[error(transparent)]
    Fight(#[from] FightError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
