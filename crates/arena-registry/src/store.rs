//! Persistence seam: fight rows and user scores.
//!
//! Arena doesn't ship a database layer. It defines [`FightStore`], and the
//! registry calls it at creation, when a fight starts, and when it ends.
//! [`MemoryStore`](crate::MemoryStore) is the in-process implementation.

use std::fmt;
use std::future::Future;

use arena_protocol::{FightId, UserId};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Persisted status of a fight row.
///
/// ```text
/// Pending → Active → Completed
///    └─────────┴───→ Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FightStatus {
    /// Created, not every player is ready yet.
    Pending,
    /// The game is running.
    Active,
    /// Finished with a winner; scores were applied.
    Completed,
    /// Ended without a winner; scores untouched.
    Aborted,
}

impl FightStatus {
    /// `true` for a fight that still occupies its players.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

impl fmt::Display for FightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One persisted fight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FightRecord {
    pub id: FightId,
    /// Name of the game played.
    pub game: String,
    pub challenger: UserId,
    pub opponent: UserId,
    pub status: FightStatus,
    pub winner: Option<UserId>,
}

impl FightRecord {
    /// A fresh `Pending` row.
    pub fn pending(id: FightId, game: impl Into<String>, challenger: UserId, opponent: UserId) -> Self {
        Self {
            id,
            game: game.into(),
            challenger,
            opponent,
            status: FightStatus::Pending,
            winner: None,
        }
    }
}

/// A user's persisted score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub user: UserId,
    pub score: i64,
}

/// Storage backend for fights and scores.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because the registry shares one store across
/// every fight's watcher task.
pub trait FightStore: Send + Sync + 'static {
    /// Persists a new fight row.
    fn insert_fight(
        &self,
        record: FightRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Loads a fight row, `None` if there is none.
    fn fight(
        &self,
        id: FightId,
    ) -> impl Future<Output = Result<Option<FightRecord>, StoreError>> + Send;

    /// Updates a fight's status and winner.
    fn set_fight_status(
        &self,
        id: FightId,
        status: FightStatus,
        winner: Option<UserId>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// A user's score. Users never scored before have 0.
    fn score(&self, user: &UserId) -> impl Future<Output = Result<i64, StoreError>> + Send;

    fn update_score(
        &self,
        user: &UserId,
        score: i64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every scored user, highest score first.
    fn ranking(&self) -> impl Future<Output = Result<Vec<ScoreRecord>, StoreError>> + Send;

    /// Applies the result of a won fight: both new scores, then the row
    /// marked `Completed`.
    ///
    /// The default performs the three writes in order and stops at the
    /// first failure. Backends that can do better (a transaction, one
    /// lock) should override it.
    fn commit_result(
        &self,
        id: FightId,
        winner: ScoreRecord,
        loser: ScoreRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            self.update_score(&winner.user, winner.score).await?;
            self.update_score(&loser.user, loser.score).await?;
            self.set_fight_status(id, FightStatus::Completed, Some(winner.user))
                .await
        }
    }
}
