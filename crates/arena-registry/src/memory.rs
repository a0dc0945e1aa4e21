//! In-process [`FightStore`] backed by hash maps.

use std::collections::HashMap;
use std::sync::Arc;

use arena_protocol::{FightId, UserId};
use tokio::sync::Mutex;

use crate::{FightRecord, FightStatus, FightStore, ScoreRecord, StoreError};

#[derive(Default)]
struct Tables {
    fights: HashMap<FightId, FightRecord>,
    scores: HashMap<UserId, i64>,
}

impl Tables {
    fn set_status(
        &mut self,
        id: FightId,
        status: FightStatus,
        winner: Option<UserId>,
    ) -> Result<(), StoreError> {
        let row = self.fights.get_mut(&id).ok_or(StoreError::FightNotFound(id))?;
        row.status = status;
        row.winner = winner;
        Ok(())
    }
}

/// A [`FightStore`] that keeps everything in memory.
///
/// Clones share the same tables, so a test can keep one clone to inspect
/// what the registry wrote.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with pre-existing scores.
    pub fn with_scores(scores: impl IntoIterator<Item = (UserId, i64)>) -> Self {
        let tables = Tables {
            fights: HashMap::new(),
            scores: scores.into_iter().collect(),
        };
        Self {
            tables: Arc::new(Mutex::new(tables)),
        }
    }

    /// Number of stored fight rows.
    pub async fn fight_count(&self) -> usize {
        self.tables.lock().await.fights.len()
    }
}

impl FightStore for MemoryStore {
    async fn insert_fight(&self, record: FightRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.fights.contains_key(&record.id) {
            return Err(StoreError::DuplicateFight(record.id));
        }
        tables.fights.insert(record.id, record);
        Ok(())
    }

    async fn fight(&self, id: FightId) -> Result<Option<FightRecord>, StoreError> {
        Ok(self.tables.lock().await.fights.get(&id).cloned())
    }

    async fn set_fight_status(
        &self,
        id: FightId,
        status: FightStatus,
        winner: Option<UserId>,
    ) -> Result<(), StoreError> {
        self.tables.lock().await.set_status(id, status, winner)
    }

    async fn score(&self, user: &UserId) -> Result<i64, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .scores
            .get(user)
            .copied()
            .unwrap_or(0))
    }

    async fn update_score(&self, user: &UserId, score: i64) -> Result<(), StoreError> {
        self.tables.lock().await.scores.insert(user.clone(), score);
        Ok(())
    }

    async fn ranking(&self) -> Result<Vec<ScoreRecord>, StoreError> {
        let tables = self.tables.lock().await;
        let mut ranking: Vec<_> = tables
            .scores
            .iter()
            .map(|(user, score)| ScoreRecord {
                user: user.clone(),
                score: *score,
            })
            .collect();
        ranking.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.user.cmp(&b.user)));
        Ok(ranking)
    }

    /// All three writes happen under one lock: other tasks see either none
    /// or all of them.
    async fn commit_result(
        &self,
        id: FightId,
        winner: ScoreRecord,
        loser: ScoreRecord,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.fights.contains_key(&id) {
            return Err(StoreError::FightNotFound(id));
        }
        tables.scores.insert(winner.user.clone(), winner.score);
        tables.scores.insert(loser.user, loser.score);
        tables.set_status(id, FightStatus::Completed, Some(winner.user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: FightId) -> FightRecord {
        FightRecord::pending(id, "test", UserId::from("a"), UserId::from("b"))
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let store = MemoryStore::new();
        let id = FightId::new();
        store.insert_fight(record(id)).await.unwrap();

        let row = store.fight(id).await.unwrap().unwrap();
        assert_eq!(row.status, FightStatus::Pending);
        assert_eq!(
            store.insert_fight(record(id)).await,
            Err(StoreError::DuplicateFight(id))
        );
    }

    #[tokio::test]
    async fn test_unknown_user_scores_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.score(&UserId::from("nobody")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ranking_is_descending_with_stable_ties() {
        let store = MemoryStore::with_scores([
            (UserId::from("carol"), 10),
            (UserId::from("bob"), 50),
            (UserId::from("alice"), 50),
        ]);
        let users: Vec<_> = store
            .ranking()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.user.to_string())
            .collect();
        assert_eq!(users, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_commit_result_requires_the_row() {
        let store = MemoryStore::new();
        let id = FightId::new();
        let winner = ScoreRecord {
            user: UserId::from("a"),
            score: 100,
        };
        let loser = ScoreRecord {
            user: UserId::from("b"),
            score: 0,
        };
        assert_eq!(
            store.commit_result(id, winner.clone(), loser.clone()).await,
            Err(StoreError::FightNotFound(id))
        );
        assert_eq!(store.score(&winner.user).await.unwrap(), 0);

        store.insert_fight(record(id)).await.unwrap();
        store.commit_result(id, winner, loser).await.unwrap();
        let row = store.fight(id).await.unwrap().unwrap();
        assert_eq!(row.status, FightStatus::Completed);
        assert_eq!(row.winner, Some(UserId::from("a")));
    }
}
