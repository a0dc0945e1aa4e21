//! Fight registry: creates fights, tracks who is fighting, and settles
//! results once a fight ends.
//!
//! Every fight gets a watcher task subscribed to its lifecycle channel.
//! The watcher persists status changes, applies scoring when the fight
//! ends, tears the actor down, frees both players, and resolves the
//! fight's [`FightCompletion`].

use std::collections::HashMap;
use std::sync::Arc;

use arena_fight::{
    Coordinator, FightError, FightGame, FightHandle, FightOutcome, LifecycleEvent, spawn_fight,
};
use arena_protocol::{FightId, Invitation, Notice, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, watch};

use crate::{
    FightRecord, FightStatus, FightStore, Hub, PlayerSender, RegistryError, RoleCheck,
    ScoreChange, ScoreRecord, ScoringConfig,
};

/// Registry-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    pub scoring: ScoringConfig,
}

/// What a settled fight produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FightResult {
    pub fight_id: FightId,
    pub outcome: FightOutcome,
    /// Winner first, then loser. Empty for an aborted fight.
    pub scores: Vec<ScoreChange>,
}

type Settled = Option<Result<FightResult, RegistryError>>;

/// Resolves once the fight has been settled.
#[derive(Debug, Clone)]
pub struct FightCompletion {
    fight_id: FightId,
    settled: watch::Receiver<Settled>,
}

impl FightCompletion {
    pub fn fight_id(&self) -> FightId {
        self.fight_id
    }

    /// Waits until the fight has ended and its result is persisted.
    ///
    /// A persistence failure during scoring comes back here.
    pub async fn wait(mut self) -> Result<FightResult, RegistryError> {
        let fight_id = self.fight_id;
        let settled = self
            .settled
            .wait_for(Option::is_some)
            .await
            .map_err(|_| FightError::Unavailable(fight_id))?;
        settled
            .clone()
            .unwrap_or(Err(RegistryError::Fight(FightError::Unavailable(fight_id))))
    }
}

/// Returned by [`FightRegistry::create_fight`].
#[derive(Debug, Clone)]
pub struct FightTicket {
    pub fight_id: FightId,
    pub completion: FightCompletion,
}

struct LiveFight<G: FightGame> {
    handle: FightHandle<G>,
    completion: FightCompletion,
}

struct Index<G: FightGame> {
    fights: HashMap<FightId, LiveFight<G>>,
    /// A user is in at most one pending or active fight.
    user_fights: HashMap<UserId, FightId>,
    closed: bool,
}

struct Inner<G: FightGame, S, R> {
    config: RegistryConfig,
    game_config: G::Config,
    store: S,
    roles: R,
    hub: Arc<Hub<G::Event>>,
    index: Mutex<Index<G>>,
}

/// Creates, tracks and settles fights of game `G`.
///
/// Cheap to clone; clones share the same fights.
pub struct FightRegistry<G: FightGame, S, R> {
    inner: Arc<Inner<G, S, R>>,
}

impl<G: FightGame, S, R> Clone for FightRegistry<G, S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G, S, R> FightRegistry<G, S, R>
where
    G: FightGame,
    S: FightStore,
    R: RoleCheck,
{
    pub fn new(
        config: RegistryConfig,
        game_config: G::Config,
        store: S,
        roles: R,
        hub: Arc<Hub<G::Event>>,
    ) -> Self {
        let index = Index {
            fights: HashMap::new(),
            user_fights: HashMap::new(),
            closed: false,
        };
        Self {
            inner: Arc::new(Inner {
                config,
                game_config,
                store,
                roles,
                hub,
                index: Mutex::new(index),
            }),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn hub(&self) -> &Arc<Hub<G::Event>> {
        &self.inner.hub
    }

    /// Creates a fight between `challenger` and `opponent` and invites the
    /// opponent.
    ///
    /// Nothing is created when either user fails the role check or is
    /// already in a pending or active fight.
    pub async fn create_fight(
        &self,
        challenger: UserId,
        opponent: UserId,
    ) -> Result<FightTicket, RegistryError> {
        if challenger == opponent {
            return Err(RegistryError::SelfChallenge(challenger));
        }
        for user in [&challenger, &opponent] {
            if !self.inner.roles.can_fight(user).await {
                return Err(RegistryError::Forbidden(user.clone()));
            }
        }

        let inner = &self.inner;
        let fight_id = FightId::new();
        let players = vec![challenger.clone(), opponent.clone()];
        {
            let mut index = inner.index.lock().await;
            if index.closed {
                return Err(RegistryError::Closed);
            }
            for user in &players {
                if index.user_fights.contains_key(user) {
                    return Err(RegistryError::DuplicateFight(user.clone()));
                }
            }
            // Reserved while the fight is set up, with the index unlocked.
            for user in &players {
                index.user_fights.insert(user.clone(), fight_id);
            }
        }

        let record =
            FightRecord::pending(fight_id, G::NAME, challenger.clone(), opponent.clone());
        if let Err(err) = inner.store.insert_fight(record).await {
            self.release(fight_id).await;
            return Err(err.into());
        }

        let mut coordinator = Coordinator::<G>::new(fight_id, players.clone(), &inner.game_config);
        for user in &players {
            if let Some(channel) = inner.hub.sender(user).await {
                if let Err(err) = coordinator.attach(user, channel) {
                    self.release(fight_id).await;
                    return Err(err.into());
                }
            }
        }
        let lifecycle = coordinator.subscribe_lifecycle();
        let handle = spawn_fight(coordinator, G::fight_config().command_buffer);

        let (settled_tx, settled_rx) = watch::channel(None);
        let completion = FightCompletion {
            fight_id,
            settled: settled_rx,
        };
        let closed = {
            let mut index = inner.index.lock().await;
            index.fights.insert(
                fight_id,
                LiveFight {
                    handle: handle.clone(),
                    completion: completion.clone(),
                },
            );
            index.closed
        };

        tokio::spawn(watch_fight(
            Arc::clone(inner),
            handle.clone(),
            players,
            lifecycle,
            settled_tx,
        ));

        if closed {
            // Shutdown started during setup and did not see this fight.
            tracing::info!(%fight_id, "registry closed during setup, aborting fight");
            let _ = handle.abort("server shutting down").await;
            return Err(RegistryError::Closed);
        }

        let invitation = Notice::Invitation(Invitation {
            fight_id,
            game: G::NAME.to_owned(),
            from: challenger.clone(),
        });
        if !inner.hub.publish(&opponent, invitation).await {
            tracing::debug!(%fight_id, %opponent, "opponent not connected, invitation dropped");
        }
        tracing::info!(%fight_id, game = G::NAME, %challenger, %opponent, "fight created");

        Ok(FightTicket {
            fight_id,
            completion,
        })
    }

    /// The handle of a live fight.
    pub async fn get_fight(&self, fight_id: FightId) -> Option<FightHandle<G>> {
        let index = self.inner.index.lock().await;
        index.fights.get(&fight_id).map(|fight| fight.handle.clone())
    }

    /// The live fight `user` takes part in.
    pub async fn fight_of(&self, user: &UserId) -> Option<FightId> {
        self.inner.index.lock().await.user_fights.get(user).copied()
    }

    /// Number of live fights.
    pub async fn fight_count(&self) -> usize {
        self.inner.index.lock().await.fights.len()
    }

    /// Waits for a live fight to be settled.
    pub async fn completion(&self, fight_id: FightId) -> Option<FightCompletion> {
        let index = self.inner.index.lock().await;
        index.fights.get(&fight_id).map(|fight| fight.completion.clone())
    }

    /// Frees the users reserved for a fight that never went live.
    async fn release(&self, fight_id: FightId) {
        let mut index = self.inner.index.lock().await;
        index.user_fights.retain(|_, id| *id != fight_id);
    }

    async fn handle(&self, fight_id: FightId) -> Result<FightHandle<G>, RegistryError> {
        self.get_fight(fight_id)
            .await
            .ok_or(RegistryError::NotFound(fight_id))
    }

    // -- Routing --------------------------------------------------------------

    /// Joins `user` to a fight on their current hub channel.
    pub async fn join(&self, fight_id: FightId, user: UserId) -> Result<(), RegistryError> {
        let handle = self.handle(fight_id).await?;
        let channel = self.inner.hub.sender(&user).await;
        Ok(handle.join(user, channel).await?)
    }

    pub async fn ready(&self, fight_id: FightId, user: UserId) -> Result<(), RegistryError> {
        let handle = self.handle(fight_id).await?;
        Ok(handle.ready(user).await?)
    }

    pub async fn act(
        &self,
        fight_id: FightId,
        user: UserId,
        action: G::Action,
    ) -> Result<(), RegistryError> {
        let handle = self.handle(fight_id).await?;
        Ok(handle.act(user, action).await?)
    }

    /// Reports a (re)connected user to their live fight, if any.
    pub async fn connect_user(
        &self,
        user: &UserId,
        channel: PlayerSender<G::Event>,
    ) -> Result<(), RegistryError> {
        let Some(fight_id) = self.fight_of(user).await else {
            return Ok(());
        };
        let handle = self.handle(fight_id).await?;
        Ok(handle.connect(user.clone(), Some(channel)).await?)
    }

    /// Reports a dropped connection to the user's live fight, if any.
    pub async fn disconnect_user(&self, user: &UserId) -> Result<(), RegistryError> {
        let Some(fight_id) = self.fight_of(user).await else {
            return Ok(());
        };
        let handle = self.handle(fight_id).await?;
        Ok(handle.disconnect(user.clone()).await?)
    }

    // -- Administration -------------------------------------------------------

    /// Ends a live fight with no winner.
    pub async fn abort_fight(
        &self,
        fight_id: FightId,
        reason: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let handle = self.handle(fight_id).await?;
        handle.abort(reason).await?;
        Ok(())
    }

    /// Every scored user, highest score first.
    pub async fn ranking(&self) -> Result<Vec<ScoreRecord>, RegistryError> {
        Ok(self.inner.store.ranking().await?)
    }

    /// Stops taking fights, aborts every live fight and waits until each
    /// one is settled.
    pub async fn shutdown(&self) {
        let live: Vec<_> = {
            let mut index = self.inner.index.lock().await;
            index.closed = true;
            index
                .fights
                .values()
                .map(|fight| (fight.handle.clone(), fight.completion.clone()))
                .collect()
        };
        tracing::info!(fights = live.len(), "registry shutting down");

        for (handle, _) in &live {
            let _ = handle.abort("server shutting down").await;
        }
        for (_, completion) in live {
            if let Err(err) = completion.wait().await {
                tracing::warn!(%err, "fight settled with an error during shutdown");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

async fn watch_fight<G, S, R>(
    inner: Arc<Inner<G, S, R>>,
    handle: FightHandle<G>,
    players: Vec<UserId>,
    mut lifecycle: broadcast::Receiver<LifecycleEvent>,
    settled: watch::Sender<Settled>,
) where
    G: FightGame,
    S: FightStore,
    R: RoleCheck,
{
    let fight_id = handle.fight_id();
    let outcome = loop {
        match lifecycle.recv().await {
            Ok(LifecycleEvent::Started) => {
                if let Err(err) = inner
                    .store
                    .set_fight_status(fight_id, FightStatus::Active, None)
                    .await
                {
                    tracing::warn!(%fight_id, %err, "failed to mark fight active");
                }
            }
            Ok(LifecycleEvent::Ended(outcome)) => break outcome,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(%fight_id, skipped, "lifecycle events lagged");
            }
            Err(RecvError::Closed) => break FightOutcome::aborted("fight stopped unexpectedly"),
        }
    };

    let result = settle(&inner, fight_id, &players, outcome).await;
    if let Err(err) = &result {
        tracing::error!(%fight_id, %err, "failed to settle fight");
    }

    let _ = handle.shutdown().await;
    {
        let mut index = inner.index.lock().await;
        index.fights.remove(&fight_id);
        index.user_fights.retain(|_, id| *id != fight_id);
    }
    settled.send_replace(Some(result));
}

async fn settle<G, S, R>(
    inner: &Inner<G, S, R>,
    fight_id: FightId,
    players: &[UserId],
    outcome: FightOutcome,
) -> Result<FightResult, RegistryError>
where
    G: FightGame,
    S: FightStore,
{
    let (winner, game_delta) = match &outcome {
        FightOutcome::Won { winner, game_delta } => (winner.clone(), *game_delta),
        FightOutcome::Aborted { reason } => {
            tracing::info!(%fight_id, %reason, "fight aborted, scores untouched");
            inner
                .store
                .set_fight_status(fight_id, FightStatus::Aborted, None)
                .await?;
            return Ok(FightResult {
                fight_id,
                outcome,
                scores: Vec::new(),
            });
        }
    };
    let loser = players
        .iter()
        .find(|user| **user != winner)
        .cloned()
        .ok_or_else(|| FightError::UnknownPlayer {
            player: winner.clone(),
            fight_id,
        })?;

    let scoring = &inner.config.scoring;
    let winner_before = inner.store.score(&winner).await?;
    let loser_before = inner.store.score(&loser).await?;
    let winner_after = scoring.winner_score(winner_before, game_delta);
    let loser_after = scoring.loser_score(loser_before);

    inner
        .store
        .commit_result(
            fight_id,
            ScoreRecord {
                user: winner.clone(),
                score: winner_after,
            },
            ScoreRecord {
                user: loser.clone(),
                score: loser_after,
            },
        )
        .await?;
    tracing::info!(
        %fight_id,
        %winner,
        winner_score = winner_after,
        %loser,
        loser_score = loser_after,
        "fight scored"
    );

    Ok(FightResult {
        fight_id,
        outcome,
        scores: vec![
            ScoreChange {
                user: winner,
                before: winner_before,
                after: winner_after,
            },
            ScoreChange {
                user: loser,
                before: loser_before,
                after: loser_after,
            },
        ],
    })
}
