//! Shared fight state: roster, views, barriers and event delivery.
//!
//! [`FightContext`] is everything a running game is allowed to touch. The
//! coordinator drives the shared lifecycle through it, and hands it to
//! the game on every callback.

use std::collections::{BTreeMap, HashMap, VecDeque};

use arena_countdown::{CountdownTimer, TimerEvents, TimerSink};
use arena_protocol::{FightEnvelope, FightEvent, FightId, Notice, Recipient, UserId};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::player::{PlayerSender, PlayerStateMachine};
use crate::{
    FightConfig, FightError, FightGame, FightOutcome, FightPhase, FightSnapshot,
    LifecycleEvent, View,
};

/// Result of evaluating a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    /// Every player reached the milestone; the aggregate event was
    /// broadcast.
    All,
    /// Somebody is still missing; only the advancing player was told.
    Partial,
}

/// Shared barrier-and-view tracking for one fight.
pub struct FightContext<G: FightGame> {
    fight_id: FightId,
    phase: FightPhase,
    /// Participants in the order they were given. Delivery follows it.
    roster: Vec<UserId>,
    views: HashMap<UserId, View<G::View>>,
    players: HashMap<UserId, PlayerStateMachine<G::Event>>,
    log: VecDeque<FightEnvelope<G::Event>>,
    log_capacity: usize,
    outcome: Option<FightOutcome>,
    timer_sink: TimerSink,
    lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl<G: FightGame> FightContext<G> {
    pub(crate) fn new(
        fight_id: FightId,
        players: Vec<UserId>,
        config: &FightConfig,
    ) -> (Self, TimerEvents) {
        let mut roster = Vec::with_capacity(players.len());
        for id in players {
            if !roster.contains(&id) {
                roster.push(id);
            }
        }
        let views = roster.iter().map(|id| (id.clone(), View::None)).collect();
        let players = roster
            .iter()
            .map(|id| (id.clone(), PlayerStateMachine::new(id.clone())))
            .collect();
        let (timer_sink, timer_events) = mpsc::unbounded_channel();
        let (lifecycle, _) = broadcast::channel(8);

        let ctx = Self {
            fight_id,
            phase: FightPhase::Init,
            roster,
            views,
            players,
            log: VecDeque::new(),
            log_capacity: config.log_capacity.max(1),
            outcome: None,
            timer_sink,
            lifecycle,
        };
        (ctx, timer_events)
    }

    // -- Queries --------------------------------------------------------------

    pub fn fight_id(&self) -> FightId {
        self.fight_id
    }

    pub fn phase(&self) -> FightPhase {
        self.phase
    }

    /// Participants in roster order.
    pub fn players(&self) -> &[UserId] {
        &self.roster
    }

    /// The first participant other than `player`.
    pub fn opponent_of(&self, player: &UserId) -> Option<&UserId> {
        self.roster.iter().find(|id| *id != player)
    }

    pub fn is_participant(&self, player: &UserId) -> bool {
        self.players.contains_key(player)
    }

    pub fn is_connected(&self, player: &UserId) -> bool {
        self.players.get(player).is_some_and(|p| p.is_connected())
    }

    pub fn is_ended(&self) -> bool {
        self.phase == FightPhase::Ended
    }

    /// How the fight ended, once it has.
    pub fn outcome(&self) -> Option<&FightOutcome> {
        self.outcome.as_ref()
    }

    /// Every envelope emitted so far, oldest first.
    pub fn log(&self) -> impl Iterator<Item = &FightEnvelope<G::Event>> {
        self.log.iter()
    }

    // -- Views ----------------------------------------------------------------

    /// The coordinator's current view of `player`.
    pub fn view(&self, player: &UserId) -> Result<View<G::View>, FightError> {
        self.views
            .get(player)
            .copied()
            .ok_or_else(|| self.unknown(player))
    }

    /// Checks that `player` is in one of the `allowed` views.
    ///
    /// Returns the current view on success, and an
    /// [`FightError::IllegalTransition`] naming `action` otherwise.
    pub fn assert_view(
        &self,
        player: &UserId,
        action: &str,
        allowed: &[View<G::View>],
    ) -> Result<View<G::View>, FightError> {
        let current = self.view(player)?;
        if allowed.contains(&current) {
            return Ok(current);
        }
        Err(FightError::IllegalTransition {
            player: player.clone(),
            action: action.to_owned(),
            current: current.to_string(),
            allowed: allowed.iter().map(ToString::to_string).collect(),
        })
    }

    /// Checks that `player` is in the game proper and returns their
    /// in-game sub-view.
    pub fn assert_playing(
        &self,
        player: &UserId,
        action: &str,
    ) -> Result<G::View, FightError> {
        match self.view(player)? {
            View::Playing(sub) => Ok(sub),
            current => Err(FightError::IllegalTransition {
                player: player.clone(),
                action: action.to_owned(),
                current: current.to_string(),
                allowed: vec!["in-game".to_owned()],
            }),
        }
    }

    /// Moves an in-game player to another sub-view.
    ///
    /// Only the in-game refinement can be set by games; the shared
    /// milestones belong to the coordinator.
    pub fn set_view(&mut self, player: &UserId, sub: G::View) -> Result<(), FightError> {
        self.assert_playing(player, "change view")?;
        trace!(fight_id = %self.fight_id, %player, ?sub, "view changed");
        self.views.insert(player.clone(), View::Playing(sub));
        Ok(())
    }

    /// Moves every in-game player to `sub`, e.g. at the start of a round.
    pub fn set_all_views(&mut self, sub: G::View) {
        for view in self.views.values_mut() {
            if view.is_playing() {
                *view = View::Playing(sub);
            }
        }
    }

    /// Evaluates the all-or-some barrier after `player` advanced.
    ///
    /// If every player's view satisfies `reached`, `all` is broadcast;
    /// otherwise `partial` goes to `player` alone.
    pub fn barrier(
        &mut self,
        player: &UserId,
        reached: impl Fn(&View<G::View>) -> bool,
        partial: FightEvent<G::Event>,
        all: FightEvent<G::Event>,
    ) -> Barrier {
        let everyone = self
            .roster
            .iter()
            .all(|id| self.views.get(id).is_some_and(|view| reached(view)));

        if everyone {
            self.emit(Recipient::All, all);
            Barrier::All
        } else {
            self.emit(Recipient::Player(player.clone()), partial);
            Barrier::Partial
        }
    }

    // -- Delivery -------------------------------------------------------------

    /// Logs `event` and delivers it to `recipient`.
    pub fn emit(&mut self, recipient: Recipient, event: FightEvent<G::Event>) {
        trace!(fight_id = %self.fight_id, event = event.name(), ?recipient, "emit");
        let envelope = FightEnvelope {
            event,
            fight_id: self.fight_id,
        };
        if self.log.len() == self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(envelope.clone());

        for id in &self.roster {
            let wanted = match &recipient {
                Recipient::All => true,
                Recipient::Player(target) => target == id,
                Recipient::AllExcept(excluded) => excluded != id,
            };
            if !wanted {
                continue;
            }
            if let Some(player) = self.players.get(id) {
                if !player.send(Notice::Fight(envelope.clone())) {
                    trace!(fight_id = %self.fight_id, player = %id, "player unreachable");
                }
            }
        }
    }

    /// Shorthand for emitting a game-specific event.
    pub fn emit_game(&mut self, recipient: Recipient, event: G::Event) {
        self.emit(recipient, FightEvent::Game(event));
    }

    // -- Timers ---------------------------------------------------------------

    /// Starts a countdown whose events come back through
    /// `FightGame::on_timer`. The caller owns the timer and must cancel
    /// it in `destroy`.
    pub fn start_timer(&self, total_seconds: u32, label: impl Into<String>) -> CountdownTimer {
        CountdownTimer::start_with_sink(total_seconds, label, self.timer_sink.clone())
    }

    // -- Ending ---------------------------------------------------------------

    /// Ends the fight.
    ///
    /// Broadcasts `end {winner}` and publishes the outcome on the lifecycle
    /// channel. Every call after the first is ignored. A winner who isn't
    /// a participant is rejected.
    pub fn end(&mut self, outcome: FightOutcome) -> Result<(), FightError> {
        if let Some(winner) = outcome.winner() {
            if !self.is_participant(winner) {
                return Err(self.unknown(winner));
            }
        }
        self.finish(outcome);
        Ok(())
    }

    pub(crate) fn finish(&mut self, outcome: FightOutcome) {
        if self.is_ended() {
            debug!(fight_id = %self.fight_id, ?outcome, "fight already ended");
            return;
        }
        self.set_phase(FightPhase::Ended);
        for id in &self.roster {
            self.views.insert(id.clone(), View::Ended);
            if let Some(player) = self.players.get_mut(id) {
                player.game_end();
            }
        }

        info!(fight_id = %self.fight_id, ?outcome, "fight ended");
        let winner = outcome.winner().cloned();
        self.emit(Recipient::All, FightEvent::End { winner });
        self.outcome = Some(outcome.clone());
        // No subscriber is fine: nobody is waiting for this fight.
        let _ = self.lifecycle.send(LifecycleEvent::Ended(outcome));
    }

    // -- Coordinator internals ------------------------------------------------

    pub(crate) fn set_phase(&mut self, target: FightPhase) {
        if self.phase == target {
            return;
        }
        if !self.phase.can_transition_to(target) {
            warn!(fight_id = %self.fight_id, from = %self.phase, to = %target, "illegal phase transition");
            return;
        }
        debug!(fight_id = %self.fight_id, from = %self.phase, to = %target, "phase transition");
        self.phase = target;
    }

    pub(crate) fn set_milestone(&mut self, player: &UserId, view: View<G::View>) {
        self.views.insert(player.clone(), view);
    }

    pub(crate) fn player_mut(
        &mut self,
        player: &UserId,
    ) -> Result<&mut PlayerStateMachine<G::Event>, FightError> {
        let fight_id = self.fight_id;
        self.players
            .get_mut(player)
            .ok_or_else(|| FightError::UnknownPlayer {
                player: player.clone(),
                fight_id,
            })
    }

    pub(crate) fn attach(
        &mut self,
        player: &UserId,
        channel: PlayerSender<G::Event>,
    ) -> Result<(), FightError> {
        self.player_mut(player)?.attach(channel);
        Ok(())
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    pub(crate) fn announce(&self, event: LifecycleEvent) {
        let _ = self.lifecycle.send(event);
    }

    pub(crate) fn cleanup_players(&mut self) {
        for player in self.players.values_mut() {
            player.cleanup();
        }
    }

    pub(crate) fn snapshot(&self) -> FightSnapshot {
        let joined_players = self
            .roster
            .iter()
            .filter(|id| self.players.get(*id).is_some_and(|p| p.has_joined()))
            .cloned()
            .collect();
        let players: BTreeMap<_, _> = self
            .roster
            .iter()
            .filter_map(|id| Some((id.clone(), self.views.get(id)?.to_string())))
            .collect();
        let connected = self
            .roster
            .iter()
            .filter(|id| self.is_connected(id))
            .cloned()
            .collect();

        FightSnapshot {
            fight_id: self.fight_id,
            server_state: self.phase,
            joined_players,
            players,
            connected,
        }
    }

    fn unknown(&self, player: &UserId) -> FightError {
        FightError::UnknownPlayer {
            player: player.clone(),
            fight_id: self.fight_id,
        }
    }
}
