//! The fight coordinator: shared lifecycle plus one concrete game.
//!
//! ```text
//! join ──▶ (all joined?) ──▶ ready ──▶ (all ready?) ──▶ game ──▶ end
//!  │            │              │            │
//!  └ joined     └ allJoined    └ readied    └ allReady, on_start
//! ```
//!
//! Every operation first asserts the caller's view. A call from the wrong
//! view returns [`FightError::IllegalTransition`] and changes nothing, so
//! a client can safely retry or replay messages.
//!
//! The coordinator is plain synchronous state. It runs inside a fight
//! actor (see [`spawn_fight`](crate::spawn_fight)) which serializes
//! player commands and timer events through it.

use arena_countdown::{TimerEvent, TimerEvents};
use arena_protocol::{FightEnvelope, FightEvent, FightId, Recipient, UserId};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::context::{Barrier, FightContext};
use crate::player::{PlayerEvent, PlayerSender};
use crate::{
    FightError, FightGame, FightOutcome, FightPhase, FightSnapshot, LifecycleEvent, View,
};

/// One fight: the shared context composed with the game that runs in it.
pub struct Coordinator<G: FightGame> {
    ctx: FightContext<G>,
    game: G,
    timer_events: TimerEvents,
    destroyed: bool,
}

impl<G: FightGame> Coordinator<G> {
    /// Creates a fight between `players`, in roster order.
    pub fn new(fight_id: FightId, players: Vec<UserId>, config: &G::Config) -> Self {
        let (ctx, timer_events) = FightContext::new(fight_id, players, &G::fight_config());
        let game = G::create(config, ctx.players());
        debug!(%fight_id, game = G::NAME, players = ?ctx.players(), "fight created");
        Self {
            ctx,
            game,
            timer_events,
            destroyed: false,
        }
    }

    pub fn fight_id(&self) -> FightId {
        self.ctx.fight_id()
    }

    pub fn phase(&self) -> FightPhase {
        self.ctx.phase()
    }

    pub fn context(&self) -> &FightContext<G> {
        &self.ctx
    }

    pub fn game(&self) -> &G {
        &self.game
    }

    pub fn view(&self, player: &UserId) -> Option<View<G::View>> {
        self.ctx.view(player).ok()
    }

    pub fn is_ended(&self) -> bool {
        self.ctx.is_ended()
    }

    pub fn outcome(&self) -> Option<&FightOutcome> {
        self.ctx.outcome()
    }

    /// A copy of the event log.
    pub fn log(&self) -> Vec<FightEnvelope<G::Event>> {
        self.ctx.log().cloned().collect()
    }

    /// Subscribes to `Started` / `Ended`. Subscribe before the fight can
    /// end, events sent earlier are not replayed.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.ctx.subscribe()
    }

    /// Waits for the next event from any timer this fight started.
    ///
    /// Cancel-safe, so it can sit in a `select!` loop.
    pub async fn next_timer_event(&mut self) -> Option<TimerEvent> {
        self.timer_events.recv().await
    }

    /// Sets the outbound channel of `player` without touching the
    /// lifecycle. The registry attaches every participant's channel before
    /// the fight is handed out.
    pub fn attach(
        &mut self,
        player: &UserId,
        channel: PlayerSender<G::Event>,
    ) -> Result<(), FightError> {
        self.ctx.attach(player, channel)
    }

    // -- Lifecycle operations -------------------------------------------------

    /// `none → joined`.
    pub fn player_join(&mut self, player: &UserId) -> Result<(), FightError> {
        self.ctx.assert_view(player, "join", &[View::None])?;

        self.ctx.set_phase(FightPhase::Joining);
        self.ctx.set_milestone(player, View::Joined);
        if let Some(PlayerEvent::Joined(id)) = self.ctx.player_mut(player)?.join() {
            self.ctx.emit(
                Recipient::AllExcept(id.clone()),
                FightEvent::OpponentJoined { player: id },
            );
        }
        info!(fight_id = %self.fight_id(), %player, "player joined");

        let barrier = self.ctx.barrier(
            player,
            |view| *view != View::None,
            FightEvent::Joined {
                player: player.clone(),
            },
            FightEvent::AllJoined,
        );
        if barrier == Barrier::All {
            self.ctx.set_phase(FightPhase::Readying);
        }
        Ok(())
    }

    /// `joined → ready`. The last player to get ready starts the game.
    pub fn player_ready(&mut self, player: &UserId) -> Result<(), FightError> {
        self.ctx.assert_view(player, "ready", &[View::Joined])?;

        self.ctx.set_milestone(player, View::Ready);
        if let Some(PlayerEvent::Ready(id)) = self.ctx.player_mut(player)?.ready() {
            self.ctx.emit(
                Recipient::AllExcept(id.clone()),
                FightEvent::OpponentReadied { player: id },
            );
        }
        info!(fight_id = %self.fight_id(), %player, "player ready");

        let barrier = self.ctx.barrier(
            player,
            |view| *view == View::Ready,
            FightEvent::Readied {
                player: player.clone(),
            },
            FightEvent::AllReady,
        );
        if barrier == Barrier::All {
            self.start_game()?;
        }
        Ok(())
    }

    fn start_game(&mut self) -> Result<(), FightError> {
        let initial = self.game.initial_view();
        for id in self.ctx.players().to_vec() {
            self.ctx.set_milestone(&id, View::Playing(initial));
            self.ctx.player_mut(&id)?.game_start();
        }
        self.ctx.set_phase(FightPhase::InProgress);
        self.ctx.announce(LifecycleEvent::Started);
        info!(fight_id = %self.fight_id(), game = G::NAME, "game started");

        self.game.on_start(&mut self.ctx);
        Ok(())
    }

    /// Routes an in-game action to the game.
    pub fn handle_action(
        &mut self,
        player: &UserId,
        action: G::Action,
    ) -> Result<(), FightError> {
        self.ctx.assert_playing(player, "act")?;
        debug!(fight_id = %self.fight_id(), %player, ?action, "action");
        self.game.handle_action(&mut self.ctx, player, action)
    }

    // -- Connection -----------------------------------------------------------

    /// The player's connection came back, optionally on a new channel.
    pub fn connect(
        &mut self,
        player: &UserId,
        channel: Option<PlayerSender<G::Event>>,
    ) -> Result<(), FightError> {
        let machine = self.ctx.player_mut(player)?;
        if let Some(channel) = channel {
            machine.attach(channel);
        }
        if let Some(PlayerEvent::Reconnect(id)) = machine.connect() {
            info!(fight_id = %self.fight_id(), player = %id, "player reconnected");
            self.ctx.emit(
                Recipient::AllExcept(id.clone()),
                FightEvent::Reconnect { player: id },
            );
            if self.phase() == FightPhase::InProgress {
                self.game.on_reconnect(&mut self.ctx, player);
            }
        }
        Ok(())
    }

    /// The player's connection dropped. Their channel is detached.
    pub fn disconnect(&mut self, player: &UserId) -> Result<(), FightError> {
        let machine = self.ctx.player_mut(player)?;
        let event = machine.disconnect();
        machine.detach();
        if let Some(PlayerEvent::Disconnect(id)) = event {
            info!(fight_id = %self.fight_id(), player = %id, "player disconnected");
            self.ctx.emit(
                Recipient::AllExcept(id.clone()),
                FightEvent::Disconnect { player: id },
            );
            if self.phase() == FightPhase::InProgress {
                self.game.on_disconnect(&mut self.ctx, player);
            }
        }
        Ok(())
    }

    // -- Timers, abort, teardown ----------------------------------------------

    /// Hands a timer event to the game, unless the fight already ended.
    pub fn timer_event(&mut self, event: TimerEvent) {
        if self.is_ended() || self.destroyed {
            return;
        }
        self.game.on_timer(&mut self.ctx, event);
    }

    /// Ends the fight with no winner. No-op once ended.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.ctx.finish(FightOutcome::aborted(reason));
    }

    /// Tears the fight down: the game cancels its timers and every
    /// player's channel is released. Runs once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.game.destroy();
        self.ctx.cleanup_players();
        debug!(fight_id = %self.fight_id(), "fight destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn snapshot(&self) -> FightSnapshot {
        self.ctx.snapshot()
    }
}
