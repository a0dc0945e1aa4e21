//! Rock-paper-scissors, first to `rounds_to_win` rounds.
//!
//! Each round both players pick a hand before the round countdown runs out.
//! A player who didn't pick in time loses the round; if neither picked,
//! the round is replayed. Dropping out during play pauses the round and
//! starts a grace countdown; coming back cancels it, running out aborts the
//! fight.

use std::collections::{BTreeMap, HashMap};

use arena::countdown::{CountdownTimer, TimerEvent, TimerEventKind};
use arena::fight::Barrier;
use arena::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Hand {
    Rock,
    Paper,
    Scissors,
}

impl Hand {
    pub fn beats(self, other: Hand) -> bool {
        matches!(
            (self, other),
            (Hand::Rock, Hand::Scissors) | (Hand::Paper, Hand::Rock) | (Hand::Scissors, Hand::Paper)
        )
    }
}

/// In-game sub-view of a player within the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Choosing,
    Chosen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RpsAction {
    Choose { hand: Hand },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RpsEvent {
    RoundStarted {
        round: u32,
        seconds: u32,
    },
    /// Sent to the chooser only, while the opponent is still choosing.
    Chosen {
        hand: Hand,
    },
    AllChosen,
    #[serde(rename_all = "camelCase")]
    Tick {
        seconds_left: u32,
    },
    RoundResult {
        round: u32,
        hands: BTreeMap<UserId, Hand>,
        winner: Option<UserId>,
        wins: BTreeMap<UserId, u32>,
    },
    GraceStarted {
        player: UserId,
        seconds: u32,
    },
    GraceCancelled {
        player: UserId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RpsConfig {
    pub rounds_to_win: u32,
    pub choose_seconds: u32,
    /// How long a dropped player has to come back.
    pub grace_seconds: u32,
}

impl Default for RpsConfig {
    fn default() -> Self {
        Self {
            rounds_to_win: 2,
            choose_seconds: 10,
            grace_seconds: 15,
        }
    }
}

pub struct RockPaperScissors {
    config: RpsConfig,
    round: u32,
    hands: HashMap<UserId, Hand>,
    wins: BTreeMap<UserId, u32>,
    round_timer: Option<CountdownTimer>,
    grace: HashMap<UserId, CountdownTimer>,
    grace_count: u32,
}

impl FightGame for RockPaperScissors {
    type Config = RpsConfig;
    type View = Choice;
    type Action = RpsAction;
    type Event = RpsEvent;

    const NAME: &'static str = "rock-paper-scissors";

    fn create(config: &RpsConfig, players: &[UserId]) -> Self {
        Self {
            config: config.clone(),
            round: 0,
            hands: HashMap::new(),
            wins: players.iter().map(|player| (player.clone(), 0)).collect(),
            round_timer: None,
            grace: HashMap::new(),
            grace_count: 0,
        }
    }

    fn initial_view(&self) -> Choice {
        Choice::Choosing
    }

    fn on_start(&mut self, ctx: &mut FightContext<Self>) {
        self.start_round(ctx);
    }

    fn handle_action(
        &mut self,
        ctx: &mut FightContext<Self>,
        player: &UserId,
        action: RpsAction,
    ) -> Result<(), FightError> {
        let RpsAction::Choose { hand } = action;
        if ctx.assert_playing(player, "choose")? == Choice::Chosen {
            return Err(FightError::Rejected("hand already chosen this round".into()));
        }

        self.hands.insert(player.clone(), hand);
        ctx.set_view(player, Choice::Chosen)?;
        let barrier = ctx.barrier(
            player,
            |view| *view == View::Playing(Choice::Chosen),
            FightEvent::Game(RpsEvent::Chosen { hand }),
            FightEvent::Game(RpsEvent::AllChosen),
        );
        if barrier == Barrier::All {
            self.finish_round(ctx);
        }
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut FightContext<Self>, event: TimerEvent) {
        if event.label == round_label(self.round) {
            match event.kind {
                TimerEventKind::Update => ctx.emit_game(
                    Recipient::All,
                    RpsEvent::Tick {
                        seconds_left: event.seconds_left,
                    },
                ),
                TimerEventKind::End => {
                    tracing::debug!(fight_id = %ctx.fight_id(), round = self.round, "round timed out");
                    self.finish_round(ctx);
                }
                _ => {}
            }
            return;
        }

        if !event.is_end() {
            return;
        }
        let expired = self
            .grace
            .iter()
            .find(|(_, timer)| timer.label() == event.label)
            .map(|(player, _)| player.clone());
        if let Some(player) = expired {
            tracing::info!(fight_id = %ctx.fight_id(), %player, "grace period over");
            if let Err(err) = ctx.end(FightOutcome::aborted(format!("{player} did not come back"))) {
                tracing::warn!(%err, "could not abort fight");
            }
        }
    }

    fn on_disconnect(&mut self, ctx: &mut FightContext<Self>, player: &UserId) {
        if let Some(timer) = &self.round_timer {
            timer.pause();
        }
        self.grace_count += 1;
        let label = format!("grace:{}:{player}", self.grace_count);
        let timer = ctx.start_timer(self.config.grace_seconds, label);
        self.grace.insert(player.clone(), timer);
        ctx.emit_game(
            Recipient::AllExcept(player.clone()),
            RpsEvent::GraceStarted {
                player: player.clone(),
                seconds: self.config.grace_seconds,
            },
        );
    }

    fn on_reconnect(&mut self, ctx: &mut FightContext<Self>, player: &UserId) {
        if self.grace.remove(player).is_some() {
            ctx.emit_game(
                Recipient::All,
                RpsEvent::GraceCancelled {
                    player: player.clone(),
                },
            );
        }
        if self.grace.is_empty() {
            if let Some(timer) = &self.round_timer {
                timer.resume();
            }
        }
    }

    fn destroy(&mut self) {
        self.round_timer = None;
        self.grace.clear();
    }
}

impl RockPaperScissors {
    fn start_round(&mut self, ctx: &mut FightContext<Self>) {
        self.round += 1;
        self.hands.clear();
        ctx.set_all_views(Choice::Choosing);

        let timer = ctx.start_timer(self.config.choose_seconds, round_label(self.round));
        // Someone is still inside their grace period.
        if !self.grace.is_empty() {
            timer.pause();
        }
        self.round_timer = Some(timer);

        ctx.emit_game(
            Recipient::All,
            RpsEvent::RoundStarted {
                round: self.round,
                seconds: self.config.choose_seconds,
            },
        );
    }

    fn finish_round(&mut self, ctx: &mut FightContext<Self>) {
        self.round_timer = None;

        let winner = self.round_winner(ctx.players());
        if let Some(winner) = &winner {
            *self.wins.entry(winner.clone()).or_default() += 1;
        }
        ctx.emit_game(
            Recipient::All,
            RpsEvent::RoundResult {
                round: self.round,
                hands: self
                    .hands
                    .iter()
                    .map(|(player, hand)| (player.clone(), *hand))
                    .collect(),
                winner: winner.clone(),
                wins: self.wins.clone(),
            },
        );

        match winner {
            Some(winner) if self.wins.get(&winner).copied().unwrap_or(0) >= self.config.rounds_to_win => {
                tracing::info!(fight_id = %ctx.fight_id(), %winner, rounds = self.round, "match decided");
                if let Err(err) = ctx.end(FightOutcome::won(winner)) {
                    tracing::warn!(%err, "could not end fight");
                }
            }
            _ => self.start_round(ctx),
        }
    }

    /// A missing hand loses to any hand; two missing hands is a replay.
    fn round_winner(&self, players: &[UserId]) -> Option<UserId> {
        let [first, second] = players else {
            return None;
        };
        match (self.hands.get(first), self.hands.get(second)) {
            (Some(a), Some(b)) if a.beats(*b) => Some(first.clone()),
            (Some(a), Some(b)) if b.beats(*a) => Some(second.clone()),
            (Some(_), None) => Some(first.clone()),
            (None, Some(_)) => Some(second.clone()),
            _ => None,
        }
    }
}

fn round_label(round: u32) -> String {
    format!("round:{round}")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use arena::fight::{Coordinator, PlayerSender};
    use tokio::sync::mpsc;

    use super::*;

    type Inbox = mpsc::UnboundedReceiver<Notice<RpsEvent>>;

    fn alice() -> UserId {
        UserId::from("alice")
    }

    fn bob() -> UserId {
        UserId::from("bob")
    }

    fn drain(rx: &mut Inbox) -> Vec<FightEvent<RpsEvent>> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|notice| notice.as_fight().map(|env| env.event.clone()))
            .collect()
    }

    fn games(events: Vec<FightEvent<RpsEvent>>) -> Vec<RpsEvent> {
        events
            .into_iter()
            .filter_map(|event| match event {
                FightEvent::Game(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    fn started(config: RpsConfig) -> (Coordinator<RockPaperScissors>, Inbox, Inbox) {
        let mut fight = Coordinator::new(FightId::new(), vec![alice(), bob()], &config);
        let (tx_a, mut a): (PlayerSender<RpsEvent>, Inbox) = mpsc::unbounded_channel();
        let (tx_b, mut b): (PlayerSender<RpsEvent>, Inbox) = mpsc::unbounded_channel();
        fight.attach(&alice(), tx_a).unwrap();
        fight.attach(&bob(), tx_b).unwrap();
        for player in [alice(), bob()] {
            fight.player_join(&player).unwrap();
        }
        for player in [alice(), bob()] {
            fight.player_ready(&player).unwrap();
        }
        drain(&mut a);
        drain(&mut b);
        (fight, a, b)
    }

    fn choose(fight: &mut Coordinator<RockPaperScissors>, player: UserId, hand: Hand) {
        fight
            .handle_action(&player, RpsAction::Choose { hand })
            .unwrap();
    }

    /// Feeds timer events to the fight until `done` holds.
    async fn pump_until(
        fight: &mut Coordinator<RockPaperScissors>,
        done: impl Fn(&Coordinator<RockPaperScissors>) -> bool,
    ) {
        for _ in 0..100 {
            if done(fight) {
                return;
            }
            let event = fight.next_timer_event().await.unwrap();
            fight.timer_event(event);
        }
        panic!("condition not reached");
    }

    fn round_started(fight: &Coordinator<RockPaperScissors>, round: u32) -> bool {
        fight.log().iter().any(|env| {
            matches!(&env.event, FightEvent::Game(RpsEvent::RoundStarted { round: r, .. }) if *r == round)
        })
    }

    #[test]
    fn test_each_hand_beats_exactly_one_other() {
        let hands = [Hand::Rock, Hand::Paper, Hand::Scissors];
        for hand in hands {
            let beaten = hands.iter().filter(|other| hand.beats(**other)).count();
            assert_eq!(beaten, 1, "{hand:?}");
            assert!(!hand.beats(hand));
        }
        assert!(Hand::Paper.beats(Hand::Rock));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_to_two_rounds_wins() {
        let (mut fight, mut a, _b) = started(RpsConfig::default());

        choose(&mut fight, alice(), Hand::Rock);
        choose(&mut fight, bob(), Hand::Scissors);
        assert!(!fight.is_ended());
        choose(&mut fight, alice(), Hand::Paper);
        choose(&mut fight, bob(), Hand::Rock);

        assert!(fight.is_ended());
        assert_eq!(fight.outcome(), Some(&FightOutcome::won(alice())));

        let events = drain(&mut a);
        assert_eq!(
            events.last(),
            Some(&FightEvent::End {
                winner: Some(alice()),
            })
        );
        let last_result = games(events)
            .into_iter()
            .rev()
            .find(|event| matches!(event, RpsEvent::RoundResult { .. }));
        assert_eq!(
            last_result,
            Some(RpsEvent::RoundResult {
                round: 2,
                hands: BTreeMap::from([(alice(), Hand::Paper), (bob(), Hand::Rock)]),
                winner: Some(alice()),
                wins: BTreeMap::from([(alice(), 2), (bob(), 0)]),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_chosen_is_partial_until_both_pick() {
        let (mut fight, mut a, mut b) = started(RpsConfig::default());

        choose(&mut fight, alice(), Hand::Rock);
        assert_eq!(drain(&mut a), vec![FightEvent::Game(RpsEvent::Chosen { hand: Hand::Rock })]);
        assert!(drain(&mut b).is_empty());

        choose(&mut fight, bob(), Hand::Rock);
        let events = games(drain(&mut b));
        assert_eq!(events[0], RpsEvent::AllChosen);
        assert!(matches!(
            events[1],
            RpsEvent::RoundResult { winner: None, .. }
        ));
        assert_eq!(
            events[2],
            RpsEvent::RoundStarted {
                round: 2,
                seconds: 10,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_choosing_twice_is_rejected() {
        let (mut fight, mut a, _b) = started(RpsConfig::default());

        choose(&mut fight, alice(), Hand::Rock);
        drain(&mut a);
        let err = fight
            .handle_action(&alice(), RpsAction::Choose { hand: Hand::Paper })
            .unwrap_err();
        assert_eq!(err, FightError::Rejected("hand already chosen this round".into()));
        assert!(drain(&mut a).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_timer_ticks_and_missing_hand_loses() {
        let config = RpsConfig {
            choose_seconds: 3,
            ..RpsConfig::default()
        };
        let (mut fight, mut a, _b) = started(config);

        choose(&mut fight, alice(), Hand::Scissors);
        pump_until(&mut fight, |fight| round_started(fight, 2)).await;

        let events = games(drain(&mut a));
        assert!(events.contains(&RpsEvent::Tick { seconds_left: 2 }));
        assert!(events.contains(&RpsEvent::Tick { seconds_left: 1 }));
        assert!(events.contains(&RpsEvent::RoundResult {
            round: 1,
            hands: BTreeMap::from([(alice(), Hand::Scissors)]),
            winner: Some(alice()),
            wins: BTreeMap::from([(alice(), 1), (bob(), 0)]),
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_running_out_aborts() {
        let config = RpsConfig {
            grace_seconds: 2,
            ..RpsConfig::default()
        };
        let (mut fight, mut a, _b) = started(config);

        fight.disconnect(&bob()).unwrap();
        assert_eq!(
            drain(&mut a),
            vec![
                FightEvent::Disconnect { player: bob() },
                FightEvent::Game(RpsEvent::GraceStarted {
                    player: bob(),
                    seconds: 2,
                }),
            ]
        );

        pump_until(&mut fight, |fight| fight.is_ended()).await;
        assert_eq!(
            fight.outcome(),
            Some(&FightOutcome::aborted("bob did not come back"))
        );
        assert_eq!(drain(&mut a).last(), Some(&FightEvent::End { winner: None }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnecting_cancels_the_grace_period() {
        let config = RpsConfig {
            choose_seconds: 60,
            grace_seconds: 2,
            ..RpsConfig::default()
        };
        let (mut fight, mut a, _b) = started(config);

        fight.disconnect(&bob()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        fight.connect(&bob(), None).unwrap();

        let events = drain(&mut a);
        assert!(events.contains(&FightEvent::Reconnect { player: bob() }));
        assert!(events.contains(&FightEvent::Game(RpsEvent::GraceCancelled { player: bob() })));

        for _ in 0..10 {
            let event = fight.next_timer_event().await.unwrap();
            fight.timer_event(event);
        }
        assert!(!fight.is_ended());
        assert_eq!(fight.phase(), FightPhase::InProgress);
    }
}
