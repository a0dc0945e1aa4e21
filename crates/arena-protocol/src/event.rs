//! The typed event vocabulary a fight speaks to its players.
//!
//! Every concrete game extends the shared base vocabulary with its own
//! event type `E`, carried in [`FightEvent::Game`]. There is no string
//! bus: a channel of `Notice<E>` can only ever carry events that the game
//! declared.

use serde::{Deserialize, Serialize};

use crate::{FightId, UserId};

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who should receive an emitted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Broadcast to every player of the fight.
    All,

    /// Directed to one player.
    Player(UserId),

    /// Everyone except the given player. Used to tell opponents about a
    /// step the acting player already knows about.
    AllExcept(UserId),
}

// ---------------------------------------------------------------------------
// FightEvent
// ---------------------------------------------------------------------------

/// One event on a player's fight channel.
///
/// `#[serde(tag = "event", content = "data")]` gives the adjacently tagged
/// shape clients expect:
///
/// ```text
/// { "event": "opponentJoined", "data": { "player": "bob" } }
/// { "event": "allReady" }
/// { "event": "game", "data": { ...game specific... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum FightEvent<E> {
    /// You joined; not everyone has yet.
    Joined { player: UserId },
    /// Another participant joined.
    OpponentJoined { player: UserId },
    /// Every participant has joined.
    AllJoined,
    /// You are ready; not everyone is yet.
    Readied { player: UserId },
    /// Another participant is ready.
    OpponentReadied { player: UserId },
    /// Every participant is ready; the game starts.
    AllReady,
    /// A committed participant lost their connection.
    Disconnect { player: UserId },
    /// A committed participant came back.
    Reconnect { player: UserId },
    /// Game-specific event.
    Game(E),
    /// The fight is over. `winner` is `None` for an aborted fight.
    End { winner: Option<UserId> },
}

impl<E> FightEvent<E> {
    /// The wire name of this event, as it appears in the `event` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "joined",
            Self::OpponentJoined { .. } => "opponentJoined",
            Self::AllJoined => "allJoined",
            Self::Readied { .. } => "readied",
            Self::OpponentReadied { .. } => "opponentReadied",
            Self::AllReady => "allReady",
            Self::Disconnect { .. } => "disconnect",
            Self::Reconnect { .. } => "reconnect",
            Self::Game(_) => "game",
            Self::End { .. } => "end",
        }
    }
}

/// A [`FightEvent`] stamped with the fight it belongs to.
///
/// The event is flattened so the wire form is a single
/// `{event, data, fightId}` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FightEnvelope<E> {
    #[serde(flatten)]
    pub event: FightEvent<E>,
    pub fight_id: FightId,
}

// ---------------------------------------------------------------------------
// Notice: everything a user's channel can carry
// ---------------------------------------------------------------------------

/// An invitation pushed to the challenged user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub fight_id: FightId,
    /// Name of the game being played.
    pub game: String,
    /// Who issued the challenge.
    pub from: UserId,
}

/// A message on a user's subscription channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum Notice<E> {
    /// Somebody challenged this user.
    Invitation(Invitation),
    /// An event from a fight this user takes part in.
    Fight(FightEnvelope<E>),
}

impl<E> Notice<E> {
    /// Returns the fight envelope, if this notice carries one.
    pub fn as_fight(&self) -> Option<&FightEnvelope<E>> {
        match self {
            Self::Fight(envelope) => Some(envelope),
            Self::Invitation(_) => None,
        }
    }
}
