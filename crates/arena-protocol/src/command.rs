//! Gateway frames: what a client sends and what it gets back directly.
//!
//! Fight events are not answers to commands; they arrive asynchronously as
//! [`ServerMessage::Notice`] whenever the fight produces them.

use serde::{Deserialize, Serialize};

use crate::{FightId, Notice, UserId};

/// A command from a connected client.
///
/// `A` is the concrete game's action type (a move).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientCommand<A> {
    /// First frame on every connection. `token` is resolved to a
    /// [`UserId`] by the gateway's authenticator.
    Hello { token: String },

    /// Challenge another user to a fight.
    Challenge { opponent: UserId },

    /// Join a fight you were invited to (or created).
    #[serde(rename_all = "camelCase")]
    Join { fight_id: FightId },

    /// Declare yourself ready to play.
    #[serde(rename_all = "camelCase")]
    Ready { fight_id: FightId },

    /// A game move.
    #[serde(rename_all = "camelCase")]
    Action { fight_id: FightId, action: A },
}

/// A frame sent from the gateway to one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ServerMessage<E> {
    /// Handshake accepted.
    #[serde(rename_all = "camelCase")]
    Welcome { user_id: UserId },

    /// A challenge was accepted and the fight exists.
    #[serde(rename_all = "camelCase")]
    FightCreated { fight_id: FightId },

    /// Something pushed onto the user's channel.
    Notice(Notice<E>),

    /// The last command was refused. Only the offending client sees this.
    Rejected { code: u16, message: String },
}
