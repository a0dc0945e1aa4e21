//! Wire vocabulary for Arena.
//!
//! This crate defines what travels between the fight engine and the
//! clients taking part in a fight:
//!
//! - **Identity** ([`UserId`], [`FightId`]): who is fighting, and where.
//! - **Events** ([`FightEvent`], [`FightEnvelope`], [`Notice`]): what the
//!   engine tells a player, statically typed per concrete game.
//! - **Commands** ([`ClientCommand`], [`ServerMessage`]): the gateway's
//!   request/response frames.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames become bytes.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about timers, coordinators, or storage.
//! It only describes messages:
//!
//! ```text
//! Gateway (bytes) → Protocol (ClientCommand / Notice) → Registry / Fight
//! ```

mod codec;
mod command;
mod error;
mod event;
mod ids;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use command::{ClientCommand, ServerMessage};
pub use error::ProtocolError;
pub use event::{FightEnvelope, FightEvent, Invitation, Notice, Recipient};
pub use ids::{FightId, UserId};
