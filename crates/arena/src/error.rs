//! Unified error type for Arena.

use arena_fight::FightError;
use arena_protocol::ProtocolError;
use arena_registry::{RegistryError, StoreError};
use tokio_tungstenite::tungstenite;

use crate::AuthError;

/// Wraps the error of every Arena crate, so `?` works across them.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// Binding or accepting sockets.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WebSocket handshake or framing.
    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),

    /// Encoding or decoding a frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A client token was refused.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A fight refused a command.
    #[error(transparent)]
    Fight(#[from] FightError),

    /// The registry refused a request.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ArenaError {
    /// Status code reported to the client in a `rejected` message.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Io(_) | Self::WebSocket(_) | Self::Store(_) => 500,
            Self::Protocol(_) => 400,
            Self::Auth(_) => 401,
            Self::Fight(err) => fight_status(err),
            Self::Registry(err) => match err {
                RegistryError::Forbidden(_) => 403,
                RegistryError::SelfChallenge(_) => 400,
                RegistryError::DuplicateFight(_) => 409,
                RegistryError::NotFound(_) => 404,
                RegistryError::Closed => 503,
                RegistryError::Fight(err) => fight_status(err),
                RegistryError::Store(_) => 500,
            },
        }
    }
}

fn fight_status(err: &FightError) -> u16 {
    match err {
        FightError::IllegalTransition { .. } => 409,
        FightError::UnknownPlayer { .. } => 403,
        FightError::Rejected(_) => 422,
        FightError::Unavailable(_) => 410,
    }
}
