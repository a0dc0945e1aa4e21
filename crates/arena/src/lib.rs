//! # Arena
//!
//! Two-player, server-authoritative fights for web games.
//!
//! A game implements [`FightGame`]; Arena drives the shared lifecycle
//! around it (join barrier, ready barrier, start, end), keeps an event
//! log per fight, runs countdown timers, and settles scores when a fight
//! is won. The [`ArenaServer`] puts a WebSocket gateway in front of a
//! [`FightRegistry`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arena::prelude::*;
//!
//! // Implement FightGame for your game, then:
//! // let server = ArenaServerBuilder::new()
//! //     .bind("0.0.0.0:8080")
//! //     .build::<MyGame, _, _, _>((), MemoryStore::new(), AllowAll, TokenAuth)
//! //     .await?;
//! // server.run().await
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod handler;
mod server;

pub use auth::{AuthError, Authenticator, TokenAuth};
pub use error::ArenaError;
pub use server::{ArenaServer, ArenaServerBuilder, GatewayConfig};

pub use arena_countdown as countdown;
pub use arena_fight as fight;
pub use arena_protocol as protocol;
pub use arena_registry as registry;

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, falling back to
/// `info`. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Everything a game crate usually needs.
pub mod prelude {
    pub use crate::{
        ArenaError, ArenaServer, ArenaServerBuilder, AuthError, Authenticator,
        GatewayConfig, TokenAuth, init_tracing,
    };
    pub use arena_countdown::{CountdownTimer, TimerEvent, TimerEventKind};
    pub use arena_fight::{
        FightConfig, FightContext, FightError, FightGame, FightHandle,
        FightOutcome, FightPhase, View,
    };
    pub use arena_protocol::{
        ClientCommand, FightEvent, FightId, Notice, Recipient, ServerMessage,
        UserId,
    };
    pub use arena_registry::{
        AllowAll, FightRegistry, FightStore, MemoryStore, RegistryConfig,
        RegistryError, RoleCheck, ScoringConfig,
    };
}
