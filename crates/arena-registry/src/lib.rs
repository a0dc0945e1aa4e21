//! Fight registry for Arena.
//!
//! Owns every live fight of one game, enforces "one fight per user",
//! persists fight rows through a [`FightStore`], applies scoring when a
//! fight is won, and delivers notices to users through the [`Hub`].
//!
//! Nothing here is global: build a [`FightRegistry`] with its store, role
//! check and hub, share clones of it, and call
//! [`FightRegistry::shutdown`] when done.

#![allow(async_fn_in_trait)]

mod access;
mod error;
mod hub;
mod memory;
mod registry;
mod scoring;
mod store;

pub use access::{AllowAll, RoleCheck};
pub use arena_fight::PlayerSender;
pub use error::{RegistryError, StoreError};
pub use hub::{Hub, NoticeReceiver};
pub use memory::MemoryStore;
pub use registry::{FightCompletion, FightRegistry, FightResult, FightTicket, RegistryConfig};
pub use scoring::{ScoreChange, ScoringConfig};
pub use store::{FightRecord, FightStatus, FightStore, ScoreRecord};
