//! Fight lifecycle for Arena.
//!
//! A fight takes a fixed roster of players through the same milestones:
//!
//! ```text
//! join → (all joined) → ready → (all ready) → game → end
//! ```
//!
//! The [`Coordinator`] enforces that order with per-player views and
//! all-or-some barriers, and hands the in-game phase to a concrete
//! [`FightGame`]. [`spawn_fight`] runs a coordinator as an actor, reachable
//! through a cloneable [`FightHandle`].

mod actor;
mod context;
mod coordinator;
mod error;
mod game;
pub mod player;
mod view;

pub use actor::{FightHandle, spawn_fight};
pub use context::{Barrier, FightContext};
pub use coordinator::Coordinator;
pub use error::FightError;
pub use game::{FightGame, FightOutcome, LifecycleEvent};
pub use player::{PlayerEvent, PlayerSender, PlayerStateMachine};
pub use view::{FightConfig, FightPhase, FightSnapshot, PlayerView, View};
