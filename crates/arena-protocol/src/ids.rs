//! Identity newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque user identity, as resolved by the host application.
///
/// Arena never interprets the string; it only compares and hashes it.
/// `#[serde(transparent)]` keeps the wire form a plain JSON string.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Wraps anything string-like as a user id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A unique identifier for one fight.
///
/// Fights are keyed by random v4 UUIDs so ids can be handed to clients
/// before the fight row is visible to anyone else.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct FightId(pub Uuid);

impl FightId {
    /// Generates a fresh random fight id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FightId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
