//! Role check consulted before a fight is created.

use std::collections::HashSet;
use std::future::Future;

use arena_protocol::UserId;

/// Decides whether a user may take part in fights.
pub trait RoleCheck: Send + Sync + 'static {
    fn can_fight(&self, user: &UserId) -> impl Future<Output = bool> + Send;
}

/// Lets everybody fight. For development and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RoleCheck for AllowAll {
    async fn can_fight(&self, _user: &UserId) -> bool {
        true
    }
}

/// Only the listed users hold the fighter role.
impl RoleCheck for HashSet<UserId> {
    async fn can_fight(&self, user: &UserId) -> bool {
        self.contains(user)
    }
}
