//! Token authentication for the gateway.
//!
//! Arena doesn't know how your users log in. The gateway hands the token
//! from the client's `hello` command to an [`Authenticator`] and uses the
//! returned [`UserId`] for the rest of the connection.

use std::future::Future;

use arena_protocol::UserId;

/// Why a token was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("authentication failed: {0}")]
pub struct AuthError(pub String);

/// Resolves a client token to a user.
///
/// ```rust
/// use arena::{AuthError, Authenticator};
/// use arena::protocol::UserId;
///
/// /// Accepts tokens of the form `user:<name>`.
/// struct PrefixAuth;
///
/// impl Authenticator for PrefixAuth {
///     async fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
///         token
///             .strip_prefix("user:")
///             .map(UserId::new)
///             .ok_or_else(|| AuthError("missing user: prefix".into()))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Called once per connection, during the handshake.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<UserId, AuthError>> + Send;
}

/// Uses the token itself as the user id. Development only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenAuth;

impl Authenticator for TokenAuth {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError("empty token".into()));
        }
        Ok(UserId::new(token))
    }
}
