//! Error types for the protocol layer.
//!
//! Each crate in Arena defines its own error enum, so a `ProtocolError`
//! always means a framing problem and never a fight rule violation.

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing field, or an
    /// unknown command tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded but breaks a protocol rule, e.g. a command sent
    /// before the `hello` handshake.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
