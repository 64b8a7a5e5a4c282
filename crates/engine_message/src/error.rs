//! Message-layer error types.

use engine_component::NameHash;

/// Errors that can occur while posting, routing or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Failed to encode a payload to MessagePack.
    #[error("failed to encode message payload: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a payload from MessagePack.
    #[error("failed to decode message payload: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The receiver's socket does not exist (never created or deleted).
    #[error("socket {0} is not valid")]
    InvalidSocket(NameHash),

    /// A socket with this name already exists.
    #[error("socket '{0}' already exists")]
    SocketExists(String),

    /// The message carried a payload the receiver needs but it was empty.
    #[error("message '{0}' is missing its payload")]
    MissingPayload(&'static str),
}
