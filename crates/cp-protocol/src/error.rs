//! Payload and protocol error types.

use thiserror::Error;

/// Errors raised while converting message bodies to and from the wire.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(String),

    #[error("malformed JSON payload: {0}")]
    Json(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported QoS level: {0}")]
    UnsupportedQoS(u8),
}

/// Convenience alias for payload results.
pub type PayloadResult<T> = Result<T, PayloadError>;
