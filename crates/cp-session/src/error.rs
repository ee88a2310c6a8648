//! Session error types.

use thiserror::Error;

use cp_protocol::PayloadError;

/// Errors that can occur inside a session or its transport.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("unsubscribe error: {0}")]
    Unsubscribe(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Convenience alias for session results.
pub type SessionResult<T> = Result<T, SessionError>;
