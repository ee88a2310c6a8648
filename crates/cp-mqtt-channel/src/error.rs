//! MQTT transport error types.

use thiserror::Error;

use cp_session::SessionError;

/// Errors that can occur during MQTT operations.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("publish error: {0}")]
    Publish(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("unsubscribe error: {0}")]
    Unsubscribe(String),

    #[error("signing error: {0}")]
    Signing(String),
}

/// Convenience alias for MQTT results.
pub type MqttResult<T> = Result<T, MqttError>;

impl From<MqttError> for SessionError {
    fn from(err: MqttError) -> Self {
        match err {
            MqttError::Publish(e) => SessionError::Publish(e),
            MqttError::Subscribe(e) => SessionError::Subscribe(e),
            MqttError::Unsubscribe(e) => SessionError::Unsubscribe(e),
            MqttError::Signing(e) => SessionError::Configuration(e),
        }
    }
}
