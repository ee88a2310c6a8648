//! MQTT transport for Cargoplane sessions.
//!
//! Implements the `cp_session::Connector`/`Channel` seam on top of `rumqttc`:
//! - `MqttConnector` opens one `MqttChannel` per session `connect`
//! - `sigv4` presigns the AWS IoT Core WebSocket URL from temporary credentials
//! - `handler` drives the rumqttc event loop and reports transport events

pub mod channel;
pub mod config;
pub mod error;
pub mod handler;
pub mod sigv4;

// Re-exports for convenience.
pub use channel::{MqttChannel, MqttConnector, broker_options};
pub use config::MqttConfig;
pub use error::{MqttError, MqttResult};
pub use handler::{classify, classify_error};
