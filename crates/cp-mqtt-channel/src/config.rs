use serde::Deserialize;

/// MQTT transport settings, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Connect over a SigV4-presigned WebSocket (AWS IoT Core). When false,
    /// connects plaintext TCP to the credential's endpoint (local brokers).
    #[serde(default = "default_use_websocket")]
    pub use_websocket: bool,
    /// Broker port (443 for WebSocket, typically 1883 for a local broker).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix of the generated MQTT client ID.
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    /// Pause between failed event loop polls before reconnecting.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// Capacity of the rumqttc request channel.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

fn default_use_websocket() -> bool {
    true
}

fn default_port() -> u16 {
    443
}

fn default_client_id_prefix() -> String {
    "cargoplane".to_string()
}

fn default_keepalive() -> u16 {
    30
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_request_capacity() -> usize {
    64
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            use_websocket: default_use_websocket(),
            port: default_port(),
            client_id_prefix: default_client_id_prefix(),
            keepalive_secs: default_keepalive(),
            reconnect_delay_secs: default_reconnect_delay(),
            request_capacity: default_request_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: MqttConfig = serde_json::from_str("{}").unwrap();
        assert!(config.use_websocket);
        assert_eq!(config.port, 443);
        assert_eq!(config.client_id_prefix, "cargoplane");
        assert_eq!(config.keepalive_secs, 30);
        assert_eq!(config.reconnect_delay_secs, 5);
    }

    #[test]
    fn local_broker_config() {
        let config: MqttConfig =
            serde_json::from_str(r#"{"use_websocket": false, "port": 1883}"#).unwrap();
        assert!(!config.use_websocket);
        assert_eq!(config.port, 1883);
        assert_eq!(config.request_capacity, 64);
    }
}
