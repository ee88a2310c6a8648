//! Chat demo configuration, loadable from TOML.

use anyhow::bail;
use serde::Deserialize;

use cp_mqtt_channel::MqttConfig;
use cp_session::SessionConfig;

use crate::credentials::CredentialSource;

/// Top-level configuration for the chat demo.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// HTTP endpoint returning a credential document.
    #[serde(default)]
    pub credentials_url: Option<String>,
    /// Local credential document, used when no URL is configured.
    #[serde(default)]
    pub credentials_file: Option<String>,
    /// Timeout for the credential request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Topic the room lives on.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Name attached to outgoing messages.
    #[serde(default = "default_nickname")]
    pub nickname: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
}

fn default_request_timeout() -> u64 {
    10
}

fn default_topic() -> String {
    "chattopic/mqtt".to_string()
}

fn default_nickname() -> String {
    "anonymous".to_string()
}

impl ChatConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Where credentials come from. The URL wins when both are set.
    pub fn credential_source(&self) -> anyhow::Result<CredentialSource> {
        match (&self.credentials_url, &self.credentials_file) {
            (Some(url), _) => CredentialSource::http(url, self.request_timeout_secs),
            (None, Some(path)) => Ok(CredentialSource::file(path)),
            (None, None) => bail!("either credentials_url or credentials_file must be set"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_config() {
        let toml = r#"
credentials_url = "https://api.example.com/credentials"
"#;
        let config: ChatConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.topic, "chattopic/mqtt");
        assert_eq!(config.nickname, "anonymous");
        assert!(!config.json_logs);
        assert_eq!(config.session.expiry_lead_ms, 60_000);
        assert_eq!(config.mqtt.port, 443);
        assert!(matches!(
            config.credential_source().unwrap(),
            CredentialSource::Http { .. }
        ));
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
credentials_file = "/tmp/creds.json"
topic = "rooms/lobby"
nickname = "ada"
json_logs = true

[session]
expiry_lead_ms = 120000
clock_cadence_ms = 30000

[mqtt]
use_websocket = false
port = 1883
"#;
        let config: ChatConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.topic, "rooms/lobby");
        assert_eq!(config.nickname, "ada");
        assert!(config.json_logs);
        assert_eq!(config.session.expiry_lead_ms, 120_000);
        assert_eq!(config.session.clock_cadence_ms, 30_000);
        assert!(!config.mqtt.use_websocket);
        assert_eq!(config.mqtt.port, 1883);
        assert!(matches!(
            config.credential_source().unwrap(),
            CredentialSource::File(ref path) if path.to_str() == Some("/tmp/creds.json")
        ));
    }

    #[test]
    fn missing_credential_source_is_rejected() {
        let config: ChatConfig = toml::from_str("").unwrap();
        assert!(config.credential_source().is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ChatConfig::from_file("/nonexistent/cargoplane-chat.toml").is_err());
    }
}
