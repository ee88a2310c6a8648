use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lifetime assumed, in minutes, for a credential whose `expiration` is missing or unreadable.
pub const DEFAULT_CREDENTIAL_LIFETIME_MINS: i64 = 59;

/// Temporary broker credentials issued by the cloud-side credential service.
///
/// Immutable once issued. A session holds one for the lifetime of a single
/// connection and replaces it wholesale on reconnect.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Broker host name (AWS IoT Core data endpoint). Empty means "not configured".
    #[serde(rename = "iotEndpoint", alias = "brokerEndpoint", default)]
    pub broker_endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub session_token: String,
    /// When the credential stops being accepted by the broker.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration: Option<DateTime<Utc>>,
}

impl Credential {
    /// Whether a broker endpoint was supplied at all.
    pub fn has_endpoint(&self) -> bool {
        !self.broker_endpoint.trim().is_empty()
    }

    /// Expiration instant, falling back to [`DEFAULT_CREDENTIAL_LIFETIME_MINS`] from `now`
    /// when the issuer did not provide a usable timestamp.
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.expiration
            .unwrap_or_else(|| now + Duration::minutes(DEFAULT_CREDENTIAL_LIFETIME_MINS))
    }

    /// Time remaining until expiration, measured from `now`. Negative once expired.
    pub fn expires_in(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at(now) - now
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("broker_endpoint", &self.broker_endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }))
}
