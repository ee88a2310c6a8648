use std::time::Duration;

use serde::Deserialize;

/// Session tuning, loadable from TOML alongside the transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// How long before credential expiry the `expiring` event is raised.
    #[serde(default = "default_expiry_lead_ms")]
    pub expiry_lead_ms: u64,
    /// Cadence of the wall-clock expiry check.
    #[serde(default = "default_clock_cadence_ms")]
    pub clock_cadence_ms: u64,
    /// Buffered lifecycle events per connection before slow observers lag.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Buffered messages per topic stream before slow observers lag.
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

fn default_expiry_lead_ms() -> u64 {
    60_000
}

fn default_clock_cadence_ms() -> u64 {
    60_000
}

fn default_event_capacity() -> usize {
    64
}

fn default_stream_capacity() -> usize {
    256
}

impl SessionConfig {
    pub fn expiry_lead(&self) -> Duration {
        Duration::from_millis(self.expiry_lead_ms)
    }

    pub fn clock_cadence(&self) -> Duration {
        Duration::from_millis(self.clock_cadence_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_lead_ms: default_expiry_lead_ms(),
            clock_cadence_ms: default_clock_cadence_ms(),
            event_capacity: default_event_capacity(),
            stream_capacity: default_stream_capacity(),
        }
    }
}
