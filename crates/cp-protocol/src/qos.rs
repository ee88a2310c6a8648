use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

/// Message delivery quality of service.
///
/// Discriminants match the MQTT wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget: delivered once or not at all.
    AtMostOnce = 0,
    /// Acknowledged delivery: the message arrives at least once.
    #[default]
    AtLeastOnce = 1,
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}

impl TryFrom<u8> for QoS {
    type Error = PayloadError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            other => Err(PayloadError::UnsupportedQoS(other)),
        }
    }
}

impl std::fmt::Display for QoS {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AtMostOnce => write!(f, "at-most-once"),
            Self::AtLeastOnce => write!(f, "at-least-once"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_encoding() {
        assert_eq!(u8::from(QoS::AtMostOnce), 0);
        assert_eq!(u8::from(QoS::AtLeastOnce), 1);
        assert_eq!(QoS::try_from(1).unwrap(), QoS::AtLeastOnce);
        assert!(QoS::try_from(2).is_err());
    }

    #[test]
    fn default_is_at_least_once() {
        assert_eq!(QoS::default(), QoS::AtLeastOnce);
        assert!(QoS::AtLeastOnce > QoS::AtMostOnce);
    }

    #[test]
    fn serializes_as_number() {
        assert_eq!(serde_json::to_string(&QoS::AtMostOnce).unwrap(), "0");
        let qos: QoS = serde_json::from_str("1").unwrap();
        assert_eq!(qos, QoS::AtLeastOnce);
        assert!(serde_json::from_str::<QoS>("2").is_err());
    }
}
