//! Chat room message shape and session event handling.

use chrono::Local;
use serde::{Deserialize, Serialize};

use cp_session::LifecycleEvent;

/// One line posted to the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    #[serde(default)]
    pub from: String,
}

impl ChatMessage {
    /// Build a message from a line typed by the user. Blank lines yield `None`.
    pub fn from_input(line: &str, nickname: &str) -> Option<Self> {
        let text = line.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            from: nickname.to_string(),
        })
    }

    /// Terminal rendering, prefixed with the local receive time.
    pub fn render(&self) -> String {
        let from = if self.from.is_empty() { "?" } else { &self.from };
        format!("[{}] <{}> {}", Local::now().format("%H:%M:%S"), from, self.text)
    }
}

/// Whether `event` means the current credential must be replaced.
///
/// After a clock gap the connection may have silently died with credentials
/// that expired in the meantime, so a resume is treated like expiry.
pub fn needs_renewal(event: &LifecycleEvent) -> bool {
    matches!(event, LifecycleEvent::Expiring | LifecycleEvent::ClockResume)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_is_trimmed_and_tagged() {
        let message = ChatMessage::from_input("  hello room \n", "ada").unwrap();
        assert_eq!(message.text, "hello room");
        assert_eq!(message.from, "ada");
    }

    #[test]
    fn blank_input_is_ignored() {
        assert_eq!(ChatMessage::from_input("   ", "ada"), None);
    }

    #[test]
    fn wire_shape() {
        let message = ChatMessage {
            text: "hi".into(),
            from: "ada".into(),
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({"text": "hi", "from": "ada"})
        );

        let anonymous: ChatMessage = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert!(anonymous.render().ends_with("<?> hi"));
    }

    #[test]
    fn renewal_events() {
        assert!(needs_renewal(&LifecycleEvent::Expiring));
        assert!(needs_renewal(&LifecycleEvent::ClockResume));
        assert!(!needs_renewal(&LifecycleEvent::Connected));
        assert!(!needs_renewal(&LifecycleEvent::Disconnected));
        assert!(!needs_renewal(&LifecycleEvent::error("boom")));
    }
}
