//! Session lifecycle events delivered on the stream returned by `connect`.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Something the application may want to react to about its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LifecycleEvent {
    /// The transport (re)connected; subscriptions and queued publishes are being re-applied.
    Connected,
    /// The transport lost its connection and is retrying on its own.
    Disconnected,
    /// The credential is about to expire; fetch a new one and call `connect` again.
    Expiring,
    /// Wall-clock time jumped, so the host was probably suspended.
    ClockResume,
    /// Configuration or transport failure.
    Error { reason: String },
}

impl LifecycleEvent {
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Event name as used on the wire and in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Expiring => "expiring",
            Self::ClockResume => "clock-resume",
            Self::Error { .. } => "error",
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Receiving end of one connection's lifecycle events.
///
/// Ends (`recv` returns `None`) once the connection that produced it is torn
/// down, either by a later `connect` or by `disconnect`.
pub struct LifecycleStream {
    rx: broadcast::Receiver<LifecycleEvent>,
}

impl LifecycleStream {
    pub(crate) fn new(rx: broadcast::Receiver<LifecycleEvent>) -> Self {
        Self { rx }
    }

    /// A stream that yields `events` and then ends.
    pub(crate) fn terminated(events: impl IntoIterator<Item = LifecycleEvent>) -> Self {
        let events: Vec<_> = events.into_iter().collect();
        let (tx, rx) = broadcast::channel(events.len().max(1));
        for event in events {
            let _ = tx.send(event);
        }
        Self::new(rx)
    }

    /// Wait for the next event. `None` means the stream has completed.
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "lifecycle observer lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// An independent observer of the same connection, starting from now.
    pub fn resubscribe(&self) -> Self {
        Self::new(self.rx.resubscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names() {
        assert_eq!(LifecycleEvent::Connected.name(), "connected");
        assert_eq!(LifecycleEvent::ClockResume.to_string(), "clock-resume");
        assert_eq!(LifecycleEvent::error("boom").name(), "error");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_value(LifecycleEvent::ClockResume).unwrap();
        assert_eq!(json["type"], "clock-resume");

        let json = serde_json::to_value(LifecycleEvent::error("no endpoint")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["reason"], "no endpoint");
    }

    #[tokio::test]
    async fn terminated_stream_yields_then_ends() {
        let mut stream = LifecycleStream::terminated([LifecycleEvent::error("missing endpoint")]);
        assert_eq!(
            stream.recv().await,
            Some(LifecycleEvent::error("missing endpoint"))
        );
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn stream_ends_when_sender_dropped() {
        let (tx, rx) = broadcast::channel(4);
        let mut stream = LifecycleStream::new(rx);
        tx.send(LifecycleEvent::Connected).unwrap();
        drop(tx);
        assert_eq!(stream.recv().await, Some(LifecycleEvent::Connected));
        assert_eq!(stream.recv().await, None);
    }
}
