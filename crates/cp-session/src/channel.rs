//! Transport seam: how a session talks to the broker.
//!
//! A [`Connector`] opens one [`Channel`] per connection attempt. The channel
//! carries outbound operations; inbound traffic and connection lifecycle come
//! back as [`TransportEvent`]s through the [`EventSink`] handed to `open`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use cp_protocol::{Credential, QoS, RawPayload};

use crate::error::SessionResult;

/// Outbound operations on one open transport connection.
///
/// Every operation is asynchronous; a returned error means the operation
/// failed for this connection and the caller decides whether to retry.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Subscribe to a batch of topic filters in a single request.
    async fn subscribe(&self, subscriptions: &[(String, QoS)]) -> SessionResult<()>;

    /// Unsubscribe from a batch of topic filters.
    async fn unsubscribe(&self, topics: &[String]) -> SessionResult<()>;

    /// Publish a raw payload to a topic.
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> SessionResult<()>;

    /// Stop the connection and release its resources. Idempotent.
    fn close(&self);
}

/// Opens transport connections.
///
/// `open` must return without emitting on `events` synchronously; the
/// connection is expected to report its progress from its own task.
pub trait Connector: Send + Sync {
    fn open(&self, credential: &Credential, events: EventSink) -> SessionResult<Arc<dyn Channel>>;
}

/// Lifecycle and traffic reported by a transport connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection attempt is starting.
    Connecting,
    /// The broker accepted the connection.
    ConnectSuccess,
    /// A connection attempt failed; the transport will retry by itself.
    ConnectFailure(String),
    /// An established connection was lost.
    Disconnected(String),
    /// An inbound publish.
    MessageReceived { topic: String, payload: RawPayload },
    /// A transport-level error not tied to a connection attempt.
    Error(String),
}

/// Sender half handed to a transport connection, tagged with the epoch of the
/// `connect` call that opened it.
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl EventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Report an event. Returns `false` once the session stopped listening.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.epoch, event)).is_ok()
    }
}
