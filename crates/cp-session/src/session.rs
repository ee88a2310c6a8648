//! The session controller.
//!
//! One `Session` is created by the application and shared (it is a cheap
//! `Clone` handle). All mutable state sits behind a single lock so that
//! transport callbacks, the expiry clock, and API calls can interleave
//! freely. Transport events carry the epoch of the `connect` call that
//! opened their connection; events from a superseded connection are dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, mpsc};

use cp_protocol::{Credential, QoS, payload};

use crate::channel::{Channel, Connector, EventSink, TransportEvent};
use crate::clock::{ExpiryClock, SystemClock, WallClock};
use crate::config::SessionConfig;
use crate::error::SessionResult;
use crate::event::{LifecycleEvent, LifecycleStream};
use crate::queue::{self, PublishQueue};
use crate::registry::{MessageStream, SubscriptionRegistry};

/// Where the session's connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or the last `connect` was rejected before opening a transport.
    Idle,
    Connecting,
    Connected,
    /// Lost or failed; the transport keeps retrying.
    Disconnected,
    /// Explicitly disconnected. A later `connect` starts over.
    Closed,
}

/// Handle to the application's single broker session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    wall_clock: Arc<dyn WallClock>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: ConnectionState,
    epoch: u64,
    channel: Option<Arc<dyn Channel>>,
    lifecycle: Option<broadcast::Sender<LifecycleEvent>>,
    clock: ExpiryClock,
    registry: SubscriptionRegistry,
    queue: PublishQueue,
    /// Epoch of the connection a flush is currently delivering on.
    flushing: Option<u64>,
}

impl Session {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_config(connector, SessionConfig::default())
    }

    pub fn with_config(connector: Arc<dyn Connector>, config: SessionConfig) -> Self {
        Self::with_wall_clock(connector, config, Arc::new(SystemClock))
    }

    /// Build a session reading wall-clock time from `wall_clock`.
    pub fn with_wall_clock(
        connector: Arc<dyn Connector>,
        config: SessionConfig,
        wall_clock: Arc<dyn WallClock>,
    ) -> Self {
        let inner = Inner {
            state: ConnectionState::Idle,
            epoch: 0,
            channel: None,
            lifecycle: None,
            clock: ExpiryClock::new(config.clock_cadence(), Arc::clone(&wall_clock)),
            registry: SubscriptionRegistry::new(config.stream_capacity),
            queue: PublishQueue::new(),
            flushing: None,
        };
        Self {
            shared: Arc::new(Shared {
                connector,
                config,
                wall_clock,
                inner: Mutex::new(inner),
            }),
        }
    }

    /// Connect with `credential`, raising `expiring` the configured lead time before it expires.
    pub fn connect(&self, credential: Credential) -> LifecycleStream {
        let lead = self.shared.config.expiry_lead();
        self.connect_with_lead_time(credential, lead)
    }

    /// Replace any current connection with a new one using `credential`.
    ///
    /// Observed topics and queued publishes carry over to the new connection.
    /// The returned stream ends when this connection is torn down. A credential
    /// without a broker endpoint, or a transport that refuses to open, yields a
    /// stream carrying a single `error` event.
    ///
    /// Must be called within a Tokio runtime.
    pub fn connect_with_lead_time(&self, credential: Credential, lead: Duration) -> LifecycleStream {
        let shared = &self.shared;
        let mut inner = shared.lock();

        inner.epoch += 1;
        let epoch = inner.epoch;
        inner.teardown();
        inner.state = ConnectionState::Idle;

        if !credential.has_endpoint() {
            tracing::error!(epoch, "no broker endpoint in credential, session disabled");
            return LifecycleStream::terminated([LifecycleEvent::error(
                "credential has no broker endpoint",
            )]);
        }

        tracing::info!(epoch, endpoint = %credential.broker_endpoint, "connecting to broker");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let channel = match shared
            .connector
            .open(&credential, EventSink::new(epoch, events_tx))
        {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(epoch, error = %e, "failed to open transport");
                return LifecycleStream::terminated([LifecycleEvent::error(e.to_string())]);
            }
        };

        debug_assert!(inner.channel.is_none(), "one live transport per session");
        inner.channel = Some(channel);
        inner.state = ConnectionState::Connecting;
        tokio::spawn(pump(Arc::downgrade(shared), events_rx));

        let (tx, rx) = broadcast::channel(shared.config.event_capacity.max(1));

        let now = shared.wall_clock.now();
        let expires_at = credential.expires_at(now);
        // A lead reaching past the representable range means "already expiring".
        let expiring_at = chrono::Duration::from_std(lead)
            .ok()
            .and_then(|lead| expires_at.checked_sub_signed(lead))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        tracing::debug!(
            epoch,
            expires_in_mins = (expires_at - now).num_minutes(),
            "credential expiry"
        );
        inner.clock.arm(expiring_at, tx.clone());
        inner.lifecycle = Some(tx);

        LifecycleStream::new(rx)
    }

    /// Close the connection and forget every observed topic and queued publish.
    ///
    /// Every outstanding message stream and the lifecycle stream complete.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        inner.registry.clear();
        inner.queue.clear();
        inner.teardown();
        inner.state = ConnectionState::Closed;
        tracing::info!(epoch = inner.epoch, "session closed");
    }

    /// Stream of messages on `topic`, subscribing on first use.
    ///
    /// Observing an already observed topic returns another receiver on the
    /// same stream and sends nothing to the broker.
    pub fn observe<T: DeserializeOwned>(&self, topic: &str, qos: QoS) -> MessageStream<T> {
        let mut inner = self.shared.lock();
        let (stream, created) = inner.registry.observe(topic, qos);

        if created && inner.state == ConnectionState::Connected {
            if let Some(channel) = inner.channel.clone() {
                tracing::debug!(topic, %qos, "subscribing");
                let subscriptions = vec![(topic.to_string(), qos)];
                let epoch = inner.epoch;
                tokio::spawn(async move {
                    if let Err(e) = channel.subscribe(&subscriptions).await {
                        tracing::error!(epoch, error = %e, "subscribe failed");
                    }
                });
            }
        }
        stream
    }

    /// Stop observing `topic`, completing its stream. No-op when not observed.
    pub fn unobserve(&self, topic: &str) {
        let mut inner = self.shared.lock();
        if !inner.registry.unobserve(topic) {
            return;
        }

        if inner.state == ConnectionState::Connected {
            if let Some(channel) = inner.channel.clone() {
                tracing::debug!(topic, "unsubscribing");
                let topics = vec![topic.to_string()];
                let epoch = inner.epoch;
                tokio::spawn(async move {
                    if let Err(e) = channel.unsubscribe(&topics).await {
                        tracing::error!(epoch, error = %e, "unsubscribe failed");
                    }
                });
            }
        }
    }

    /// Queue `payload` (JSON-encoded; `None` sends an empty body) for `topic`.
    ///
    /// Returns immediately. While online the queue is flushed right away;
    /// otherwise the message waits for the next successful connection. The
    /// only error is a payload that cannot be serialized.
    pub fn publish<P: Serialize + ?Sized>(
        &self,
        topic: &str,
        payload: Option<&P>,
        qos: QoS,
    ) -> SessionResult<()> {
        let bytes = payload::encode(payload)?;

        let mut inner = self.shared.lock();
        let sequence = inner.queue.enqueue(topic, bytes, qos);
        tracing::debug!(topic, sequence, "publish queued");

        if inner.state == ConnectionState::Connected {
            self.shared.flush(&mut inner);
        }
        Ok(())
    }

    /// True only while the transport reports an established connection.
    pub fn is_online(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Number of `connect` calls so far.
    pub fn epoch(&self) -> u64 {
        self.shared.lock().epoch
    }

    /// Publishes waiting for delivery.
    pub fn queued_len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn observed_topics(&self) -> Vec<String> {
        self.shared.lock().registry.topics()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_transport_event(self: &Arc<Self>, epoch: u64, event: TransportEvent) {
        let mut inner = self.lock();
        if epoch != inner.epoch || inner.state == ConnectionState::Closed {
            tracing::debug!(epoch, current = inner.epoch, "discarding stale transport event");
            return;
        }

        match event {
            TransportEvent::Connecting => {
                tracing::debug!(epoch, "attempting to connect");
                inner.state = ConnectionState::Connecting;
            }
            TransportEvent::ConnectSuccess => {
                tracing::info!(epoch, "connected");
                inner.state = ConnectionState::Connected;
                inner.emit(LifecycleEvent::Connected);
                inner.resubscribe_all();
                self.flush(&mut inner);
            }
            TransportEvent::ConnectFailure(reason) => {
                tracing::debug!(epoch, reason = %reason, "connection attempt failed");
                inner.state = ConnectionState::Disconnected;
            }
            TransportEvent::Disconnected(reason) => {
                tracing::info!(epoch, reason = %reason, "disconnected");
                inner.state = ConnectionState::Disconnected;
                inner.emit(LifecycleEvent::Disconnected);
            }
            TransportEvent::MessageReceived { topic, payload } => match payload::decode(payload) {
                Ok(value) => {
                    tracing::debug!(topic = %topic, "message received");
                    inner.registry.dispatch(&topic, value);
                }
                Err(e) => {
                    tracing::warn!(topic = %topic, error = %e, "dropping undecodable message");
                }
            },
            TransportEvent::Error(reason) => {
                tracing::error!(epoch, reason = %reason, "transport error");
                inner.emit(LifecycleEvent::error(reason));
            }
        }
    }

    /// Deliver a snapshot of the queue in the background; failures go back to the queue.
    ///
    /// At most one flush runs per connection. Messages queued while it runs
    /// are delivered by a follow-up flush once it completes, so delivery
    /// keeps enqueue order.
    fn flush(self: &Arc<Self>, inner: &mut Inner) {
        if inner.flushing == Some(inner.epoch) {
            tracing::trace!(epoch = inner.epoch, "flush in progress, deferring");
            return;
        }
        let Some(channel) = inner.channel.clone() else {
            return;
        };
        let batch = inner.queue.take_snapshot();
        if batch.messages.is_empty() {
            return;
        }

        let epoch = inner.epoch;
        inner.flushing = Some(epoch);
        let generation = batch.generation;
        let shared = Arc::downgrade(self);
        tokio::spawn(async move {
            let failed = queue::deliver(channel.as_ref(), batch.messages).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut inner = shared.lock();
            if inner.flushing == Some(epoch) {
                inner.flushing = None;
            }

            // Anything still queued arrived during this flush.
            let deferred = !inner.queue.is_empty();
            for message in failed {
                if !inner.queue.requeue(generation, message) {
                    tracing::debug!("queue cleared during flush, dropping failed publish");
                }
            }

            if deferred && inner.epoch == epoch && inner.state == ConnectionState::Connected {
                shared.flush(&mut inner);
            }
        });
    }
}

impl Inner {
    fn emit(&self, event: LifecycleEvent) {
        if let Some(tx) = &self.lifecycle {
            // No observers is not an error.
            let _ = tx.send(event);
        }
    }

    /// One batched subscribe covering every observed topic.
    fn resubscribe_all(&self) {
        let Some(channel) = self.channel.clone() else {
            return;
        };
        let batch = self.registry.resubscribe_batch();
        if batch.is_empty() {
            return;
        }

        let epoch = self.epoch;
        tracing::debug!(epoch, topics = batch.len(), "resubscribing to observed topics");
        tokio::spawn(async move {
            if let Err(e) = channel.subscribe(&batch).await {
                tracing::error!(epoch, error = %e, "resubscribe failed");
            }
        });
    }

    /// Drop the current connection: clock, lifecycle stream and transport.
    fn teardown(&mut self) {
        self.clock.disarm();
        self.lifecycle = None;
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Forward one connection's transport events into the session, in order.
async fn pump(shared: Weak<Shared>, mut events: mpsc::UnboundedReceiver<(u64, TransportEvent)>) {
    while let Some((epoch, event)) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.on_transport_event(epoch, event);
    }
}
