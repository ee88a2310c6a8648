//! Topic subscriptions and their message streams.
//!
//! Every topic maps to one broadcast channel. Observing a topic again hands
//! out another receiver on the same channel instead of a second broker
//! subscription; removing the entry drops the sender, which completes every
//! receiver.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use cp_protocol::QoS;

/// Typed view of one topic's messages.
///
/// `recv` returns `None` once the topic is unobserved or the session is
/// disconnected. Payloads that do not deserialize into `T` are skipped.
pub struct MessageStream<T> {
    topic: String,
    stream_id: u64,
    rx: broadcast::Receiver<Value>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MessageStream<T> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Identity of the underlying topic stream. Equal ids mean the same subscription.
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// An independent receiver on the same topic stream, starting from now.
    pub fn resubscribe(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            stream_id: self.stream_id,
            rx: self.rx.resubscribe(),
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> MessageStream<T> {
    /// Wait for the next message. `None` means the stream has completed.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(value) => {
                    if let Some(message) = self.convert(value) {
                        return Some(message);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "topic observer lagged, messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next message if one is already buffered.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(value) => {
                    if let Some(message) = self.convert(value) {
                        return Some(message);
                    }
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    fn convert(&self, value: Value) -> Option<T> {
        match serde_json::from_value(value) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(topic = %self.topic, error = %e, "skipping message of unexpected shape");
                None
            }
        }
    }
}

struct Entry {
    qos: QoS,
    stream_id: u64,
    tx: broadcast::Sender<Value>,
}

/// Topic → stream map with one entry per topic.
pub struct SubscriptionRegistry {
    entries: BTreeMap<String, Entry>,
    next_stream_id: u64,
    capacity: usize,
}

impl SubscriptionRegistry {
    /// `capacity` is the per-topic buffer before slow observers start lagging.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            next_stream_id: 1,
            capacity: capacity.max(1),
        }
    }

    /// Stream for `topic`, registering it on first use.
    ///
    /// The flag is `true` only when this call created the entry, i.e. when the
    /// caller owes the broker a subscribe request. A later call with a
    /// different `qos` keeps the recorded one.
    pub fn observe<T>(&mut self, topic: &str, qos: QoS) -> (MessageStream<T>, bool) {
        let created = !self.entries.contains_key(topic);
        if created {
            let (tx, _) = broadcast::channel(self.capacity);
            let stream_id = self.next_stream_id;
            self.next_stream_id += 1;
            self.entries
                .insert(topic.to_string(), Entry { qos, stream_id, tx });
        }

        let entry = &self.entries[topic];
        let stream = MessageStream {
            topic: topic.to_string(),
            stream_id: entry.stream_id,
            rx: entry.tx.subscribe(),
            _marker: PhantomData,
        };
        (stream, created)
    }

    /// Remove `topic`, completing its stream. Returns whether it was registered.
    pub fn unobserve(&mut self, topic: &str) -> bool {
        self.entries.remove(topic).is_some()
    }

    /// One subscribe request's worth of filters covering every registered topic,
    /// each at least at-least-once.
    pub fn resubscribe_batch(&self) -> Vec<(String, QoS)> {
        self.entries
            .iter()
            .map(|(topic, entry)| (topic.clone(), entry.qos.max(QoS::AtLeastOnce)))
            .collect()
    }

    /// Deliver a decoded payload to the topic's observers.
    ///
    /// Returns the number of receivers reached; unregistered topics are
    /// silently ignored.
    pub fn dispatch(&self, topic: &str, payload: Value) -> usize {
        match self.entries.get(topic) {
            Some(entry) => entry.tx.send(payload).unwrap_or(0),
            None => {
                tracing::trace!(topic, "no observers for topic");
                0
            }
        }
    }

    /// Complete and remove every stream.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.entries.contains_key(topic)
    }

    pub fn topics(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
