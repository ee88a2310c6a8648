//! Mock transport and clock for testing without a real broker.
//!
//! `MockConnector` hands out a fresh `MockChannel` per `open` and keeps the
//! event sink of each, so tests can play the transport's side of the
//! conversation. Channels record every request for assertion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cp_protocol::{Credential, QoS};

use crate::channel::{Channel, Connector, EventSink, TransportEvent};
use crate::clock::WallClock;
use crate::error::{SessionError, SessionResult};

/// A recorded publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Payloads whose next publish attempt fails, shared between a connector and its channels.
type FailurePlan = Arc<Mutex<Vec<Vec<u8>>>>;

/// Payloads whose next publish attempt stalls before completing.
type DelayPlan = Arc<Mutex<Vec<(Vec<u8>, Duration)>>>;

/// Mock implementation of the `Channel` trait.
///
/// Thread-safe via `Mutex` (fine for test contexts).
pub struct MockChannel {
    subscribe_requests: Mutex<Vec<Vec<(String, QoS)>>>,
    unsubscribe_requests: Mutex<Vec<Vec<String>>>,
    attempts: Mutex<Vec<PublishedMessage>>,
    published: Mutex<Vec<PublishedMessage>>,
    failures: FailurePlan,
    delays: DelayPlan,
    fail_subscribe: AtomicBool,
    closed: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::with_plans(Arc::default(), Arc::default())
    }

    fn with_plans(failures: FailurePlan, delays: DelayPlan) -> Self {
        Self {
            subscribe_requests: Mutex::new(Vec::new()),
            unsubscribe_requests: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            failures,
            delays,
            fail_subscribe: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Make the next publish carrying exactly `payload` fail.
    pub fn fail_publish_once(&self, payload: &[u8]) {
        self.failures.lock().unwrap().push(payload.to_vec());
    }

    /// Make the next publish carrying exactly `payload` wait `delay` before completing.
    pub fn delay_publish_once(&self, payload: &[u8], delay: Duration) {
        self.delays.lock().unwrap().push((payload.to_vec(), delay));
    }

    /// Make every subscribe request fail until turned off.
    pub fn fail_subscribes(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Every subscribe request, one batch per call.
    pub fn subscribe_requests(&self) -> Vec<Vec<(String, QoS)>> {
        self.subscribe_requests.lock().unwrap().clone()
    }

    /// Every unsubscribe request, one batch per call.
    pub fn unsubscribe_requests(&self) -> Vec<Vec<String>> {
        self.unsubscribe_requests.lock().unwrap().clone()
    }

    /// Number of subscribe requests that included `topic`.
    pub fn subscribe_count_for(&self, topic: &str) -> usize {
        self.subscribe_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|batch| batch.iter().any(|(t, _)| t == topic))
            .count()
    }

    /// Check whether a subscription was requested for the given filter.
    pub fn is_subscribed_to(&self, topic: &str) -> bool {
        self.subscribe_count_for(topic) > 0
    }

    /// Every publish attempt, failed or not, in call order.
    pub fn publish_attempts(&self) -> Vec<PublishedMessage> {
        self.attempts.lock().unwrap().clone()
    }

    /// Successful publishes only.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Payloads of successful publishes, in order.
    pub fn delivered_payloads(&self) -> Vec<Vec<u8>> {
        self.published().into_iter().map(|m| m.payload).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Clear all recorded state.
    pub fn reset(&self) {
        self.subscribe_requests.lock().unwrap().clear();
        self.unsubscribe_requests.lock().unwrap().clear();
        self.attempts.lock().unwrap().clear();
        self.published.lock().unwrap().clear();
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn subscribe(&self, subscriptions: &[(String, QoS)]) -> SessionResult<()> {
        self.subscribe_requests
            .lock()
            .unwrap()
            .push(subscriptions.to_vec());
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SessionError::Subscribe("mock subscribe failure".into()));
        }
        Ok(())
    }

    async fn unsubscribe(&self, topics: &[String]) -> SessionResult<()> {
        self.unsubscribe_requests
            .lock()
            .unwrap()
            .push(topics.to_vec());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> SessionResult<()> {
        let message = PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        };
        self.attempts.lock().unwrap().push(message.clone());

        let delay = {
            let mut delays = self.delays.lock().unwrap();
            delays
                .iter()
                .position(|(p, _)| p.as_slice() == payload)
                .map(|pos| delays.remove(pos).1)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut failures = self.failures.lock().unwrap();
        if let Some(pos) = failures.iter().position(|p| p.as_slice() == payload) {
            failures.remove(pos);
            return Err(SessionError::Publish(format!("mock failure on {topic}")));
        }
        drop(failures);

        self.published.lock().unwrap().push(message);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// One `open` call seen by the mock connector.
struct Opened {
    credential: Credential,
    sink: EventSink,
    channel: Arc<MockChannel>,
}

/// Mock implementation of the `Connector` trait.
pub struct MockConnector {
    opened: Mutex<Vec<Opened>>,
    failures: FailurePlan,
    delays: DelayPlan,
    refuse: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            opened: Mutex::new(Vec::new()),
            failures: Arc::default(),
            delays: Arc::default(),
            refuse: AtomicBool::new(false),
        }
    }

    /// Make subsequent `open` calls fail.
    pub fn refuse_open(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make the next publish carrying exactly `payload` fail, on whichever channel sends it.
    pub fn fail_publish_once(&self, payload: &[u8]) {
        self.failures.lock().unwrap().push(payload.to_vec());
    }

    /// Make the next publish carrying exactly `payload` stall for `delay`, on whichever channel sends it.
    pub fn delay_publish_once(&self, payload: &[u8], delay: Duration) {
        self.delays.lock().unwrap().push((payload.to_vec(), delay));
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    /// Channel opened by the `index`-th `open` call.
    pub fn channel(&self, index: usize) -> Option<Arc<MockChannel>> {
        self.opened
            .lock()
            .unwrap()
            .get(index)
            .map(|o| Arc::clone(&o.channel))
    }

    pub fn last_channel(&self) -> Option<Arc<MockChannel>> {
        self.opened
            .lock()
            .unwrap()
            .last()
            .map(|o| Arc::clone(&o.channel))
    }

    /// Credential passed to the `index`-th `open` call.
    pub fn credential(&self, index: usize) -> Option<Credential> {
        self.opened
            .lock()
            .unwrap()
            .get(index)
            .map(|o| o.credential.clone())
    }

    /// Emit a transport event from the most recently opened channel.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.opened.lock().unwrap().last() {
            Some(o) => o.sink.emit(event),
            None => false,
        }
    }

    /// Emit a transport event from the `index`-th opened channel, stale or not.
    pub fn emit_on(&self, index: usize, event: TransportEvent) -> bool {
        match self.opened.lock().unwrap().get(index) {
            Some(o) => o.sink.emit(event),
            None => false,
        }
    }

    /// Subscribe requests including `topic`, summed over every opened channel.
    pub fn subscribe_count_for(&self, topic: &str) -> usize {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.channel.subscribe_count_for(topic))
            .sum()
    }

    /// Publish attempts over every opened channel, in open order.
    pub fn publish_attempts(&self) -> Vec<PublishedMessage> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .flat_map(|o| o.channel.publish_attempts())
            .collect()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MockConnector {
    fn open(&self, credential: &Credential, events: EventSink) -> SessionResult<Arc<dyn Channel>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SessionError::Transport("mock connector refused".into()));
        }
        let channel = Arc::new(MockChannel::with_plans(
            Arc::clone(&self.failures),
            Arc::clone(&self.delays),
        ));
        self.opened.lock().unwrap().push(Opened {
            credential: credential.clone(),
            sink: events,
            channel: Arc::clone(&channel),
        });
        Ok(channel)
    }
}

/// Hand-driven wall clock.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
