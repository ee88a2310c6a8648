//! Shared test harness for E2E integration tests.
//!
//! Wires a real `Session` to a `MockConnector` and a `ManualClock`, so tests
//! play the broker's side of every connection and control wall-clock time.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use cp_protocol::Credential;
use cp_session::{
    LifecycleEvent, LifecycleStream, ManualClock, MockChannel, MockConnector, Session,
    SessionConfig, TransportEvent,
};

/// Chat room topic used throughout the tests.
pub const ROOM: &str = "chattopic/mqtt";

/// Session + mock broker + wall clock.
pub struct TestHarness {
    pub session: Session,
    /// Broker side of every connection the session opens.
    pub connector: Arc<MockConnector>,
    /// Wall clock the session's expiry checks read.
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    /// Harness with default session settings (60 s expiry lead and clock cadence).
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Harness whose expiry clock checks every 10 ms, for expiry scenarios.
    pub fn fast_clock() -> Self {
        Self::with_config(SessionConfig {
            clock_cadence_ms: 10,
            ..SessionConfig::default()
        })
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let connector = Arc::new(MockConnector::new());
        let clock = Arc::new(ManualClock::new(start()));
        let session = Session::with_wall_clock(connector.clone(), config, clock.clone());
        Self {
            session,
            connector,
            clock,
        }
    }

    /// A credential for `access_key` expiring one hour after the harness start.
    pub fn credential(&self, access_key: &str) -> Credential {
        Credential {
            broker_endpoint: "a1b2c3-ats.iot.eu-west-1.amazonaws.com".into(),
            region: "eu-west-1".into(),
            access_key: access_key.into(),
            secret_key: "secret".into(),
            session_token: "token".into(),
            expiration: Some(start() + chrono::Duration::hours(1)),
        }
    }

    /// Connect with a fresh credential and have the broker accept it.
    pub async fn connect_online(&self, access_key: &str) -> LifecycleStream {
        let mut events = self.session.connect(self.credential(access_key));
        self.connector.emit(TransportEvent::Connecting);
        self.connector.emit(TransportEvent::ConnectSuccess);
        assert_eq!(next_event(&mut events).await, Some(LifecycleEvent::Connected));
        settle().await;
        events
    }

    /// Broker accepts the current connection.
    pub async fn go_online(&self) {
        self.connector.emit(TransportEvent::ConnectSuccess);
        settle().await;
    }

    /// Current connection drops.
    pub async fn go_offline(&self) {
        self.connector
            .emit(TransportEvent::Disconnected("network lost".into()));
        settle().await;
    }

    /// Channel of the current connection.
    pub fn channel(&self) -> Arc<MockChannel> {
        self.connector.last_channel().expect("no connection opened")
    }
}

/// Fixed wall-clock start for every harness.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
}

/// Let spawned session tasks (event pump, subscribes, flushes) run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Next lifecycle event, or `None` if the stream completed. Panics after 2 s.
pub async fn next_event(events: &mut LifecycleStream) -> Option<LifecycleEvent> {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for lifecycle event")
}

/// Skip events until `wanted` arrives. Panics if the stream completes or 2 s pass.
pub async fn wait_for(events: &mut LifecycleStream, wanted: LifecycleEvent) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Some(event) if event == wanted => return,
                Some(_) => continue,
                None => panic!("stream completed before {wanted}"),
            }
        }
    })
    .await
    .expect("timed out waiting for lifecycle event")
}
