//! Client-side session manager for Cargoplane.
//!
//! Keeps one logical publish/subscribe session alive against a broker that
//! only accepts short-lived credentials:
//! - `Session` owns the transport lifecycle and exposes the public API
//! - `Connector`/`Channel` traits abstract the transport (mockable in tests)
//! - `SubscriptionRegistry` multiplexes observers onto one subscription per topic
//! - `PublishQueue` holds outbound messages across disconnects
//! - `ExpiryClock` raises `expiring` and `clock-resume` from wall-clock time
//! - `MockConnector` for testing without a broker

pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod mock;
pub mod queue;
pub mod registry;
pub mod session;

// Re-exports for convenience.
pub use channel::{Channel, Connector, EventSink, TransportEvent};
pub use clock::{ClockSignal, ClockWatch, ExpiryClock, SystemClock, WallClock};
pub use config::SessionConfig;
pub use cp_protocol::{Credential, QoS, RawPayload};
pub use error::{SessionError, SessionResult};
pub use event::{LifecycleEvent, LifecycleStream};
pub use mock::{ManualClock, MockChannel, MockConnector};
pub use queue::{PublishQueue, QueuedMessage};
pub use registry::{MessageStream, SubscriptionRegistry};
pub use session::{ConnectionState, Session};
