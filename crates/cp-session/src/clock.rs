//! Wall-clock credential expiry timer.
//!
//! Checks run on a fixed cadence but compare real elapsed wall-clock time,
//! not tick counts: while the host is suspended ticks are silently skipped,
//! and a tick counter would hide exactly the gap this clock exists to detect.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::event::LifecycleEvent;

/// Source of wall-clock time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system's real-time clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Signal raised by a clock check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSignal {
    /// More than twice the cadence passed since the previous check.
    ClockResume,
    /// The expiry instant has been reached.
    Expiring,
}

impl From<ClockSignal> for LifecycleEvent {
    fn from(signal: ClockSignal) -> Self {
        match signal {
            ClockSignal::ClockResume => LifecycleEvent::ClockResume,
            ClockSignal::Expiring => LifecycleEvent::Expiring,
        }
    }
}

/// Check state for one armed credential window.
#[derive(Debug, Clone)]
pub struct ClockWatch {
    expiring_at: DateTime<Utc>,
    cadence: Duration,
    last_check: DateTime<Utc>,
}

impl ClockWatch {
    pub fn new(expiring_at: DateTime<Utc>, cadence: Duration, now: DateTime<Utc>) -> Self {
        Self {
            expiring_at,
            cadence,
            last_check: now,
        }
    }

    pub fn expiring_at(&self) -> DateTime<Utc> {
        self.expiring_at
    }

    /// Run one check at `now` and record it as the latest check.
    ///
    /// `Expiring` repeats on every check past the expiry instant.
    pub fn check(&mut self, now: DateTime<Utc>) -> Vec<ClockSignal> {
        let mut signals = Vec::new();

        // A clock that stepped backwards counts as no time elapsed.
        let elapsed = (now - self.last_check).to_std().unwrap_or(Duration::ZERO);
        if elapsed > self.cadence * 2 {
            signals.push(ClockSignal::ClockResume);
        }
        if now >= self.expiring_at {
            signals.push(ClockSignal::Expiring);
        }

        self.last_check = now;
        signals
    }
}

/// Periodic expiry check for at most one credential at a time.
pub struct ExpiryClock {
    cadence: Duration,
    wall_clock: Arc<dyn WallClock>,
    task: Option<JoinHandle<()>>,
}

impl ExpiryClock {
    pub fn new(cadence: Duration, wall_clock: Arc<dyn WallClock>) -> Self {
        Self {
            cadence: cadence.max(Duration::from_millis(1)),
            wall_clock,
            task: None,
        }
    }

    /// Start checking against `expiring_at`, emitting signals on `sink`.
    ///
    /// Any previous window is disarmed first. Must be called within a Tokio runtime.
    pub fn arm(&mut self, expiring_at: DateTime<Utc>, sink: broadcast::Sender<LifecycleEvent>) {
        self.disarm();

        let wall_clock = Arc::clone(&self.wall_clock);
        let cadence = self.cadence;
        let mut watch = ClockWatch::new(expiring_at, cadence, wall_clock.now());

        self.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval(cadence);
            // Skip the first tick (fires immediately).
            ticker.tick().await;

            loop {
                ticker.tick().await;
                for signal in watch.check(wall_clock.now()) {
                    tracing::debug!(signal = ?signal, "expiry clock signal");
                    // No observers is fine; the window stays armed until disarmed.
                    let _ = sink.send(signal.into());
                }
            }
        }));
    }

    /// Stop checking and drop the sink. Safe when not armed.
    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for ExpiryClock {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ManualClock;
    use chrono::TimeZone;

    const CADENCE: Duration = Duration::from_secs(60);

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    fn ms(n: i64) -> chrono::Duration {
        chrono::Duration::milliseconds(n)
    }

    #[test]
    fn regular_checks_before_expiry_are_silent() {
        let t0 = start();
        let mut watch = ClockWatch::new(t0 + ms(600_000), CADENCE, t0);
        for minute in 1..=9 {
            assert!(watch.check(t0 + ms(minute * 60_000)).is_empty());
        }
    }

    #[test]
    fn first_check_at_or_past_lead_time_expires() {
        // Credential expires at t0+5000, lead time 1000 => armed for t0+4000.
        let t0 = start();
        let cadence = Duration::from_millis(1000);
        let mut watch = ClockWatch::new(t0 + ms(5000) - ms(1000), cadence, t0);

        assert!(watch.check(t0 + ms(1000)).is_empty());
        assert!(watch.check(t0 + ms(2000)).is_empty());
        assert!(watch.check(t0 + ms(3000)).is_empty());
        assert_eq!(watch.check(t0 + ms(4000)), vec![ClockSignal::Expiring]);
        // Keeps firing until disarmed.
        assert_eq!(watch.check(t0 + ms(5000)), vec![ClockSignal::Expiring]);
    }

    #[test]
    fn gap_over_twice_cadence_signals_resume() {
        let t0 = start();
        let mut watch = ClockWatch::new(t0 + ms(3_600_000), CADENCE, t0);

        assert!(watch.check(t0 + ms(60_000)).is_empty());
        // Exactly two cadences is not a gap.
        assert!(watch.check(t0 + ms(180_000)).is_empty());
        assert_eq!(
            watch.check(t0 + ms(180_000 + 120_001)),
            vec![ClockSignal::ClockResume]
        );
    }

    #[test]
    fn resume_past_expiry_signals_both() {
        let t0 = start();
        let mut watch = ClockWatch::new(t0 + ms(120_000), CADENCE, t0);
        assert_eq!(
            watch.check(t0 + ms(600_000)),
            vec![ClockSignal::ClockResume, ClockSignal::Expiring]
        );
    }

    #[test]
    fn backwards_clock_is_not_a_gap() {
        let t0 = start();
        let mut watch = ClockWatch::new(t0 + ms(3_600_000), CADENCE, t0);
        assert!(watch.check(t0 - ms(600_000)).is_empty());
    }

    #[tokio::test]
    async fn armed_clock_emits_expiring() {
        let wall = Arc::new(ManualClock::new(start()));
        let mut clock = ExpiryClock::new(Duration::from_millis(10), wall.clone());
        let (tx, mut rx) = broadcast::channel(16);

        clock.arm(start() + ms(1000), tx);
        assert!(clock.is_armed());
        wall.advance(ms(1000));

        // The jump also reads as a clock gap, so skip past any `ClockResume`.
        let expired = time::timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Ok(LifecycleEvent::Expiring) => break true,
                    Ok(_) => continue,
                    Err(_) => break false,
                }
            }
        })
        .await
        .expect("expiring event");
        assert!(expired);
    }

    #[tokio::test]
    async fn disarm_detaches_sink() {
        let wall = Arc::new(ManualClock::new(start()));
        let mut clock = ExpiryClock::new(Duration::from_millis(10), wall.clone());
        let (tx, mut rx) = broadcast::channel(16);

        clock.arm(start() + ms(1000), tx);
        clock.disarm();
        clock.disarm();
        assert!(!clock.is_armed());

        // The aborted task drops the only sender, so the receiver completes.
        let closed = time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(closed.is_err());
    }
}
