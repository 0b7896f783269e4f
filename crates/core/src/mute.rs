//! Alert-triggered mute window.
//!
//! The vehicle's own alert chime must not be measured as cabin noise, so sample
//! intake is suppressed for a fixed cooldown after an alert was observed. The
//! gate is written from the publish loop and read from the capture callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const NEVER: u64 = u64::MAX;

pub struct MuteGate {
    /// Nanoseconds on the shared clock, `NEVER` until the first alert.
    last_alert_nanos: AtomicU64,
    mute_duration: Duration,
}

impl MuteGate {
    pub fn new(mute_duration: Duration) -> Self {
        Self {
            last_alert_nanos: AtomicU64::new(NEVER),
            mute_duration,
        }
    }

    pub fn record_alert(&self, now: Duration) {
        let nanos = (now.as_nanos() as u64).min(NEVER - 1);
        self.last_alert_nanos.store(nanos, Ordering::Release);
    }

    /// True while `now` falls inside `[last_alert, last_alert + mute_duration)`.
    ///
    /// A timestamp older than the recorded alert (the reader sampled the clock
    /// just before the writer did) counts as muted.
    pub fn is_muted(&self, now: Duration) -> bool {
        let last = self.last_alert_nanos.load(Ordering::Acquire);
        if last == NEVER {
            return false;
        }
        let elapsed = now.saturating_sub(Duration::from_nanos(last));
        elapsed < self.mute_duration
    }
}
