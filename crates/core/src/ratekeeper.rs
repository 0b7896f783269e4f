//! Fixed-rate pacing with catch-up.
//!
//! The next deadline is kept as an absolute time and advanced by one interval
//! per tick, so an overrun shortens the following sleeps instead of pushing
//! every later tick back.

use crate::clock::Clock;
use log::warn;
use std::sync::Arc;
use std::time::Duration;

pub struct RateKeeper {
    name: String,
    clock: Arc<dyn Clock>,
    interval: Duration,
    lag_warning: Duration,
    next_frame_time: Duration,
    remaining: Option<Duration>,
    frame: u64,
}

impl RateKeeper {
    pub fn new(
        name: impl Into<String>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        lag_warning: Duration,
    ) -> Self {
        let next_frame_time = clock.now() + interval;
        Self {
            name: name.into(),
            clock,
            interval,
            lag_warning,
            next_frame_time,
            remaining: None,
            frame: 0,
        }
    }

    /// Sleeps until the current tick's deadline. Returns `true` when the tick
    /// was late by more than the lag warning threshold.
    pub fn keep_time(&mut self) -> bool {
        let lagged = self.monitor_time();
        if let Some(remaining) = self.remaining {
            self.clock.sleep(remaining);
        }
        lagged
    }

    /// Advances the deadline without sleeping.
    pub fn monitor_time(&mut self) -> bool {
        let now = self.clock.now();
        let deadline = self.next_frame_time;
        self.next_frame_time += self.interval;
        self.frame += 1;

        if now <= deadline {
            self.remaining = Some(deadline - now);
            return false;
        }

        self.remaining = None;
        let late = now - deadline;
        if late > self.lag_warning {
            warn!(
                "{} lagging by {:.2} ms",
                self.name,
                late.as_secs_f64() * 1000.0
            );
            return true;
        }
        false
    }

    /// Number of completed ticks.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left before the deadline at the last tick, `None` if it was missed.
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining
    }
}
