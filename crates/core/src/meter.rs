//! The publish loop.
//!
//! [`NoiseMeter`] owns every piece of loop-side state (pending samples, filter,
//! pacing) plus a shared handle on the mute gate the capture callback reads.
//! Each tick it polls the alert signal, folds a closed window into the filter
//! and publishes the current level.

use crate::accumulator::SampleAccumulator;
use crate::clock::Clock;
use crate::constants::{
    LAG_WARNING_SECS, PUBLISH_RATE_HZ, SAMPLE_RATE, SMOOTHING_TIME_CONSTANT_SECS, WINDOW_SECS,
};
use crate::energy::energy;
use crate::filter::SmoothingFilter;
use crate::messaging::{AlertSource, MicrophoneMessage, Publisher};
use crate::mute::MuteGate;
use crate::ratekeeper::RateKeeper;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Loop parameters, already converted to the units the loop works in.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterSettings {
    /// Samples per energy window.
    pub window_size: usize,
    pub tick_interval: Duration,
    pub time_constant: Duration,
    pub lag_warning: Duration,
    /// Published until the first window closes.
    pub initial_level: f32,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            window_size: (SAMPLE_RATE as f32 * WINDOW_SECS) as usize,
            tick_interval: Duration::from_secs_f64(1.0 / f64::from(PUBLISH_RATE_HZ)),
            time_constant: Duration::from_secs_f64(f64::from(SMOOTHING_TIME_CONSTANT_SECS)),
            lag_warning: Duration::from_secs_f64(f64::from(LAG_WARNING_SECS)),
            initial_level: 0.0,
        }
    }
}

pub struct NoiseMeter {
    clock: Arc<dyn Clock>,
    mute: Arc<MuteGate>,
    accumulator: SampleAccumulator,
    filter: SmoothingFilter,
    rate_keeper: RateKeeper,
    alerts: Box<dyn AlertSource + Send>,
    publisher: Box<dyn Publisher + Send>,
    window_size: usize,
}

impl NoiseMeter {
    pub fn new(
        settings: &MeterSettings,
        clock: Arc<dyn Clock>,
        mute: Arc<MuteGate>,
        accumulator: SampleAccumulator,
        alerts: Box<dyn AlertSource + Send>,
        publisher: Box<dyn Publisher + Send>,
    ) -> Self {
        let filter = SmoothingFilter::new(
            settings.initial_level,
            settings.time_constant.as_secs_f32(),
            settings.tick_interval.as_secs_f32(),
        );
        let rate_keeper = RateKeeper::new(
            "micd",
            clock.clone(),
            settings.tick_interval,
            settings.lag_warning,
        );
        Self {
            clock,
            mute,
            accumulator,
            filter,
            rate_keeper,
            alerts,
            publisher,
            window_size: settings.window_size,
        }
    }

    /// Runs one iteration without pacing and returns the published level.
    pub fn tick(&mut self) -> f32 {
        let now = self.clock.now();

        if let Some(alert) = self.alerts.poll() {
            if alert.is_audible() {
                debug!("Alert sound fired (intensity {}), muting intake", alert.intensity);
                self.mute.record_alert(now);
            }
        }

        if let Some(window) = self.accumulator.drain_if_full(self.window_size) {
            let window_energy = energy(&window);
            let level = self.filter.update(window_energy);
            debug!(
                "Window closed: {} samples, energy {:.5}, level {:.5}",
                window.len(),
                window_energy,
                level
            );
        }

        let msg = MicrophoneMessage {
            noise_level: self.filter.read(),
        };
        if let Err(e) = self.publisher.publish(&msg) {
            warn!("Failed to publish noise level: {:#}", e);
        }
        msg.noise_level
    }

    /// Runs paced ticks until `stop` is set. The flag is checked once per tick.
    pub fn run_until(&mut self, stop: &AtomicBool) {
        info!(
            "Publishing noise level every {:?} (window {} samples)",
            self.rate_keeper.interval(),
            self.window_size
        );
        while !stop.load(Ordering::Relaxed) {
            self.tick();
            self.rate_keeper.keep_time();
        }
        info!("Publish loop stopped after {} ticks", self.rate_keeper.frame());
    }

    /// Runs exactly `ticks` paced iterations.
    pub fn run_for(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
            self.rate_keeper.keep_time();
        }
    }

    pub fn filter(&self) -> &SmoothingFilter {
        &self.filter
    }

    pub fn mute(&self) -> &Arc<MuteGate> {
        &self.mute
    }

    pub fn accumulator(&self) -> &SampleAccumulator {
        &self.accumulator
    }

    pub fn frame(&self) -> u64 {
        self.rate_keeper.frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::sample_channel;
    use crate::clock::ManualClock;
    use crate::intake::SampleIntake;
    use crate::messaging::{AlertSignal, ChannelAlertSource, ChannelPublisher, NoAlerts};
    use anyhow::{anyhow, Result};
    use crossbeam_channel::{unbounded, Receiver, Sender};

    struct Rig {
        clock: Arc<ManualClock>,
        intake: SampleIntake,
        meter: NoiseMeter,
        alerts: Sender<AlertSignal>,
        published: Receiver<MicrophoneMessage>,
    }

    fn rig(window_size: usize) -> Rig {
        let settings = MeterSettings {
            window_size,
            ..MeterSettings::default()
        };
        let clock = Arc::new(ManualClock::new());
        let mute = Arc::new(MuteGate::new(Duration::from_secs(5)));
        let (sink, accumulator) = sample_channel(window_size * 2);
        let (alert_tx, alert_rx) = unbounded();
        let (pub_tx, pub_rx) = unbounded();

        let intake = SampleIntake::new(sink, mute.clone(), clock.clone());
        let meter = NoiseMeter::new(
            &settings,
            clock.clone(),
            mute,
            accumulator,
            Box::new(ChannelAlertSource::new(alert_rx)),
            Box::new(ChannelPublisher::new(pub_tx)),
        );
        Rig {
            clock,
            intake,
            meter,
            alerts: alert_tx,
            published: pub_rx,
        }
    }

    #[test]
    fn test_silence_publishes_exact_zero() {
        let sample_rate = SAMPLE_RATE as usize;
        let mut rig = rig(sample_rate);

        assert!(rig.intake.deliver(&vec![0.0; sample_rate]));
        rig.meter.tick();

        assert_eq!(rig.published.try_recv().unwrap().noise_level, 0.0);
        assert!(rig.meter.filter().is_initialized());
        assert_eq!(rig.meter.filter().reading(), Some(0.0));
    }

    #[test]
    fn test_publishes_initial_level_before_first_window() {
        let mut rig = rig(8);
        rig.intake.deliver(&[0.7; 4]);
        rig.meter.tick();

        assert_eq!(rig.published.try_recv().unwrap().noise_level, 0.0);
        assert!(!rig.meter.filter().is_initialized());
        assert_eq!(rig.meter.accumulator().len(), 4);
    }

    #[test]
    fn test_alert_mutes_capture_for_cooldown() {
        let mut rig = rig(4);

        rig.alerts.send(AlertSignal::fired(1.0)).unwrap();
        rig.meter.tick();
        assert!(rig.meter.mute().is_muted(rig.clock.now()));

        for t in 1..=4 {
            rig.clock.set(Duration::from_secs(t));
            assert!(!rig.intake.deliver(&[0.5; 4]), "samples kept at {}s", t);
        }
        assert!(rig.meter.accumulator().is_empty());

        rig.clock.set(Duration::from_secs(6));
        assert!(rig.intake.deliver(&[0.5; 4]));
        assert_eq!(rig.meter.accumulator().len(), 4);
    }

    #[test]
    fn test_silent_alert_does_not_mute() {
        let mut rig = rig(4);
        rig.alerts.send(AlertSignal::fired(0.0)).unwrap();
        rig.meter.tick();
        assert!(rig.intake.deliver(&[0.5; 4]));
    }

    #[test]
    fn test_level_holds_between_windows() {
        let mut rig = rig(4);
        rig.intake.deliver(&[0.5; 4]);
        assert_eq!(rig.meter.tick(), 1.0);
        rig.published.try_recv().unwrap();

        // A partial window must not disturb the held value.
        rig.intake.deliver(&[0.9; 2]);
        rig.meter.run_for(20);

        let values: Vec<f32> = rig.published.try_iter().map(|m| m.noise_level).collect();
        assert_eq!(values.len(), 20);
        assert!(values.iter().all(|&v| v == 1.0));
        assert_eq!(rig.clock.now(), Duration::from_secs(2));
    }

    #[test]
    fn test_successive_windows_are_smoothed() {
        let mut rig = rig(4);
        rig.intake.deliver(&[0.5; 4]);
        rig.meter.tick();
        rig.intake.deliver(&[1.0; 4]);
        let level = rig.meter.tick();

        // alpha = 0.1 / (1.0 + 0.1); energy goes from 1.0 to 2.0
        let alpha = 0.1f32 / 1.1;
        assert!((level - (1.0 + alpha)).abs() < 1e-5);
    }

    struct FailingPublisher;

    impl Publisher for FailingPublisher {
        fn publish(&mut self, _msg: &MicrophoneMessage) -> Result<()> {
            Err(anyhow!("transport down"))
        }
    }

    #[test]
    fn test_publish_failure_does_not_stop_the_loop() {
        let clock = Arc::new(ManualClock::new());
        let (_sink, accumulator) = sample_channel(8);
        let mut meter = NoiseMeter::new(
            &MeterSettings::default(),
            clock.clone(),
            Arc::new(MuteGate::new(Duration::from_secs(5))),
            accumulator,
            Box::new(NoAlerts),
            Box::new(FailingPublisher),
        );
        meter.run_for(3);
        assert_eq!(meter.frame(), 3);
    }

    struct StopAfter {
        remaining: usize,
        stop: Arc<AtomicBool>,
    }

    impl Publisher for StopAfter {
        fn publish(&mut self, _msg: &MicrophoneMessage) -> Result<()> {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.stop.store(true, Ordering::Relaxed);
            }
            Ok(())
        }
    }

    #[test]
    fn test_run_until_honours_stop_flag() {
        let clock = Arc::new(ManualClock::new());
        let stop = Arc::new(AtomicBool::new(false));
        let (_sink, accumulator) = sample_channel(8);
        let mut meter = NoiseMeter::new(
            &MeterSettings::default(),
            clock.clone(),
            Arc::new(MuteGate::new(Duration::from_secs(5))),
            accumulator,
            Box::new(NoAlerts),
            Box::new(StopAfter {
                remaining: 5,
                stop: stop.clone(),
            }),
        );
        meter.run_until(&stop);
        assert_eq!(meter.frame(), 5);
        assert_eq!(clock.now(), Duration::from_millis(500));
    }
}
