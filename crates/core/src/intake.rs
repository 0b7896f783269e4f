//! Capture-side entry point: drops samples while muted, forwards them otherwise.

use crate::accumulator::SampleSink;
use crate::clock::Clock;
use crate::mute::MuteGate;
use std::sync::Arc;

/// Owned by the audio callback. Reads the mute gate and pushes into the sink;
/// neither step blocks.
pub struct SampleIntake {
    sink: SampleSink,
    mute: Arc<MuteGate>,
    clock: Arc<dyn Clock>,
}

impl SampleIntake {
    pub fn new(sink: SampleSink, mute: Arc<MuteGate>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, mute, clock }
    }

    /// Handles one delivered buffer. Returns `false` when it was muted.
    pub fn deliver(&mut self, samples: &[f32]) -> bool {
        if self.mute.is_muted(self.clock.now()) {
            return false;
        }
        self.sink.append(samples);
        true
    }
}
