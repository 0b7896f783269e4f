//! Shared constants for the noise level pipeline.

/// Capture sample rate (48kHz)
pub const SAMPLE_RATE: u32 = 48000;

/// Publish rate of the noise level message (10Hz)
pub const PUBLISH_RATE_HZ: f32 = 10.0;

/// Length of one energy window in seconds
pub const WINDOW_SECS: f32 = 1.0;

/// Time constant of the smoothing filter in seconds (10 ticks at 10Hz)
pub const SMOOTHING_TIME_CONSTANT_SECS: f32 = 1.0;

/// How long sample intake stays muted after an alert sound fired
pub const MUTE_DURATION_SECS: f32 = 5.0;

/// A tick later than this is reported as lagging
pub const LAG_WARNING_SECS: f32 = 0.1;
