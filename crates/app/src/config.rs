use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use log::warn;
use micd_core::constants::{
    LAG_WARNING_SECS, MUTE_DURATION_SECS, PUBLISH_RATE_HZ, SAMPLE_RATE,
    SMOOTHING_TIME_CONSTANT_SECS, WINDOW_SECS,
};
use micd_core::MeterSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on samples buffered between two drains (about 23 minutes at 48kHz).
const MAX_BUFFERED_SAMPLES: usize = 1 << 26;

/// Daemon tuning. Read once at startup, never written back.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DaemonConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: f32,
    #[serde(default = "default_publish_rate_hz")]
    pub publish_rate_hz: f32,
    #[serde(default = "default_time_constant_secs")]
    pub time_constant_secs: f32,
    #[serde(default = "default_mute_secs")]
    pub mute_secs: f32,
    #[serde(default = "default_lag_warning_secs")]
    pub lag_warning_secs: f32,
}

fn default_sample_rate() -> u32 {
    SAMPLE_RATE
}

fn default_window_secs() -> f32 {
    WINDOW_SECS
}

fn default_publish_rate_hz() -> f32 {
    PUBLISH_RATE_HZ
}

fn default_time_constant_secs() -> f32 {
    SMOOTHING_TIME_CONSTANT_SECS
}

fn default_mute_secs() -> f32 {
    MUTE_DURATION_SECS
}

fn default_lag_warning_secs() -> f32 {
    LAG_WARNING_SECS
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            window_secs: default_window_secs(),
            publish_rate_hz: default_publish_rate_hz(),
            time_constant_secs: default_time_constant_secs(),
            mute_secs: default_mute_secs(),
            lag_warning_secs: default_lag_warning_secs(),
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from `path`, or from the user config directory.
    ///
    /// An explicitly given file must exist and parse. The default location is
    /// optional: a missing or broken file there falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            return serde_json::from_str(&content)
                .with_context(|| format!("Invalid config {}", path.display()));
        }

        if let Some(path) = config_path() {
            if let Ok(content) = fs::read_to_string(&path) {
                match serde_json::from_str(&content) {
                    Ok(cfg) => return Ok(cfg),
                    Err(e) => warn!("Ignoring {}: {}", path.display(), e),
                }
            }
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        for (name, value) in [
            ("window_secs", self.window_secs),
            ("publish_rate_hz", self.publish_rate_hz),
            ("time_constant_secs", self.time_constant_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                bail!("{} must be a positive number, got {}", name, value);
            }
        }
        for (name, value) in [
            ("mute_secs", self.mute_secs),
            ("lag_warning_secs", self.lag_warning_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must not be negative, got {}", name, value);
            }
        }
        if self.window_size() == 0 {
            bail!("window_secs is shorter than one sample");
        }
        self.mute_duration()?;
        self.meter_settings()?;
        self.ring_capacity()?;
        Ok(())
    }

    /// Samples in one energy window.
    pub fn window_size(&self) -> usize {
        (self.sample_rate as f64 * self.window_secs as f64).round() as usize
    }

    pub fn mute_duration(&self) -> Result<Duration> {
        secs("mute_secs", self.mute_secs as f64)
    }

    pub fn meter_settings(&self) -> Result<MeterSettings> {
        Ok(MeterSettings {
            window_size: self.window_size(),
            tick_interval: secs("publish_rate_hz", 1.0 / self.publish_rate_hz as f64)?,
            time_constant: secs("time_constant_secs", self.time_constant_secs as f64)?,
            lag_warning: secs("lag_warning_secs", self.lag_warning_secs as f64)?,
            initial_level: 0.0,
        })
    }

    /// Capacity of the capture ring.
    ///
    /// The loop empties the ring once per tick, so it must hold a full tick of
    /// audio as well as a full window, with the same headroom for both.
    pub fn ring_capacity(&self) -> Result<usize> {
        let tick_samples = (self.sample_rate as f64 / self.publish_rate_hz as f64).ceil();
        let capacity = 2.0 * (self.window_size() as f64).max(tick_samples);
        if capacity > MAX_BUFFERED_SAMPLES as f64 {
            bail!(
                "window_secs and publish_rate_hz need {} buffered samples, limit is {}",
                capacity,
                MAX_BUFFERED_SAMPLES
            );
        }
        Ok(capacity as usize)
    }
}

fn secs(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{} gives an unusable duration of {} s", name, value))
}

fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "micd", "micd").map(|dirs| dirs.config_dir().join("config.json"))
}
