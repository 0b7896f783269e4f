use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};
use micd_core::SampleIntake;

/// Live microphone capture.
///
/// Holds the input stream for as long as it is alive; dropping it stops the
/// stream and releases the device, including on early error returns.
pub struct CaptureStream {
    _stream: cpal::Stream,
    device_name: String,
}

impl CaptureStream {
    /// Opens the default input device as a mono `f32` stream at `sample_rate`
    /// and feeds every delivered buffer through `intake`.
    pub fn open(sample_rate: u32, mut intake: SampleIntake) -> Result<Self> {
        let host = cpal::default_host();
        info!("Audio host: {}", host.id().name());

        let device = host
            .default_input_device()
            .context("No default input found")?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    intake.deliver(data);
                },
                |err| warn!("Input error: {}", err),
                None,
            )
            .with_context(|| format!("Failed to open input stream on '{}'", device_name))?;

        stream.play().context("Failed to start input stream")?;

        info!(
            "micd stream started: samplerate={} channels={} dtype=f32 device={}",
            config.sample_rate.0, config.channels, device_name
        );

        Ok(Self {
            _stream: stream,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        info!("Releasing input device '{}'", self.device_name);
    }
}
