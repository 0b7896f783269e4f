//! Boundary with the pub/sub transport.
//!
//! The meter only needs two capabilities: publish one outbound message per tick
//! and ask whether the upstream alert signal changed since the last look. Both
//! are traits so the daemon can plug in a real transport while tests and
//! embedders use crossbeam channels.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use log::warn;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

/// Outbound noise level message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MicrophoneMessage {
    #[serde(rename = "noiseLevel")]
    pub noise_level: f32,
}

/// Latest observation of the upstream "alert sound" signal.
///
/// `fired` is set when the signal was updated since the previous poll.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AlertSignal {
    pub fired: bool,
    pub intensity: f32,
}

impl AlertSignal {
    pub fn fired(intensity: f32) -> Self {
        Self {
            fired: true,
            intensity,
        }
    }

    /// Whether this observation should open a mute window.
    pub fn is_audible(&self) -> bool {
        self.fired && self.intensity > 0.0
    }
}

pub trait Publisher {
    fn publish(&mut self, msg: &MicrophoneMessage) -> Result<()>;
}

pub trait AlertSource {
    /// Returns the newest alert observation, or `None` when nothing changed.
    fn poll(&mut self) -> Option<AlertSignal>;
}

/// Alert source that never reports anything.
pub struct NoAlerts;

impl AlertSource for NoAlerts {
    fn poll(&mut self) -> Option<AlertSignal> {
        None
    }
}

/// In-process publisher backed by a crossbeam channel.
pub struct ChannelPublisher {
    tx: Sender<MicrophoneMessage>,
}

impl ChannelPublisher {
    pub fn new(tx: Sender<MicrophoneMessage>) -> Self {
        Self { tx }
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&mut self, msg: &MicrophoneMessage) -> Result<()> {
        self.tx
            .send(*msg)
            .context("Noise level receiver disconnected")
    }
}

/// Alert source reading from a crossbeam channel. Queued updates collapse to
/// the newest one.
pub struct ChannelAlertSource {
    rx: Receiver<AlertSignal>,
}

impl ChannelAlertSource {
    pub fn new(rx: Receiver<AlertSignal>) -> Self {
        Self { rx }
    }
}

impl AlertSource for ChannelAlertSource {
    fn poll(&mut self) -> Option<AlertSignal> {
        self.rx.try_iter().last()
    }
}

/// Writes one JSON object per message, e.g. `{"noiseLevel":0.5}`.
pub struct JsonLinesPublisher<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Publisher for JsonLinesPublisher<W> {
    fn publish(&mut self, msg: &MicrophoneMessage) -> Result<()> {
        serde_json::to_writer(&mut self.writer, msg)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct AlertLine {
    intensity: f32,
}

/// Forwards alert updates given as JSON lines (`{"intensity": 1.0}`) until the
/// reader hits EOF or the receiving side goes away. Malformed lines are skipped.
pub fn forward_alert_lines<R: BufRead>(reader: R, tx: Sender<AlertSignal>) -> Result<()> {
    for line in reader.lines() {
        let line = line.context("Failed to read alert input")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<AlertLine>(line) {
            Ok(update) => {
                if tx.send(AlertSignal::fired(update.intensity)).is_err() {
                    break;
                }
            }
            Err(e) => warn!("Ignoring malformed alert line {:?}: {}", line, e),
        }
    }
    Ok(())
}
