use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::unbounded;
use log::{info, warn};
use micd_core::messaging::forward_alert_lines;
use micd_core::{
    sample_channel, AlertSource, ChannelAlertSource, Clock, JsonLinesPublisher, MonotonicClock,
    MuteGate, NoAlerts, NoiseMeter, SampleIntake,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

mod audio;
mod config;

use config::DaemonConfig;

#[derive(Parser)]
#[command(name = "micd")]
#[command(about = "Ambient noise level daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture from the default microphone and publish the noise level (default)
    Run(RunArgs),
    /// Print the effective configuration as JSON
    Config(ConfigArgs),
}

#[derive(Args, Default)]
struct ConfigArgs {
    /// JSON config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Publish rate in Hz
    #[arg(long)]
    rate: Option<f32>,
    /// Seconds of muted intake after an alert sound
    #[arg(long)]
    mute_secs: Option<f32>,
}

#[derive(Args, Default)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Read alert updates as JSON lines ({"intensity": 1.0}) from stdin
    #[arg(long)]
    alerts_from_stdin: bool,
}

impl ConfigArgs {
    fn resolve(&self) -> Result<DaemonConfig> {
        let mut config = DaemonConfig::load(self.config.as_deref())?;
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(rate) = self.rate {
            config.publish_rate_hz = rate;
        }
        if let Some(mute_secs) = self.mute_secs {
            config.mute_secs = mute_secs;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config(args)) => {
            let config = args.resolve()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Some(Commands::Run(args)) => run(args)?,
        None => run(RunArgs::default())?,
    }

    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let config = args.config.resolve()?;
    let settings = config.meter_settings()?;

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let mute = Arc::new(MuteGate::new(config.mute_duration()?));
    let (sink, accumulator) = sample_channel(config.ring_capacity()?);

    let intake = SampleIntake::new(sink, mute.clone(), clock.clone());
    let capture = audio::CaptureStream::open(config.sample_rate, intake)?;

    let alerts: Box<dyn AlertSource + Send> = if args.alerts_from_stdin {
        let (tx, rx) = unbounded();
        thread::spawn(move || {
            if let Err(e) = forward_alert_lines(io::stdin().lock(), tx) {
                warn!("Alert input stopped: {:#}", e);
            }
        });
        Box::new(ChannelAlertSource::new(rx))
    } else {
        Box::new(NoAlerts)
    };

    let mut meter = NoiseMeter::new(
        &settings,
        clock,
        mute,
        accumulator,
        alerts,
        Box::new(JsonLinesPublisher::new(io::stdout())),
    );

    let stop = Arc::new(AtomicBool::new(false));
    let s = stop.clone();
    ctrlc::set_handler(move || {
        info!("Shutting down gracefully...");
        s.store(true, Ordering::Relaxed);
    })?;

    info!("Capturing from '{}'", capture.device_name());
    meter.run_until(&stop);

    drop(capture);
    info!("micd stopped.");
    Ok(())
}
