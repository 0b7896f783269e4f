pub mod accumulator;
pub mod clock;
pub mod constants;
pub mod energy;
pub mod filter;
pub mod intake;
pub mod messaging;
pub mod meter;
pub mod mute;
pub mod ratekeeper;

pub use accumulator::{sample_channel, SampleAccumulator, SampleSink};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use filter::SmoothingFilter;
pub use intake::SampleIntake;
pub use messaging::{
    AlertSignal, AlertSource, ChannelAlertSource, ChannelPublisher, JsonLinesPublisher,
    MicrophoneMessage, NoAlerts, Publisher,
};
pub use meter::{MeterSettings, NoiseMeter};
pub use mute::MuteGate;
pub use ratekeeper::RateKeeper;
