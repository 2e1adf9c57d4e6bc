//! Timer-driven sampling and the queue that carries samples to the log store.
//!
//! The [`Sampler`] runs in interrupt context and owns the producer half of a
//! [`SampleRing`]; the main loop owns the consumer half and drains it through
//! [`crate::storage::LogStore::service`].

mod ring;
mod sampler;

pub use ring::{Consumer, Producer, Push, SampleRing, SpscRing};
pub use sampler::{SampleTimer, Sampler, SamplerError, SamplerState};

use crate::sensors::{ChannelReadings, ImuReading};

/// Default ring depth: a few seconds of headroom at the default poll rate.
pub const RING_SLOTS: usize = 40;

/// One timestamped reading of every active sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    /// Local time, seconds since the epoch
    pub epoch_seconds: u32,
    /// Milliseconds into `epoch_seconds` (0-999)
    pub millis: u16,
    pub imu: ImuReading,
    /// Raw ADC readings for the active channel window
    pub channels: ChannelReadings,
}
