//! Sensor collaborator traits and reading types
//!
//! The physical drivers (ADC, IMU) live outside this crate. The sampler only
//! sees them through [`SensorBank`], which must be callable from interrupt
//! context: no blocking, no allocation.

use thiserror_no_std::Error;

/// Maximum number of raw ADC channels carried in one sample.
pub const MAX_CHANNELS: usize = 16;

/// Largest value a 13-bit ADC conversion can produce.
pub const CHANNEL_MAX_READING: u16 = 8191;

/// Raw readings for the active channel window, in channel-index order.
pub type ChannelReadings = heapless::Vec<u16, MAX_CHANNELS>;

/// Channel indices to read, in the same order as [`ChannelReadings`].
pub type ChannelIndices = heapless::Vec<u8, MAX_CHANNELS>;

/// One IMU snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImuReading {
    /// Acceleration X, Y, Z (m/s^2)
    pub accel: [f32; 3],
    /// Angular rate X, Y, Z (rad/s)
    pub gyro: [f32; 3],
    /// Die temperature (degC)
    pub temperature: f32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: read failed ({details})")]
    ReadFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("ADC channel {0} is not wired")]
    UnknownChannel(u8),
}

/// Inclusive range of ADC channels to sample, from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelWindow {
    pub bottom: u8,
    pub top: u8,
}

impl ChannelWindow {
    pub const fn new(bottom: u8, top: u8) -> Self {
        Self { bottom, top }
    }

    /// Number of active channels, `top - bottom + 1` bounded to [`MAX_CHANNELS`].
    ///
    /// An inverted window (`top < bottom`) has no channels.
    pub fn count(&self) -> usize {
        if self.top < self.bottom {
            return 0;
        }
        (usize::from(self.top - self.bottom) + 1).min(MAX_CHANNELS)
    }

    /// Channel indices to hand to [`SensorBank::read_channels`].
    pub fn indices(&self) -> ChannelIndices {
        (0..self.count())
            .map(|offset| self.bottom.saturating_add(offset as u8))
            .collect()
    }
}

/// The set of sensors sampled on every timer firing.
pub trait SensorBank {
    /// Convert each channel in `channels` and push one reading per channel
    /// into `readings`, in the same order.
    fn read_channels(
        &mut self,
        channels: &[u8],
        readings: &mut ChannelReadings,
    ) -> Result<(), SensorError>;

    /// Read acceleration, angular rate and temperature from the IMU.
    fn read_imu(&mut self) -> Result<ImuReading, SensorError>;
}
