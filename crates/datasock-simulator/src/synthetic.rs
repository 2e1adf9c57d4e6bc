//! Synthetic sensors and a timer stand-in for running without hardware.

use std::f64::consts::TAU;

use datasock_core::sampling::SampleTimer;
use datasock_core::sensors::{
    CHANNEL_MAX_READING, ChannelReadings, ImuReading, SensorBank, SensorError,
};
use log::debug;

/// Generates readings that drift smoothly over time.
///
/// Every firing advances an internal clock by `step_secs`, so a replay with a
/// fixed poll rate always produces the same data.
pub struct SyntheticSensors {
    elapsed_secs: f64,
    step_secs: f64,
}

impl SyntheticSensors {
    pub fn new(step_secs: f64) -> Self {
        Self {
            elapsed_secs: 0.0,
            step_secs,
        }
    }
}

/// Mid-scale wave with a per-channel period so neighbouring channels differ.
fn channel_reading(channel: u8, t: f64) -> u16 {
    let period = 20.0 + 7.0 * f64::from(channel);
    let mid = f64::from(CHANNEL_MAX_READING) / 2.0;
    let value = mid + 3000.0 * (TAU * t / period).sin() + 150.0 * (t / 3.0).cos();
    value.clamp(0.0, f64::from(CHANNEL_MAX_READING)) as u16
}

impl SensorBank for SyntheticSensors {
    fn read_channels(
        &mut self,
        channels: &[u8],
        readings: &mut ChannelReadings,
    ) -> Result<(), SensorError> {
        self.elapsed_secs += self.step_secs;
        let t = self.elapsed_secs;

        for &channel in channels {
            readings
                .push(channel_reading(channel, t))
                .map_err(|_| SensorError::UnknownChannel(channel))?;
        }
        Ok(())
    }

    fn read_imu(&mut self) -> Result<ImuReading, SensorError> {
        let t = self.elapsed_secs;

        // A sock swaying in the current: gravity on z with slow tilt
        let tilt = 0.8 * (t / 5.0).sin();
        let accel = [
            (tilt * 9.81 / 10.0) as f32,
            (0.3 * (t / 7.0).cos()) as f32,
            (9.81 - 0.2 * (t / 11.0).sin()) as f32,
        ];
        let gyro = [
            (0.4 * (t / 5.0).cos()) as f32,
            (0.15 * (t / 9.0).sin()) as f32,
            (0.05 * (t / 13.0).cos()) as f32,
        ];
        // Water temperature: 14-20 C with slow drift
        let temperature = (17.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos()) as f32;

        Ok(ImuReading {
            accel,
            gyro,
            temperature,
        })
    }
}

/// Records the period the sampler asks for; the run loop reads it back through
/// [`datasock_core::Sampler::armed_period`] and fires on that schedule.
#[derive(Debug, Default)]
pub struct SimTimer;

impl SampleTimer for SimTimer {
    type Error = std::convert::Infallible;

    fn arm(&mut self, period_ms: u32) -> Result<(), Self::Error> {
        debug!("Timer armed at {} ms", period_ms);
        Ok(())
    }

    fn disarm(&mut self) {
        debug!("Timer disarmed");
    }
}
