use core::fmt::Debug;

use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::clock::Clock;
use crate::config::{ConfigStore, SharedConfig};
use crate::sensors::{CHANNEL_MAX_READING, SensorBank};
use crate::storage::{ErrorDetail, error_detail};

use super::ring::{Producer, Push};
use super::Sample;

/// Periodic hardware timer that calls [`Sampler::on_timer`].
pub trait SampleTimer {
    type Error: Debug;

    /// Start (or restart) firing every `period_ms` milliseconds.
    fn arm(&mut self, period_ms: u32) -> Result<(), Self::Error>;

    /// Stop firing. Must be harmless when not armed.
    fn disarm(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Stopped,
    Running,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SamplerError {
    #[error("invalid sample period: {0} ms")]
    InvalidPeriod(u32),
    #[error("failed to arm {period_ms} ms timer: {details}")]
    Timer {
        period_ms: u32,
        details: ErrorDetail,
    },
}

/// Takes one [`Sample`] per timer firing and queues it for the log store.
///
/// [`Sampler::on_timer`] runs in interrupt context: it only reads the shared
/// config inside a short critical section, talks to the sensors and clock,
/// and pushes into the ring without blocking.
pub struct Sampler<'a, T, S, C> {
    timer: T,
    sensors: S,
    clock: C,
    config: &'a SharedConfig,
    producer: Producer<'a, Sample>,
    state: SamplerState,
    /// Period the timer is currently armed with
    armed_period: Option<u32>,
}

impl<'a, T, S, C> Sampler<'a, T, S, C>
where
    T: SampleTimer,
    S: SensorBank,
    C: Clock,
{
    pub fn new(
        timer: T,
        sensors: S,
        clock: C,
        config: &'a SharedConfig,
        producer: Producer<'a, Sample>,
    ) -> Self {
        Self {
            timer,
            sensors,
            clock,
            config,
            producer,
            state: SamplerState::Stopped,
            armed_period: None,
        }
    }

    /// Arm the timer with the configured poll rate and start sampling.
    ///
    /// The timer is only re-armed if the period changed since it was last
    /// armed. On failure the sampler is left stopped.
    pub fn start(&mut self) -> Result<(), SamplerError> {
        let period_ms = self.config.read(ConfigStore::poll_rate_ms);

        if let Err(e) = self.arm(period_ms) {
            error!("Failed to start sampling: {}", e);
            self.state = SamplerState::Stopped;
            return Err(e);
        }

        self.state = SamplerState::Running;
        info!("Sampling every {} ms", period_ms);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.timer.disarm();
        self.armed_period = None;
        if self.state == SamplerState::Running {
            info!("Sampling stopped");
        }
        self.state = SamplerState::Stopped;
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SamplerState::Running
    }

    pub fn armed_period(&self) -> Option<u32> {
        self.armed_period
    }

    /// Take one sample. Called from the timer interrupt.
    ///
    /// Sensor failures do not skip the sample: the affected fields are
    /// zeroed so the row still lands at the right time.
    pub fn on_timer(&mut self) -> Push {
        let (window, period_ms) = self
            .config
            .read(|config| (config.channel_window(), config.poll_rate_ms()));
        let indices = window.indices();

        let mut sample = Sample::default();
        if let Err(e) = self.sensors.read_channels(&indices, &mut sample.channels) {
            warn!("ADC read failed: {}", e);
            sample.channels.clear();
        }
        // One reading per active channel, no matter what the bank returned
        sample.channels.truncate(indices.len());
        while sample.channels.len() < indices.len() {
            let _ = sample.channels.push(0);
        }
        for reading in sample.channels.iter_mut() {
            *reading = (*reading).min(CHANNEL_MAX_READING);
        }

        match self.sensors.read_imu() {
            Ok(imu) => sample.imu = imu,
            Err(e) => warn!("IMU read failed: {}", e),
        }

        sample.epoch_seconds = self.clock.now_local_epoch();
        sample.millis = self.clock.now_millis();

        let pushed = self.producer.try_push(sample);
        if pushed != Push::Stored {
            debug!("Sample ring full ({:?})", pushed);
        }

        if self.is_running() && self.armed_period != Some(period_ms) {
            match self.arm(period_ms) {
                Ok(()) => info!("Sample period changed to {} ms", period_ms),
                Err(SamplerError::InvalidPeriod(_)) => {
                    warn!("Ignoring invalid poll rate {} ms", period_ms)
                }
                Err(e) => {
                    error!("Sampling stopped: {}", e);
                    self.state = SamplerState::Stopped;
                }
            }
        }

        pushed
    }

    fn arm(&mut self, period_ms: u32) -> Result<(), SamplerError> {
        if period_ms == 0 {
            return Err(SamplerError::InvalidPeriod(period_ms));
        }
        if self.armed_period == Some(period_ms) {
            return Ok(());
        }

        if let Err(e) = self.timer.arm(period_ms) {
            self.timer.disarm();
            self.armed_period = None;
            return Err(SamplerError::Timer {
                period_ms,
                details: error_detail(&e),
            });
        }
        self.armed_period = Some(period_ms);
        Ok(())
    }
}
