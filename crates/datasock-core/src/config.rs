//! Device configuration
//!
//! A closed set of keys, each holding a string value and its best-effort
//! numeric form. Values start at compiled-in defaults and may be replaced by
//! `config.txt` in the root of the storage volume:
//!
//! ```text
//! # DataSock configuration
//! device_name=DataSock
//! poll_rate=100
//! time_zone=-8
//! ```
//!
//! The file is only ever written by [`ConfigStore::create`], which resets it
//! to the defaults. The sampler (interrupt context) and the main loop share
//! one store through [`SharedConfig`].

use core::cell::RefCell;
use core::fmt::Write;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{info, warn};
use thiserror_no_std::Error;

use crate::sensors::ChannelWindow;
use crate::storage::{ErrorDetail, LineError, LineReader, OpenMode, Volume, error_detail};

pub const CONFIG_FILE: &str = "config.txt";

/// Longest accepted config value.
pub type ConfigValue = heapless::String<32>;

/// Config lines are short; keep the read buffer small.
const CONFIG_LINE_CAPACITY: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// Prefix of every bucket file name
    DeviceName,
    /// Sampling period in milliseconds
    PollRate,
    /// Local offset from UTC in whole hours
    TimeZone,
    /// IMU range/filter preset, passed through to the IMU driver
    ImuProfile,
    /// First ADC channel sampled
    ChannelBottom,
    /// Last ADC channel sampled (inclusive)
    ChannelTop,
}

impl ConfigKey {
    pub const COUNT: usize = 6;

    pub const ALL: [ConfigKey; Self::COUNT] = [
        Self::DeviceName,
        Self::PollRate,
        Self::TimeZone,
        Self::ImuProfile,
        Self::ChannelBottom,
        Self::ChannelTop,
    ];

    /// Name used in `config.txt`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::DeviceName => "device_name",
            Self::PollRate => "poll_rate",
            Self::TimeZone => "time_zone",
            Self::ImuProfile => "imu_profile",
            Self::ChannelBottom => "channel_bottom",
            Self::ChannelTop => "channel_top",
        }
    }

    pub const fn default_value(self) -> &'static str {
        match self {
            Self::DeviceName => "DataSock",
            Self::PollRate => "100",
            Self::TimeZone => "-8",
            Self::ImuProfile => "0",
            Self::ChannelBottom => "0",
            Self::ChannelTop => "3",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Current value of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigOption {
    pub key: ConfigKey,
    pub value: ConfigValue,
    /// `value` read as a decimal integer, 0 when it is not one
    pub number: i32,
}

impl ConfigOption {
    fn default_for(key: ConfigKey) -> Self {
        let mut value = ConfigValue::new();
        // Defaults are all well under the value capacity.
        let _ = value.push_str(key.default_value());
        Self {
            key,
            number: parse_number(&value),
            value,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("storage medium unavailable: {0}")]
    Unavailable(ErrorDetail),
    #[error("config file I/O failed: {0}")]
    Io(ErrorDetail),
    #[error("no recognized keys in config file")]
    NoKeys,
    #[error("value for {key} is too long")]
    ValueTooLong { key: &'static str },
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },
}

/// All configuration values, indexed by [`ConfigKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    options: [ConfigOption; ConfigKey::COUNT],
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// A store holding the compiled-in defaults.
    pub fn new() -> Self {
        Self {
            options: core::array::from_fn(|i| ConfigOption::default_for(ConfigKey::ALL[i])),
        }
    }

    /// Reset every key to its default.
    pub fn load_defaults(&mut self) {
        *self = Self::new();
    }

    /// Replace the configuration with the contents of `config.txt`.
    ///
    /// Keys missing from the file take their defaults. Blank lines, `#`
    /// comments, unknown keys and unusable lines are logged and skipped.
    /// Returns the number of keys read; if the file is missing, unreadable or
    /// has no recognized keys, the store is left untouched and an error is
    /// returned.
    pub fn load<V: Volume>(&mut self, volume: &mut V) -> Result<usize, ConfigError> {
        ensure_attached(volume)?;
        let file = volume
            .open(CONFIG_FILE, OpenMode::Read)
            .map_err(|e| ConfigError::Io(error_detail(&e)))?;

        let mut staged = Self::new();
        let mut matched = 0;
        let mut reader = LineReader::<_, CONFIG_LINE_CAPACITY>::new(file);

        let result = loop {
            match reader.next_line(volume) {
                Ok(Some(line)) => {
                    if staged.apply_line(line) {
                        matched += 1;
                    }
                }
                Ok(None) => break Ok(()),
                Err(LineError::Io(detail)) => break Err(ConfigError::Io(detail)),
                Err(e) => warn!("{}: skipping line: {}", CONFIG_FILE, e),
            }
        };
        let _ = volume.close(reader.into_file());
        result?;

        if matched == 0 {
            warn!("{}: no recognized keys", CONFIG_FILE);
            return Err(ConfigError::NoKeys);
        }

        *self = staged;
        info!("Loaded {} config keys from {}", matched, CONFIG_FILE);
        Ok(matched)
    }

    /// [`ConfigStore::load`], falling back to the defaults on any failure.
    pub fn load_or_defaults<V: Volume>(&mut self, volume: &mut V) -> usize {
        match self.load(volume) {
            Ok(matched) => matched,
            Err(e) => {
                warn!("Using default config: {}", e);
                self.load_defaults();
                0
            }
        }
    }

    /// Write a fresh `config.txt` holding every key at its default.
    pub fn create<V: Volume>(volume: &mut V) -> Result<(), ConfigError> {
        ensure_attached(volume)?;
        let mut file = volume
            .open(CONFIG_FILE, OpenMode::Truncate)
            .map_err(|e| ConfigError::Io(error_detail(&e)))?;

        let result = write_defaults(volume, &mut file);
        let closed = volume
            .close(file)
            .map_err(|e| ConfigError::Io(error_detail(&e)));
        result.and(closed)?;

        info!("Wrote default {}", CONFIG_FILE);
        Ok(())
    }

    /// Change a value at runtime. The file on the medium is not touched.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<(), ConfigError> {
        let value = ConfigValue::try_from(value).map_err(|_| ConfigError::ValueTooLong {
            key: key.name(),
        })?;
        let option = &mut self.options[key.index()];
        option.number = parse_number(&value);
        option.value = value;
        Ok(())
    }

    pub fn option(&self, key: ConfigKey) -> &ConfigOption {
        &self.options[key.index()]
    }

    pub fn string(&self, key: ConfigKey) -> &str {
        &self.options[key.index()].value
    }

    pub fn number(&self, key: ConfigKey) -> i32 {
        self.options[key.index()].number
    }

    pub fn device_name(&self) -> ConfigValue {
        self.options[ConfigKey::DeviceName.index()].value.clone()
    }

    /// Sampling period; negative values read as 0, which the sampler rejects.
    pub fn poll_rate_ms(&self) -> u32 {
        u32::try_from(self.number(ConfigKey::PollRate)).unwrap_or(0)
    }

    /// UTC offset in hours, clamped to the real-world range.
    pub fn time_zone(&self) -> i8 {
        self.number(ConfigKey::TimeZone).clamp(-12, 14) as i8
    }

    pub fn imu_profile(&self) -> u8 {
        self.number(ConfigKey::ImuProfile).clamp(0, i32::from(u8::MAX)) as u8
    }

    pub fn channel_window(&self) -> ChannelWindow {
        let channel = |key| self.number(key).clamp(0, i32::from(u8::MAX)) as u8;
        ChannelWindow::new(channel(ConfigKey::ChannelBottom), channel(ConfigKey::ChannelTop))
    }

    /// Apply one `key=value` line. Returns whether a key was set.
    ///
    /// Only leading whitespace and the line terminator are stripped; the
    /// value is kept exactly as written.
    fn apply_line(&mut self, line: &str) -> bool {
        let line = line.trim_start().trim_end_matches(['\r', '\n']);
        if line.is_empty() || line.starts_with('#') {
            return false;
        }

        let Some((name, value)) = line.split_once('=') else {
            warn!("{}: ignoring line without '=': {:?}", CONFIG_FILE, line);
            return false;
        };

        let Some(key) = ConfigKey::from_name(name) else {
            warn!("{}: unknown key {:?}", CONFIG_FILE, name);
            return false;
        };

        match self.set(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}: {}", CONFIG_FILE, e);
                false
            }
        }
    }
}

fn ensure_attached<V: Volume>(volume: &mut V) -> Result<(), ConfigError> {
    if volume.is_attached() {
        return Ok(());
    }
    volume
        .attach()
        .map_err(|e| ConfigError::Unavailable(error_detail(&e)))
}

fn write_defaults<V: Volume>(volume: &mut V, file: &mut V::File) -> Result<(), ConfigError> {
    for key in ConfigKey::ALL {
        let mut line = heapless::String::<64>::new();
        // Names and defaults are short enough to always fit.
        let _ = writeln!(line, "{}={}", key.name(), key.default_value());

        let written = volume
            .write(file, line.as_bytes())
            .map_err(|e| ConfigError::Io(error_detail(&e)))?;
        if written != line.len() {
            return Err(ConfigError::ShortWrite {
                expected: line.len(),
                written,
            });
        }
    }
    volume
        .flush(file)
        .map_err(|e| ConfigError::Io(error_detail(&e)))
}

/// Leading decimal integer of `value`, like C's `atoi`: `"250ms"` is 250,
/// `"abc"` is 0. Saturates instead of overflowing.
fn parse_number(value: &str) -> i32 {
    let value = value.trim_start();
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, b| (acc * 10 + i64::from(b - b'0')).min(i64::from(u32::MAX)));
    let signed = if negative { -magnitude } else { magnitude };
    signed.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// The configuration shared between the sampling interrupt and the main loop.
///
/// Access is a short critical section; never hold the closure across I/O.
pub struct SharedConfig {
    inner: Mutex<CriticalSectionRawMutex, RefCell<ConfigStore>>,
}

impl SharedConfig {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(store)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&ConfigStore) -> R) -> R {
        self.inner.lock(|cell| f(&cell.borrow()))
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ConfigStore) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(ConfigStore::new())
    }
}
