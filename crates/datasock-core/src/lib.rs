//! Hardware-independent core library for the DataSock telemetry logger
//!
//! This crate contains the platform-agnostic part of the logger: the
//! configuration store, the interrupt-driven sampler and its SPSC ring
//! buffer, the CSV row codec, and the hour-bucketed log store that persists
//! rows to a block-storage volume and plays them back for queries.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).
//! Hardware (sensors, RTC, sample timer, SD card) is reached through the
//! traits in [`sensors`], [`clock`], [`sampling`] and [`storage`].

#![no_std]

extern crate alloc;

pub mod clock;
pub mod config;
pub mod sampling;
pub mod sensors;
pub mod storage;

pub use clock::{CivilTime, Clock, ManualClock};
pub use config::{ConfigKey, ConfigStore, SharedConfig};
pub use sampling::{Sample, SampleRing, Sampler, SamplerState};
pub use storage::{BucketRange, LogError, LogStore, Volume};
