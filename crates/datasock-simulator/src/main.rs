//! Desktop simulator for the DataSock telemetry logger.
//!
//! Runs the datasock-core pipeline (sampler, ring buffer, hour-bucketed log
//! store) against a host directory standing in for the SD card, with
//! synthetic sensors so the logger can be exercised without hardware.
//!
//! # Subcommands
//!
//! | Command       | Action                                              |
//! |---------------|-----------------------------------------------------|
//! | `run`         | Sample for a while, writing hour-bucket CSV files   |
//! | `list`        | List hour buckets, optionally within a UTC range    |
//! | `dump`        | Print every sample of one bucket                    |
//! | `init-config` | Write `config.txt` with every key at its default    |
//!
//! Set `RUST_LOG=debug` to see every row as it is written.

mod host_clock;
mod host_volume;
mod synthetic;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use log::{info, warn};

use datasock_core::clock::{CivilTime, Clock, ManualClock};
use datasock_core::config::{CONFIG_FILE, ConfigStore, SharedConfig};
use datasock_core::sampling::{
    Consumer, Push, RING_SLOTS, Sample, SampleRing, Sampler, SamplerError,
};
use datasock_core::storage::{
    BucketRange, LogError, LogStats, LogStore, MemoryVolume, ROW_CAPACITY, Volume, format_row,
};

use host_clock::HostClock;
use host_volume::HostDirVolume;
use synthetic::{SimTimer, SyntheticSensors};

/// How often the main loop drains the ring in real-time runs.
const SERVICE_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Parser)]
#[command(name = "datasock-simulator", version, about = "DataSock logger simulator")]
struct Cli {
    /// Directory standing in for the SD card
    #[arg(long, global = true, default_value = "sd")]
    dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample synthetic sensors into hour-bucket files
    Run {
        /// How long to sample for
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        /// Replay on a scripted clock starting at this local epoch, as fast as possible
        #[arg(long)]
        start_epoch: Option<u32>,
        /// Log into memory and print the resulting files instead of writing them
        #[arg(long)]
        in_memory: bool,
    },
    /// List hour buckets starting within a UTC epoch range (0 means unbounded)
    List {
        #[arg(long, default_value_t = 0)]
        start: u32,
        #[arg(long, default_value_t = 0)]
        end: u32,
    },
    /// Print every sample of the bucket starting at a UTC epoch
    Dump { bucket: u32 },
    /// Write config.txt with every key at its default
    InitConfig {
        /// Overwrite an existing config.txt
        #[arg(long)]
        force: bool,
    },
}

struct RunOptions {
    seconds: u64,
    start_epoch: Option<u32>,
}

fn main() -> Result<()> {
    env_logger::init();

    let Cli { dir, command } = Cli::parse();
    match command {
        Commands::Run {
            seconds,
            start_epoch,
            in_memory,
        } => {
            let options = RunOptions {
                seconds,
                start_epoch,
            };
            if in_memory {
                run_in_memory(&dir, &options)
            } else {
                fs::create_dir_all(&dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
                run(HostDirVolume::new(&dir), &options).map(drop)
            }
        }
        Commands::List { start, end } => list(&dir, BucketRange::from_query(start, end)),
        Commands::Dump { bucket } => dump(&dir, bucket),
        Commands::InitConfig { force } => init_config(&dir, force),
    }
}

/// Load `config.txt`, falling back to defaults when it is missing or unusable.
fn load_config<V: Volume>(volume: &mut V) -> SharedConfig {
    let mut store = ConfigStore::new();
    store.load_or_defaults(volume);
    info!(
        "Device {} polling every {} ms, channels {:?}, UTC{:+}",
        store.device_name(),
        store.poll_rate_ms(),
        store.channel_window(),
        store.time_zone()
    );
    SharedConfig::new(store)
}

fn run_in_memory(dir: &Path, options: &RunOptions) -> Result<()> {
    let mut volume = MemoryVolume::new();
    // Start from the card's config if there is one
    if let Ok(contents) = fs::read(dir.join(CONFIG_FILE)) {
        volume.insert(CONFIG_FILE, &contents);
    }

    let volume = run(volume, options)?;
    for name in volume.file_names() {
        let rows = volume
            .contents(name)
            .map_or(0, |contents| contents.iter().filter(|&&b| b == b'\n').count());
        println!("{name}\t{rows} lines");
    }
    Ok(())
}

/// Sample for the requested time and hand the volume back.
fn run<V: Volume>(mut volume: V, options: &RunOptions) -> Result<V> {
    let config = load_config(&mut volume);
    let utc_offset = config.read(ConfigStore::time_zone);
    let mut ring = SampleRing::<RING_SLOTS>::new();
    let (producer, mut consumer) = ring.split();

    let (volume, stats) = match options.start_epoch {
        Some(start) => {
            let clock = ManualClock::new(start, utc_offset);
            let mut sampler = Sampler::new(
                SimTimer,
                SyntheticSensors::new(step_secs(&config)),
                &clock,
                &config,
                producer,
            );
            let mut store = LogStore::new(volume, &clock, &config);

            sampler.start().map_err(|e| anyhow!("{e}"))?;
            let mut elapsed_ms = 0u64;
            while elapsed_ms < options.seconds * 1000 {
                let Some(period_ms) = sampler.armed_period() else {
                    bail!("sampler stopped");
                };
                sampler.on_timer();
                drain(&mut store, &mut consumer);
                clock.advance_millis(period_ms);
                elapsed_ms += u64::from(period_ms);
            }
            sampler.stop();
            drain(&mut store, &mut consumer);

            let stats = store.stats();
            (store.into_volume(), stats)
        }
        None => {
            let clock = HostClock::new(utc_offset);
            let mut store = LogStore::new(volume, &clock, &config);
            let stop = AtomicBool::new(false);
            let deadline = Instant::now() + Duration::from_secs(options.seconds);

            thread::scope(|scope| -> Result<()> {
                let stop = &stop;
                let sensors = SyntheticSensors::new(step_secs(&config));
                let mut sampler = Sampler::new(SimTimer, sensors, &clock, &config, producer);

                // Stands in for the timer interrupt
                let sampling = scope.spawn(move || -> Result<(), SamplerError> {
                    sampler.start()?;
                    let mut next_fire = Instant::now();
                    while !stop.load(Ordering::Relaxed) {
                        let Some(period_ms) = sampler.armed_period() else {
                            break;
                        };
                        next_fire += Duration::from_millis(period_ms.into());
                        if let Some(wait) = next_fire.checked_duration_since(Instant::now()) {
                            thread::sleep(wait);
                        }
                        if sampler.on_timer() != Push::Stored {
                            warn!("Sample ring full");
                        }
                    }
                    sampler.stop();
                    Ok(())
                });

                while Instant::now() < deadline && !sampling.is_finished() {
                    drain(&mut store, &mut consumer);
                    thread::sleep(SERVICE_INTERVAL);
                }
                stop.store(true, Ordering::Relaxed);
                let sampled = sampling
                    .join()
                    .map_err(|_| anyhow!("sampler thread panicked"))?;
                drain(&mut store, &mut consumer);
                sampled.map_err(|e| anyhow!("{e}"))
            })?;

            let stats = store.stats();
            (store.into_volume(), stats)
        }
    };

    report(&stats, consumer.overruns());
    Ok(volume)
}

fn step_secs(config: &SharedConfig) -> f64 {
    f64::from(config.read(ConfigStore::poll_rate_ms)) / 1000.0
}

/// Write out everything queued. Stops at the first failure; a sample that
/// could not be written stays pending in the store for the next pass.
fn drain<V: Volume, C: Clock>(
    store: &mut LogStore<'_, V, C>,
    consumer: &mut Consumer<'_, Sample>,
) {
    loop {
        match store.service(consumer) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                warn!("Log write failed: {}", e);
                break;
            }
        }
    }
}

fn report(stats: &LogStats, overruns: u32) {
    println!(
        "rows written: {}, append failures: {}, rotations: {}, attaches: {}, overruns: {}",
        stats.rows_written, stats.append_failures, stats.rotations, stats.attaches, overruns
    );
}

fn list(dir: &Path, range: BucketRange) -> Result<()> {
    let mut volume = HostDirVolume::new(dir);
    let config = load_config(&mut volume);
    let clock = HostClock::new(config.read(ConfigStore::time_zone));
    let mut store = LogStore::new(volume, &clock, &config);

    let buckets = store.list_buckets(range).map_err(|e| anyhow!("{e}"))?;
    for utc in buckets {
        let local = CivilTime::from_epoch(clock.utc_to_local_epoch(utc))
            .with_offset(clock.utc_offset_hours());
        println!("{utc}\t{local}");
    }
    Ok(())
}

fn dump(dir: &Path, bucket: u32) -> Result<()> {
    let mut volume = HostDirVolume::new(dir);
    let config = load_config(&mut volume);
    let clock = HostClock::new(config.read(ConfigStore::time_zone));
    let mut store = LogStore::new(volume, &clock, &config);

    let mut buf = [0u8; ROW_CAPACITY];
    let mut skipped = 0;
    loop {
        let sample = match store.next_sample(bucket) {
            Ok(Some(sample)) => sample,
            Ok(None) => break,
            Err(e @ LogError::MissingBucket(_)) => bail!("{e}"),
            // The store has already skipped past the bad line
            Err(e @ (LogError::Malformed(_) | LogError::Line(_))) => {
                warn!("{}", e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(anyhow!("{e}")),
        };
        let row = format_row(&sample, sample.channels.len(), &mut buf);
        let text = std::str::from_utf8(&buf[..row.len]).context("formatted row")?;
        println!("{}", text.trim_end());
    }
    if skipped > 0 {
        warn!("{} unreadable rows skipped", skipped);
    }
    Ok(())
}

fn init_config(dir: &Path, force: bool) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut volume = HostDirVolume::new(dir);
    volume
        .attach()
        .with_context(|| format!("attaching {}", dir.display()))?;

    if !force && volume.exists(CONFIG_FILE)? {
        bail!("{CONFIG_FILE} already exists in {}; pass --force to overwrite", dir.display());
    }
    ConfigStore::create(&mut volume).map_err(|e| anyhow!("{e}"))?;
    println!("wrote {}", dir.join(CONFIG_FILE).display());
    Ok(())
}
