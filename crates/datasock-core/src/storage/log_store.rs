//! Hour-bucketed CSV log on a [`Volume`].
//!
//! Rows are appended to the bucket file of the hour their sample was taken
//! in, and every append is flushed before it is reported as done. Only one
//! bucket is open for writing at a time; once the log has moved on to a
//! newer hour, older buckets are never written again, even if the clock is
//! set back.
//!
//! Reading back ([`LogStore::next_sample`]) keeps its own handle. Some
//! filesystems refuse to open a file twice, so the store never holds two
//! handles on the same file: the reader is parked (closed, position kept)
//! while the writer needs its file, and the writer is closed while the reader
//! needs its file.

use alloc::vec::Vec;

use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::clock::Clock;
use crate::config::{ConfigStore, SharedConfig};
use crate::sampling::{Consumer, Sample};

use super::{
    BucketId, BucketRange, ErrorDetail, FileName, FileNaming, LineError, LineReader, OpenMode,
    ROW_CAPACITY, RowError, Volume, error_detail, format_row, parse_row,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("storage medium unavailable: {0}")]
    Unavailable(ErrorDetail),
    #[error("storage I/O failed: {0}")]
    Io(ErrorDetail),
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },
    #[error("device name does not fit in a file name")]
    FileName,
    #[error("no bucket file {0}")]
    MissingBucket(FileName),
    #[error("malformed row: {0}")]
    Malformed(RowError),
    #[error("unreadable line: {0}")]
    Line(LineError),
}

impl LogError {
    /// Whether the same append may succeed on a later call.
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}

/// Counters for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    pub rows_written: u32,
    pub append_failures: u32,
    /// Moves from one bucket file to the next
    pub rotations: u32,
    /// Successful attaches of the medium
    pub attaches: u32,
}

struct OpenBucket<F> {
    name: FileName,
    file: F,
}

struct BucketReader<F> {
    name: FileName,
    lines: LineReader<F>,
}

/// The log store: owns the volume and the open bucket handles.
pub struct LogStore<'a, V: Volume, C> {
    volume: V,
    clock: C,
    config: &'a SharedConfig,
    naming: FileNaming,
    writer: Option<OpenBucket<V::File>>,
    reader: Option<BucketReader<V::File>>,
    /// Position of a reader closed to make way for the writer or a reattach
    parked: Option<(FileName, u64)>,
    /// Newest bucket written; buckets before it are closed for good
    newest: Option<BucketId>,
    /// Sample popped from the ring but not yet on the medium
    pending: Option<Sample>,
    stats: LogStats,
}

impl<'a, V, C> LogStore<'a, V, C>
where
    V: Volume,
    C: Clock,
{
    pub fn new(volume: V, clock: C, config: &'a SharedConfig) -> Self {
        Self {
            volume,
            clock,
            config,
            naming: FileNaming::for_volume::<V>(),
            writer: None,
            reader: None,
            parked: None,
            newest: None,
            pending: None,
            stats: LogStats::default(),
        }
    }

    pub fn stats(&self) -> LogStats {
        self.stats
    }

    pub fn volume(&self) -> &V {
        &self.volume
    }

    /// Direct access to the volume, for tests and tooling.
    ///
    /// Close the store's files first with [`LogStore::close_files`].
    pub fn volume_mut(&mut self) -> &mut V {
        &mut self.volume
    }

    /// Close the store's files and hand the volume back.
    pub fn into_volume(mut self) -> V {
        self.close_files();
        self.volume
    }

    /// Name of the bucket file currently open for writing.
    pub fn current_file(&self) -> Option<&str> {
        self.writer.as_ref().map(|open| open.name.as_str())
    }

    /// Whether a sample is waiting to be retried.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Append one row, bucketed by the clock's current local time.
    pub fn append(&mut self, row: &[u8]) -> Result<(), LogError> {
        let now = self.clock.now_local_epoch();
        self.append_at(row, now)
    }

    /// Append one row to the bucket holding `local_epoch`.
    ///
    /// Makes one attempt to attach the medium if it is not attached. The row
    /// is flushed before returning; a write the medium only partly accepted
    /// is an error.
    pub fn append_at(&mut self, row: &[u8], local_epoch: u32) -> Result<(), LogError> {
        let result = self.try_append(row, local_epoch);
        match &result {
            Ok(()) => self.stats.rows_written = self.stats.rows_written.wrapping_add(1),
            Err(_) => self.stats.append_failures = self.stats.append_failures.wrapping_add(1),
        }
        result
    }

    fn try_append(&mut self, row: &[u8], local_epoch: u32) -> Result<(), LogError> {
        self.ensure_attached()?;

        let mut bucket = BucketId::from_local_epoch(local_epoch);
        if let Some(newest) = self.newest
            && bucket < newest
        {
            warn!("Clock is behind the open bucket; staying in it");
            bucket = newest;
        }

        let device = self.config.read(ConfigStore::device_name);
        let name = self
            .naming
            .file_name(&device, &bucket)
            .map_err(|_| LogError::FileName)?;

        let mut writer = match self.writer.take() {
            Some(open) if open.name == name => open,
            previous => self.rotate(previous, bucket, name)?,
        };

        let written = self
            .volume
            .write(&mut writer.file, row)
            .and_then(|written| self.volume.flush(&mut writer.file).map(|()| written));

        match written {
            Err(e) => {
                let _ = self.volume.close(writer.file);
                Err(self.fail_medium(error_detail(&e)))
            }
            Ok(written) if written != row.len() => {
                warn!("{}: short write, {} of {} bytes", writer.name, written, row.len());
                self.writer = Some(writer);
                Err(LogError::ShortWrite {
                    expected: row.len(),
                    written,
                })
            }
            Ok(_) => {
                debug!("{}: +{} bytes", writer.name, row.len());
                self.writer = Some(writer);
                Ok(())
            }
        }
    }

    /// Close `previous` and open the file for `bucket` for appending.
    fn rotate(
        &mut self,
        previous: Option<OpenBucket<V::File>>,
        bucket: BucketId,
        name: FileName,
    ) -> Result<OpenBucket<V::File>, LogError> {
        if let Some(previous) = previous {
            info!("Closing {}", previous.name);
            if let Err(e) = self.volume.close(previous.file) {
                warn!("Failed to close {}: {:?}", previous.name, e);
            }
            self.stats.rotations = self.stats.rotations.wrapping_add(1);
        }

        if self.reader.as_ref().is_some_and(|reader| reader.name == name) {
            self.park_reader();
        }

        let file = match self.volume.open(&name, OpenMode::Append) {
            Ok(file) => file,
            Err(e) => return Err(self.fail_medium(error_detail(&e))),
        };

        info!("Logging to {}", name);
        self.newest = Some(self.newest.map_or(bucket, |newest| newest.max(bucket)));
        Ok(OpenBucket { name, file })
    }

    /// Drain one sample from the ring onto the medium.
    ///
    /// Returns `Ok(false)` when there was nothing to do. A sample whose
    /// append fails because the medium is unavailable stays pending and is
    /// retried first on the next call.
    pub fn service(&mut self, consumer: &mut Consumer<'_, Sample>) -> Result<bool, LogError> {
        let Some(sample) = self.pending.take().or_else(|| consumer.try_pop()) else {
            return Ok(false);
        };

        let channel_count = self.config.read(|config| config.channel_window().count());
        let mut buf = [0u8; ROW_CAPACITY];
        let row = format_row(&sample, channel_count, &mut buf);
        if row.truncated {
            warn!("Row cut to {} bytes", row.len);
            buf[row.len - 2..row.len].copy_from_slice(b"\r\n");
        }

        match self.append_at(&buf[..row.len], sample.epoch_seconds) {
            Ok(()) => Ok(true),
            Err(e) => {
                if e.is_retryable() {
                    self.pending = Some(sample);
                }
                Err(e)
            }
        }
    }

    /// UTC start times of this device's buckets that overlap `range`,
    /// oldest first.
    pub fn list_buckets(&mut self, range: BucketRange) -> Result<Vec<u32>, LogError> {
        self.ensure_attached()?;

        let device = self.config.read(ConfigStore::device_name);
        let naming = self.naming;
        let clock = &self.clock;
        let mut buckets = Vec::new();

        let listed = {
            let mut visit = |name: &str| {
                let Some(bucket) = naming.parse(&device, name) else {
                    return;
                };
                match clock.local_human_to_utc(bucket.civil()) {
                    Some(utc) if range.admits(utc) => buckets.push(utc),
                    Some(_) => {}
                    None => debug!("{}: outside the representable range", name),
                }
            };
            self.volume.for_each_file(&mut visit)
        };
        if let Err(e) = listed {
            return Err(self.fail_medium(error_detail(&e)));
        }

        buckets.sort_unstable();
        buckets.dedup();
        Ok(buckets)
    }

    /// Read the next sample of the bucket starting at `bucket_utc`.
    ///
    /// The bucket file stays open between calls; asking for another bucket
    /// switches to it. `Ok(None)` is the end of the bucket. Since the end is
    /// not sticky, rows appended later are returned by later calls. A
    /// malformed row is returned as an error and skipped, so the next call
    /// continues after it.
    pub fn next_sample(&mut self, bucket_utc: u32) -> Result<Option<Sample>, LogError> {
        self.ensure_attached()?;

        let device = self.config.read(ConfigStore::device_name);
        let bucket = BucketId::from_local_epoch(self.clock.utc_to_local_epoch(bucket_utc));
        let name = self
            .naming
            .file_name(&device, &bucket)
            .map_err(|_| LogError::FileName)?;

        if self.reader.as_ref().is_none_or(|reader| reader.name != name) {
            self.open_reader(name)?;
        }

        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };

            match reader.lines.next_line(&mut self.volume) {
                Ok(Some("")) => continue,
                Ok(Some(line)) => {
                    return parse_row(line).map(Some).map_err(|e| {
                        warn!("{}: skipping row: {}", reader.name, e);
                        LogError::Malformed(e)
                    });
                }
                Ok(None) => return Ok(None),
                Err(LineError::Io(detail)) => return Err(self.fail_medium(detail)),
                Err(e) => {
                    warn!("{}: skipping line: {}", reader.name, e);
                    return Err(LogError::Line(e));
                }
            }
        }
    }

    fn open_reader(&mut self, name: FileName) -> Result<(), LogError> {
        if let Some(reader) = self.reader.take() {
            let _ = self.volume.close(reader.lines.into_file());
        }

        let offset = match self.parked.take() {
            Some((parked, offset)) if parked == name => offset,
            _ => 0,
        };

        match self.volume.exists(&name) {
            Ok(true) => {}
            Ok(false) => return Err(LogError::MissingBucket(name)),
            Err(e) => return Err(self.fail_medium(error_detail(&e))),
        }

        if let Some(writer) = self.writer.take_if(|writer| writer.name == name) {
            // Reopened by the next append
            let _ = self.volume.close(writer.file);
        }

        let file = match self.volume.open(&name, OpenMode::Read) {
            Ok(file) => file,
            Err(e) => return Err(self.fail_medium(error_detail(&e))),
        };

        debug!("Reading {} from offset {}", name, offset);
        self.reader = Some(BucketReader {
            name,
            lines: LineReader::resume(file, offset),
        });
        Ok(())
    }

    /// Close the reader, remembering where it was.
    fn park_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.parked = Some((reader.name, reader.lines.consumed()));
            let _ = self.volume.close(reader.lines.into_file());
        }
    }

    /// Close every open file. Reading resumes where it left off.
    pub fn close_files(&mut self) {
        if let Some(writer) = self.writer.take()
            && let Err(e) = self.volume.close(writer.file)
        {
            warn!("Failed to close {}: {:?}", writer.name, e);
        }
        self.park_reader();
    }

    fn ensure_attached(&mut self) -> Result<(), LogError> {
        if self.volume.is_attached() {
            return Ok(());
        }

        // Handles from before the medium went away are stale.
        self.writer = None;
        if let Some(reader) = self.reader.take() {
            self.parked = Some((reader.name, reader.lines.consumed()));
        }

        match self.volume.attach() {
            Ok(()) => {
                info!("Storage medium attached");
                self.stats.attaches = self.stats.attaches.wrapping_add(1);
                Ok(())
            }
            Err(e) => {
                let detail = error_detail(&e);
                warn!("Storage medium unavailable: {}", detail);
                Err(LogError::Unavailable(detail))
            }
        }
    }

    /// Give up on the medium after an I/O error; the next call reattaches.
    fn fail_medium(&mut self, detail: ErrorDetail) -> LogError {
        error!("Storage failure: {}", detail);
        self.close_files();
        self.volume.detach();
        LogError::Io(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SECONDS_PER_HOUR};
    use crate::config::ConfigKey;
    use crate::sampling::SampleRing;
    use crate::storage::MemoryVolume;
    use alloc::string::String;

    const ROW_A: &[u8] = b"100.000,0.00,0.00,0.00,0.00,0.00,0.00,20.00,1\r\n";
    const ROW_B: &[u8] = b"200.500,0.00,0.00,0.00,0.00,0.00,0.00,21.00,2\r\n";

    fn contents(store: &LogStore<'_, MemoryVolume, &ManualClock>, name: &str) -> String {
        let bytes = store.volume().contents(name).unwrap_or_default();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// A RAM volume limited to FAT 8.3 names, like the SD card.
    struct ShortNameVolume(MemoryVolume);

    impl Volume for ShortNameVolume {
        type File = <MemoryVolume as Volume>::File;
        type Error = <MemoryVolume as Volume>::Error;

        const LONG_FILE_NAMES: bool = false;

        fn attach(&mut self) -> Result<(), Self::Error> {
            self.0.attach()
        }

        fn is_attached(&self) -> bool {
            self.0.is_attached()
        }

        fn detach(&mut self) {
            self.0.detach()
        }

        fn open(&mut self, name: &str, mode: OpenMode) -> Result<Self::File, Self::Error> {
            self.0.open(name, mode)
        }

        fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error> {
            self.0.read(file, buf)
        }

        fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<usize, Self::Error> {
            self.0.write(file, data)
        }

        fn flush(&mut self, file: &mut Self::File) -> Result<(), Self::Error> {
            self.0.flush(file)
        }

        fn close(&mut self, file: Self::File) -> Result<(), Self::Error> {
            self.0.close(file)
        }

        fn for_each_file(&mut self, visit: &mut dyn FnMut(&str)) -> Result<(), Self::Error> {
            self.0.for_each_file(visit)
        }
    }

    #[test]
    fn test_short_name_volume_drops_device_prefix() {
        let config = SharedConfig::default();
        // 2024-03-07 13:00:00
        let one_pm = 1_709_816_400;
        let clock = ManualClock::new(one_pm, 0);
        let mut volume = MemoryVolume::new();
        // Written by another device; the 8.3 name cannot tell
        volume.insert("24030709.CSV", ROW_A);
        let mut store = LogStore::new(ShortNameVolume(volume), &clock, &config);

        store.append(ROW_B).unwrap();
        assert_eq!(store.current_file(), Some("24030713.CSV"));
        assert_eq!(store.volume().0.contents("24030713.CSV"), Some(ROW_B));
        assert_eq!(
            store.list_buckets(BucketRange::All).unwrap(),
            [one_pm - 4 * SECONDS_PER_HOUR, one_pm]
        );
    }

    #[test]
    fn test_append_creates_hour_bucket() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(100, 0);
        let mut store = LogStore::new(MemoryVolume::new(), &clock, &config);

        store.append(ROW_A).unwrap();
        assert_eq!(store.current_file(), Some("DataSock_1970-01-01_00.csv"));
        // Flushed as soon as append returns
        assert_eq!(contents(&store, "DataSock_1970-01-01_00.csv").as_bytes(), ROW_A);
        assert_eq!(store.stats().rows_written, 1);
        assert_eq!(store.stats().attaches, 1);
    }

    #[test]
    fn test_rotates_at_hour_boundary() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(0, 0);
        let mut store = LogStore::new(MemoryVolume::new(), &clock, &config);

        store.append_at(ROW_A, SECONDS_PER_HOUR - 1).unwrap();
        store.append_at(ROW_B, SECONDS_PER_HOUR).unwrap();

        assert_eq!(contents(&store, "DataSock_1970-01-01_00.csv").as_bytes(), ROW_A);
        assert_eq!(contents(&store, "DataSock_1970-01-01_01.csv").as_bytes(), ROW_B);
        assert_eq!(store.stats().rotations, 1);
    }

    #[test]
    fn test_never_reopens_older_bucket() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(0, 0);
        let mut store = LogStore::new(MemoryVolume::new(), &clock, &config);

        store.append_at(ROW_A, 2 * SECONDS_PER_HOUR).unwrap();
        store.append_at(ROW_B, 10).unwrap();

        assert!(store.volume().contents("DataSock_1970-01-01_00.csv").is_none());
        let newest = contents(&store, "DataSock_1970-01-01_02.csv");
        assert_eq!(newest.lines().count(), 2);
    }

    #[test]
    fn test_device_rename_rotates() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(0, 0);
        let mut store = LogStore::new(MemoryVolume::new(), &clock, &config);

        store.append_at(ROW_A, 5).unwrap();
        config.update(|c| c.set(ConfigKey::DeviceName, "Buoy")).unwrap();
        store.append_at(ROW_B, 6).unwrap();

        assert_eq!(store.current_file(), Some("Buoy_1970-01-01_00.csv"));
        assert_eq!(store.stats().rotations, 1);
    }

    #[test]
    fn test_unavailable_medium_then_recovery() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(0, 0);
        let mut volume = MemoryVolume::new();
        volume.set_removed(true);
        let mut store = LogStore::new(volume, &clock, &config);

        assert!(matches!(store.append(ROW_A), Err(LogError::Unavailable(_))));
        assert_eq!(store.stats().append_failures, 1);

        store.volume_mut().set_removed(false);
        store.append(ROW_A).unwrap();
        assert_eq!(store.stats().rows_written, 1);
    }

    #[test]
    fn test_io_error_detaches_and_reattaches() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(0, 0);
        let mut store = LogStore::new(MemoryVolume::new(), &clock, &config);
        store.append(ROW_A).unwrap();

        // Pulled and reinserted between two appends: the open handle is stale
        store.volume_mut().set_removed(true);
        store.volume_mut().set_removed(false);
        store.volume_mut().attach().unwrap();

        assert!(matches!(store.append(ROW_B), Err(LogError::Io(_))));
        assert!(!store.volume().is_attached());

        store.append(ROW_B).unwrap();
        let rows = contents(&store, "DataSock_1970-01-01_00.csv");
        assert_eq!(rows.lines().count(), 2);
        assert_eq!(store.stats().attaches, 2);
    }

    #[test]
    fn test_short_write_is_reported() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(0, 0);
        let mut volume = MemoryVolume::new();
        volume.set_capacity(Some(10));
        let mut store = LogStore::new(volume, &clock, &config);

        assert_eq!(
            store.append(ROW_A),
            Err(LogError::ShortWrite {
                expected: ROW_A.len(),
                written: 10
            })
        );
    }

    #[test]
    fn test_list_buckets_filters_and_sorts() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(0, -8);
        let mut volume = MemoryVolume::new();
        volume.insert("DataSock_1970-01-01_02.csv", ROW_A);
        volume.insert("DataSock_1970-01-01_00.csv", ROW_A);
        volume.insert("Other_1970-01-01_01.csv", ROW_A);
        volume.insert("config.txt", b"poll_rate=10\n");
        let mut store = LogStore::new(volume, &clock, &config);

        // Local midnight at UTC-8 is 08:00 UTC
        let base = 8 * SECONDS_PER_HOUR;
        assert_eq!(
            store.list_buckets(BucketRange::All).unwrap(),
            [base, base + 2 * SECONDS_PER_HOUR]
        );
        assert_eq!(
            store
                .list_buckets(BucketRange::Between {
                    start: base + SECONDS_PER_HOUR,
                    end: base + 3 * SECONDS_PER_HOUR,
                })
                .unwrap(),
            [base + 2 * SECONDS_PER_HOUR]
        );
    }

    #[test]
    fn test_list_buckets_skips_hour_started_before_range() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(0, 0);
        let mut volume = MemoryVolume::new();
        volume.insert("DataSock_1970-01-01_01.csv", ROW_A);
        let mut store = LogStore::new(volume, &clock, &config);

        // 01:00 starts at 3600, before the range, though its hour runs into it
        assert!(
            store
                .list_buckets(BucketRange::from_query(5400, 9000))
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            store.list_buckets(BucketRange::from_query(3600, 3600)).unwrap(),
            [3600]
        );
    }

    #[test]
    fn test_next_sample_reads_bucket() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(0, 0);
        let mut volume = MemoryVolume::new();
        let mut rows = ROW_A.to_vec();
        rows.extend_from_slice(b"garbage\r\n\r\n");
        rows.extend_from_slice(ROW_B);
        volume.insert("DataSock_1970-01-01_00.csv", &rows);
        let mut store = LogStore::new(volume, &clock, &config);

        let first = store.next_sample(0).unwrap().unwrap();
        assert_eq!((first.epoch_seconds, first.millis), (100, 0));
        assert_eq!(
            store.next_sample(0),
            Err(LogError::Malformed(RowError::TooFewFields(1)))
        );
        let second = store.next_sample(0).unwrap().unwrap();
        assert_eq!((second.epoch_seconds, second.millis), (200, 500));
        assert_eq!(second.channels.as_slice(), &[2]);
        assert_eq!(store.next_sample(0), Ok(None));
    }

    #[test]
    fn test_next_sample_missing_bucket() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(0, 0);
        let mut store = LogStore::new(MemoryVolume::new(), &clock, &config);

        assert!(matches!(
            store.next_sample(SECONDS_PER_HOUR),
            Err(LogError::MissingBucket(_))
        ));
        // Not a medium failure
        assert!(store.volume().is_attached());
    }

    #[test]
    fn test_reading_the_bucket_being_written() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(0, 0);
        let mut store = LogStore::new(MemoryVolume::new(), &clock, &config);

        store.append_at(ROW_A, 100).unwrap();
        assert_eq!(store.next_sample(0).unwrap().unwrap().epoch_seconds, 100);
        assert_eq!(store.next_sample(0), Ok(None));

        store.append_at(ROW_B, 200).unwrap();
        assert_eq!(store.next_sample(0).unwrap().unwrap().epoch_seconds, 200);
        assert_eq!(store.next_sample(0), Ok(None));
        assert_eq!(store.stats().rows_written, 2);
    }

    #[test]
    fn test_service_retries_pending_sample() {
        let config = SharedConfig::default();
        let clock = ManualClock::new(0, 0);
        let mut ring = SampleRing::<4>::new();
        let (mut producer, mut consumer) = ring.split();
        let mut store = LogStore::new(MemoryVolume::new(), &clock, &config);

        assert_eq!(store.service(&mut consumer), Ok(false));

        producer.try_push(Sample {
            epoch_seconds: 42,
            ..Sample::default()
        });
        store.volume_mut().set_removed(true);
        assert!(store.service(&mut consumer).is_err());
        assert!(store.has_pending());
        assert!(consumer.is_empty());

        store.volume_mut().set_removed(false);
        assert_eq!(store.service(&mut consumer), Ok(true));
        assert!(!store.has_pending());

        let rows = contents(&store, "DataSock_1970-01-01_00.csv");
        assert!(rows.starts_with("42.000,"));
    }
}
