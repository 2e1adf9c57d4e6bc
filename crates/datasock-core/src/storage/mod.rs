//! Persistent storage: the volume seam, the CSV row codec and the
//! hour-bucketed log store.
//!
//! ## Layout on the medium
//!
//! All files live in the root directory of the volume:
//!
//! - `config.txt`: `key=value` configuration (see [`crate::config`])
//! - `<device>_<YYYY>-<MM>-<DD>_<HH>.csv`: one file per local hour of samples
//!
//! Volumes restricted to FAT 8.3 names (see [`SdCardVolume`]) store buckets as
//! `YYMMDDHH.CSV` instead; [`FileNaming`] picks the scheme from the volume.

mod bucket;
mod lines;
mod log_store;
mod memory;
mod row;
mod sd_card;

pub use bucket::{BucketId, BucketRange, FileName, FileNaming};
pub use lines::{LINE_CAPACITY, LineError, LineReader};
pub use log_store::{LogError, LogStats, LogStore};
pub use memory::{MemoryVolume, MemoryVolumeError};
pub use row::{FormattedRow, MIN_ROW_FIELDS, ROW_CAPACITY, RowError, format_row, parse_row};
pub use sd_card::{ClockTimeSource, SdCardVolume, SdVolumeError};

use core::fmt::{Debug, Write};

/// Short, allocation-free rendering of a medium error for logs and error enums.
pub type ErrorDetail = heapless::String<64>;

/// Render `err` with `Debug`, truncated to fit an [`ErrorDetail`].
pub fn error_detail<E: Debug>(err: &E) -> ErrorDetail {
    let mut detail = ErrorDetail::new();
    // Overflow just cuts the text short.
    let _ = write!(detail, "{:?}", err);
    detail
}

/// How a file is opened on a [`Volume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read from the start; the file must exist.
    Read,
    /// Write at the end, creating the file if needed.
    Append,
    /// Create the file, discarding any previous contents.
    Truncate,
}

/// A mounted filesystem on the storage medium.
///
/// The log store and the config store only need a flat root directory with
/// sequential reads and appends. Implementations must tolerate the medium
/// disappearing: any operation may fail, after which the caller detaches and
/// later calls [`Volume::attach`] again.
pub trait Volume {
    /// Handle to an open file.
    type File;
    type Error: Debug;

    /// Whether file names longer than FAT 8.3 can be created.
    const LONG_FILE_NAMES: bool = true;

    /// (Re)connect to the medium and mount it.
    fn attach(&mut self) -> Result<(), Self::Error>;

    fn is_attached(&self) -> bool;

    /// Forget the mount. Handles opened before are no longer valid.
    fn detach(&mut self);

    fn open(&mut self, name: &str, mode: OpenMode) -> Result<Self::File, Self::Error>;

    /// Read up to `buf.len()` bytes; `Ok(0)` means end of file.
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data`, returning how many bytes the medium accepted.
    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<usize, Self::Error>;

    /// Push buffered writes down to the medium.
    fn flush(&mut self, file: &mut Self::File) -> Result<(), Self::Error>;

    fn close(&mut self, file: Self::File) -> Result<(), Self::Error>;

    /// Call `visit` with the name of every regular file in the root directory.
    fn for_each_file(&mut self, visit: &mut dyn FnMut(&str)) -> Result<(), Self::Error>;

    /// Whether a regular file called `name` exists in the root directory.
    fn exists(&mut self, name: &str) -> Result<bool, Self::Error> {
        let mut found = false;
        self.for_each_file(&mut |entry| found |= entry == name)?;
        Ok(found)
    }
}
