//! Hour buckets and the file names that carry them.

use core::fmt::Write;
use core::str::FromStr;

use crate::clock::CivilTime;

use super::Volume;

/// Bucket file name; long enough for a 32-byte device name plus the date.
pub type FileName = heapless::String<64>;

/// One local-time hour of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketId {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
}

impl BucketId {
    /// The bucket a local epoch timestamp falls into.
    pub fn from_local_epoch(epoch: u32) -> Self {
        let civil = CivilTime::from_epoch(epoch);
        Self {
            year: civil.year,
            month: civil.month,
            day: civil.day,
            hour: civil.hour,
        }
    }

    /// Local calendar time of the first second in the bucket.
    pub const fn civil(&self) -> CivilTime {
        CivilTime::new(self.year, self.month, self.day, self.hour, 0, 0)
    }

    fn is_valid(&self) -> bool {
        self.civil().to_epoch().is_some()
    }
}

/// How bucket files are named on a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileNaming {
    /// `<device>_<YYYY>-<MM>-<DD>_<HH>.csv`
    Long,
    /// `YYMMDDHH.CSV`, for FAT volumes without long file name support.
    ///
    /// The device name is not part of the file name, so every bucket on the
    /// volume is treated as belonging to this device.
    Short,
}

impl FileNaming {
    pub const fn for_volume<V: Volume>() -> Self {
        if V::LONG_FILE_NAMES {
            Self::Long
        } else {
            Self::Short
        }
    }

    /// File name for `bucket`. Fails only if the device name is too long.
    pub fn file_name(&self, device: &str, bucket: &BucketId) -> Result<FileName, core::fmt::Error> {
        let mut name = FileName::new();
        match self {
            Self::Long => write!(
                name,
                "{}_{:04}-{:02}-{:02}_{:02}.csv",
                device, bucket.year, bucket.month, bucket.day, bucket.hour
            )?,
            Self::Short => write!(
                name,
                "{:02}{:02}{:02}{:02}.CSV",
                bucket.year % 100,
                bucket.month,
                bucket.day,
                bucket.hour
            )?,
        }
        Ok(name)
    }

    /// Recover the bucket from a directory entry, or `None` if the entry is
    /// not a bucket file of `device`.
    pub fn parse(&self, device: &str, name: &str) -> Option<BucketId> {
        let bucket = match self {
            Self::Long => {
                let stamp = name
                    .strip_prefix(device)?
                    .strip_prefix('_')?
                    .strip_suffix(".csv")?;
                // YYYY-MM-DD_HH
                let bytes = stamp.as_bytes();
                if bytes.len() != 13 || bytes[4] != b'-' || bytes[7] != b'-' || bytes[10] != b'_' {
                    return None;
                }
                BucketId {
                    year: digits(&stamp[0..4])?,
                    month: digits(&stamp[5..7])?,
                    day: digits(&stamp[8..10])?,
                    hour: digits(&stamp[11..13])?,
                }
            }
            Self::Short => {
                if name.len() != 12 || !name.is_char_boundary(8) {
                    return None;
                }
                let (stamp, extension) = name.split_at(8);
                if !extension.eq_ignore_ascii_case(".csv") {
                    return None;
                }
                BucketId {
                    year: 2000 + digits::<u16>(&stamp[0..2])?,
                    month: digits(&stamp[2..4])?,
                    day: digits(&stamp[4..6])?,
                    hour: digits(&stamp[6..8])?,
                }
            }
        };

        bucket.is_valid().then_some(bucket)
    }
}

/// Parse a field made only of ASCII digits.
fn digits<T: FromStr>(field: &str) -> Option<T> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// Time window for bucket listing, in UTC epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketRange {
    All,
    /// Inclusive on both ends
    Between { start: u32, end: u32 },
}

impl BucketRange {
    /// Build a range from a remote query, where a zero bound means "all".
    pub fn from_query(start: u32, end: u32) -> Self {
        if start == 0 || end == 0 {
            Self::All
        } else {
            Self::Between { start, end }
        }
    }

    /// Whether a bucket starting at `bucket_utc` lies inside the range.
    pub fn admits(&self, bucket_utc: u32) -> bool {
        match *self {
            Self::All => true,
            Self::Between { start, end } => start <= bucket_utc && bucket_utc <= end,
        }
    }
}
