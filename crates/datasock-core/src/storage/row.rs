//! CSV row codec for [`Sample`]s.
//!
//! ```text
//! 1709816709.042,0.01,-0.02,9.81,0.00,0.00,0.00,24.50,1023,8191,0,17\r\n
//! ```
//!
//! Epoch seconds with zero-padded milliseconds, then acceleration X/Y/Z,
//! angular rate X/Y/Z and temperature with two decimals, then one integer per
//! active ADC channel.

use core::fmt::{self, Write};

use thiserror_no_std::Error;

use crate::sampling::Sample;
use crate::sensors::{CHANNEL_MAX_READING, ImuReading, MAX_CHANNELS};

/// Size of the row buffers on both the write and read paths.
pub const ROW_CAPACITY: usize = 200;

/// Timestamp plus seven IMU fields.
pub const MIN_ROW_FIELDS: usize = 8;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowError {
    #[error("row has {0} fields, at least 8 expected")]
    TooFewFields(usize),
    #[error("field {0} is not a number or out of range")]
    BadField(usize),
    #[error("row carries more than 16 channel readings")]
    TooManyChannels,
}

/// Outcome of [`format_row`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormattedRow {
    /// Bytes written to the buffer
    pub len: usize,
    /// The row did not fit and was cut short
    pub truncated: bool,
}

/// `fmt::Write` sink over a byte slice that stops at the end of the slice.
struct RowWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    truncated: bool,
}

impl Write for RowWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len() - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() {
            self.truncated = true;
            return Err(fmt::Error);
        }
        Ok(())
    }
}

/// Write `sample` as one CSV row into `buf`.
///
/// Emits `channel_count` channel fields, or fewer if the sample carries fewer
/// readings. Never writes past `buf`; an over-long row is cut off and flagged.
pub fn format_row(sample: &Sample, channel_count: usize, buf: &mut [u8]) -> FormattedRow {
    let mut out = RowWriter {
        buf,
        len: 0,
        truncated: false,
    };
    let channels = &sample.channels[..channel_count.min(sample.channels.len())];

    // An error here only ever means the buffer filled up.
    let _ = write_fields(&mut out, sample, channels);

    FormattedRow {
        len: out.len,
        truncated: out.truncated,
    }
}

fn write_fields(out: &mut RowWriter<'_>, sample: &Sample, channels: &[u16]) -> fmt::Result {
    let ImuReading {
        accel,
        gyro,
        temperature,
    } = sample.imu;

    write!(out, "{}.{:03}", sample.epoch_seconds, sample.millis)?;
    for value in accel.iter().chain(gyro.iter()) {
        write!(out, ",{:.2}", value)?;
    }
    write!(out, ",{:.2}", temperature)?;
    for reading in channels {
        write!(out, ",{}", reading)?;
    }
    out.write_str("\r\n")
}

/// Parse one row (without its line terminator) back into a [`Sample`].
///
/// The millisecond part of the timestamp is optional and defaults to 0; when
/// present it must be three digits. Channel readings above the ADC range are
/// rejected.
pub fn parse_row(line: &str) -> Result<Sample, RowError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let field_count = line.split(',').count();
    if field_count < MIN_ROW_FIELDS {
        return Err(RowError::TooFewFields(field_count));
    }
    if field_count - MIN_ROW_FIELDS > MAX_CHANNELS {
        return Err(RowError::TooManyChannels);
    }

    let mut fields = line.split(',').enumerate();
    let mut sample = Sample::default();

    if let Some((_, stamp)) = fields.next() {
        let (seconds, millis) = match stamp.split_once('.') {
            Some((seconds, millis)) => {
                (seconds, parse_millis(millis.trim()).ok_or(RowError::BadField(0))?)
            }
            None => (stamp, 0),
        };
        sample.epoch_seconds = seconds.trim().parse().map_err(|_| RowError::BadField(0))?;
        sample.millis = millis;
    }

    let mut imu = [0.0f32; 7];
    for slot in imu.iter_mut() {
        if let Some((index, field)) = fields.next() {
            *slot = field.trim().parse().map_err(|_| RowError::BadField(index))?;
        }
    }
    sample.imu = ImuReading {
        accel: [imu[0], imu[1], imu[2]],
        gyro: [imu[3], imu[4], imu[5]],
        temperature: imu[6],
    };

    for (index, field) in fields {
        let reading = field
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|&reading| reading <= CHANNEL_MAX_READING)
            .ok_or(RowError::BadField(index))?;
        sample
            .channels
            .push(reading)
            .map_err(|_| RowError::TooManyChannels)?;
    }

    Ok(sample)
}

/// Exactly three digits, as written by [`format_row`]: `.5` is not 5 ms.
fn parse_millis(field: &str) -> Option<u16> {
    if field.len() != 3 || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}
