//! Wall-clock access and civil time conversion
//!
//! The real-time clock is kept in UTC by the hardware; everything the logger
//! stamps or names is in *local* time, shifted by the configured timezone
//! offset in whole hours. The [`Clock`] trait is the seam to the RTC driver.

use core::cell::Cell;
use core::fmt::{self, Display};

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

pub const SECONDS_PER_HOUR: u32 = 3600;

/// Broken-down calendar time, without any timezone attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CivilTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl CivilTime {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Break an epoch timestamp down into calendar fields.
    pub fn from_epoch(epoch: u32) -> Self {
        // Every u32 timestamp lies inside the range `time` supports.
        let dt = OffsetDateTime::from_unix_timestamp(i64::from(epoch))
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);

        Self {
            year: dt.year() as u16,
            month: u8::from(dt.month()),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
        }
    }

    /// Seconds since the epoch for these fields, read as if they were UTC.
    ///
    /// Returns `None` for impossible dates (month 13, February 30th, ...).
    pub fn to_epoch(&self) -> Option<i64> {
        let month = Month::try_from(self.month).ok()?;
        let date = Date::from_calendar_date(i32::from(self.year), month, self.day).ok()?;
        let time = Time::from_hms(self.hour, self.minute, self.second).ok()?;

        Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
    }

    /// Attach a UTC offset for ISO-8601 display.
    pub const fn with_offset(self, utc_offset_hours: i8) -> ZonedTime {
        ZonedTime {
            civil: self,
            utc_offset_hours,
        }
    }
}

impl Display for CivilTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Local civil time plus its offset, displayed as `2024-03-07T13:05:09-08:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonedTime {
    pub civil: CivilTime,
    pub utc_offset_hours: i8,
}

impl Display for ZonedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:+03}:00", self.civil, self.utc_offset_hours)
    }
}

/// Access to the real-time clock.
///
/// Implementations only need to report local time and their UTC offset; the
/// conversions between local calendar time and UTC epochs are provided.
pub trait Clock {
    /// Local time in seconds since the epoch.
    fn now_local_epoch(&self) -> u32;

    /// Milliseconds into the current second (0-999).
    fn now_millis(&self) -> u16;

    /// Offset of local time from UTC, in whole hours.
    fn utc_offset_hours(&self) -> i8;

    fn now_local(&self) -> CivilTime {
        CivilTime::from_epoch(self.now_local_epoch())
    }

    /// Convert a local calendar time into a UTC epoch.
    fn local_human_to_utc(&self, local: CivilTime) -> Option<u32> {
        let local_epoch = local.to_epoch()?;
        let utc = local_epoch - i64::from(self.utc_offset_hours()) * i64::from(SECONDS_PER_HOUR);
        u32::try_from(utc).ok()
    }

    fn utc_to_local_epoch(&self, utc: u32) -> u32 {
        let local = i64::from(utc) + i64::from(self.utc_offset_hours()) * i64::from(SECONDS_PER_HOUR);
        local.clamp(0, i64::from(u32::MAX)) as u32
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_local_epoch(&self) -> u32 {
        (**self).now_local_epoch()
    }

    fn now_millis(&self) -> u16 {
        (**self).now_millis()
    }

    fn utc_offset_hours(&self) -> i8 {
        (**self).utc_offset_hours()
    }
}

/// A clock that only moves when told to.
///
/// Used for deterministic replays and tests, where the sampler and the log
/// store must agree on a scripted timeline.
#[derive(Debug, Default)]
pub struct ManualClock {
    local_epoch: Cell<u32>,
    millis: Cell<u16>,
    utc_offset_hours: Cell<i8>,
}

impl ManualClock {
    pub fn new(local_epoch: u32, utc_offset_hours: i8) -> Self {
        Self {
            local_epoch: Cell::new(local_epoch),
            millis: Cell::new(0),
            utc_offset_hours: Cell::new(utc_offset_hours),
        }
    }

    pub fn set(&self, local_epoch: u32, millis: u16) {
        self.local_epoch.set(local_epoch);
        self.millis.set(millis % 1000);
    }

    pub fn set_utc_offset(&self, hours: i8) {
        self.utc_offset_hours.set(hours);
    }

    /// Move the clock forward, carrying milliseconds into seconds.
    pub fn advance_millis(&self, millis: u32) {
        let total = u64::from(self.millis.get()) + u64::from(millis);
        let seconds = self.local_epoch.get().saturating_add((total / 1000) as u32);
        self.local_epoch.set(seconds);
        self.millis.set((total % 1000) as u16);
    }
}

impl Clock for ManualClock {
    fn now_local_epoch(&self) -> u32 {
        self.local_epoch.get()
    }

    fn now_millis(&self) -> u16 {
        self.millis.get()
    }

    fn utc_offset_hours(&self) -> i8 {
        self.utc_offset_hours.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_civil_round_trip() {
        // 2024-03-07 13:05:09 UTC
        let civil = CivilTime::from_epoch(1_709_816_709);
        assert_eq!(civil, CivilTime::new(2024, 3, 7, 13, 5, 9));
        assert_eq!(civil.to_epoch(), Some(1_709_816_709));
    }

    #[test]
    fn test_impossible_date_rejected() {
        assert_eq!(CivilTime::new(2023, 2, 30, 0, 0, 0).to_epoch(), None);
        assert_eq!(CivilTime::new(2023, 13, 1, 0, 0, 0).to_epoch(), None);
        assert_eq!(CivilTime::new(2023, 1, 1, 24, 0, 0).to_epoch(), None);
    }

    #[test]
    fn test_local_human_to_utc_applies_offset() {
        let clock = ManualClock::new(0, -8);
        // 08:00 local at UTC-8 is 16:00 UTC
        let utc = clock
            .local_human_to_utc(CivilTime::new(2024, 1, 1, 8, 0, 0))
            .unwrap();
        assert_eq!(CivilTime::from_epoch(utc), CivilTime::new(2024, 1, 1, 16, 0, 0));
        assert_eq!(clock.utc_to_local_epoch(utc), utc - 8 * SECONDS_PER_HOUR);
    }

    #[test]
    fn test_local_before_epoch_is_none() {
        let clock = ManualClock::new(0, 5);
        assert_eq!(clock.local_human_to_utc(CivilTime::new(1970, 1, 1, 0, 0, 0)), None);
    }

    #[test]
    fn test_manual_clock_carries_millis() {
        let clock = ManualClock::new(100, 0);
        clock.advance_millis(950);
        clock.advance_millis(100);
        assert_eq!(clock.now_local_epoch(), 101);
        assert_eq!(clock.now_millis(), 50);
    }

    #[test]
    fn test_zoned_display() {
        let civil = CivilTime::new(2024, 3, 7, 13, 5, 9);
        assert_eq!(civil.with_offset(-8).to_string(), "2024-03-07T13:05:09-08:00");
        assert_eq!(civil.with_offset(5).to_string(), "2024-03-07T13:05:09+05:00");
    }
}
