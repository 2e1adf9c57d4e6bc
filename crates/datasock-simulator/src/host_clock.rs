use std::time::{SystemTime, UNIX_EPOCH};

use datasock_core::clock::{Clock, SECONDS_PER_HOUR};

/// The host's wall clock, shifted to the configured time zone.
///
/// Plays the part of the logger's RTC, which runs on local time.
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    utc_offset_hours: i8,
}

impl HostClock {
    pub fn new(utc_offset_hours: i8) -> Self {
        Self { utc_offset_hours }
    }

    fn since_epoch() -> std::time::Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

impl Clock for HostClock {
    fn now_local_epoch(&self) -> u32 {
        let utc = Self::since_epoch().as_secs() as i64;
        let local = utc + i64::from(self.utc_offset_hours) * i64::from(SECONDS_PER_HOUR);
        local.clamp(0, i64::from(u32::MAX)) as u32
    }

    fn now_millis(&self) -> u16 {
        Self::since_epoch().subsec_millis() as u16
    }

    fn utc_offset_hours(&self) -> i8 {
        self.utc_offset_hours
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_time_tracks_offset() {
        let utc = HostClock::new(0).now_local_epoch();
        let pacific = HostClock::new(-8).now_local_epoch();
        // Allow for the second ticking over between the two reads
        let diff = i64::from(utc) - i64::from(pacific);
        assert!((8 * 3600..=8 * 3600 + 1).contains(&diff), "{diff}");
        assert!(HostClock::new(3).now_millis() < 1000);
    }
}
