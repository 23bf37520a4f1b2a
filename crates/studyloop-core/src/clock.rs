//! Wall-clock access.
//!
//! Calendar days are local to the deployment (a fixed UTC offset), not UTC.
//! Everything that needs "today" or "now" takes a [`Clock`] so tests can pin
//! time with [`FixedClock`].

use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

use crate::storage::ClockConfig;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Offset that defines the local calendar day.
    fn offset(&self) -> FixedOffset;

    fn local_now(&self) -> DateTime<FixedOffset> {
        self.now().with_timezone(&self.offset())
    }

    fn today(&self) -> NaiveDate {
        self.local_now().date_naive()
    }
}

fn offset_from_hours(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

/// System clock with a configured local offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(utc_offset_hours: i32) -> Self {
        Self {
            offset: offset_from_hours(utc_offset_hours),
        }
    }

    pub fn from_config(config: &ClockConfig) -> Self {
        Self::new(config.utc_offset_hours)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Settable clock for tests and simulations.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl FixedClock {
    /// A clock in UTC pinned to `hour:00` on `date`.
    pub fn at(date: NaiveDate, hour: u32) -> Self {
        let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
        let naive = date.and_time(time);
        Self {
            now: Mutex::new(Utc.from_utc_datetime(&naive)),
            offset: Utc.fix(),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|g| *g).unwrap_or_else(|p| *p.into_inner())
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn local_day_follows_offset() {
        // 20:00 UTC on Jan 1 is already Jan 2 at UTC+8.
        let utc = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        let offset = offset_from_hours(8);
        assert_eq!(
            utc.with_timezone(&offset).date_naive(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn fixed_clock_advances() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let clock = FixedClock::at(day, 23);
        assert_eq!(clock.today(), day);
        assert_eq!(clock.local_now().hour(), 23);
        clock.advance(Duration::hours(1));
        assert_eq!(clock.today(), day.succ_opt().unwrap());
        assert_eq!(clock.local_now().hour(), 0);
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        assert_eq!(offset_from_hours(99), Utc.fix());
    }
}
