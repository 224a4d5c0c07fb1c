//! Amiga timestamps.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between 1970-01-01 and the Amiga epoch 1978-01-01.
const AMIGA_EPOCH_OFFSET: i64 = 2922 * 86_400;

/// Amiga date representation.
///
/// Amiga stores dates as days since January 1, 1978, minutes since midnight,
/// and ticks (1/50 second).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AmigaDate {
    /// Days since January 1, 1978.
    pub days: i32,
    /// Minutes since midnight.
    pub mins: i32,
    /// Ticks (1/50 second).
    pub ticks: i32,
}

impl AmigaDate {
    /// Create a new Amiga date from raw values.
    #[inline]
    pub const fn new(days: i32, mins: i32, ticks: i32) -> Self {
        Self { days, mins, ticks }
    }

    /// Split into calendar fields.
    pub fn to_date_time(self) -> DateTime {
        let (year, month, day) = days_to_date(self.days.max(0));
        DateTime {
            year,
            month,
            day,
            hour: (self.mins / 60) as u8,
            minute: (self.mins % 60) as u8,
            second: (self.ticks / 50) as u8,
        }
    }

    /// Seconds since 1970-01-01 00:00:00 UTC.
    #[inline]
    pub const fn to_unix_timestamp(self) -> i64 {
        (self.days as i64) * 86_400
            + (self.mins as i64) * 60
            + (self.ticks as i64) / 50
            + AMIGA_EPOCH_OFFSET
    }

    /// Convert for attribute replies; dates before 1970 clamp to the Unix epoch.
    pub fn to_system_time(self) -> SystemTime {
        let secs = u64::try_from(self.to_unix_timestamp()).unwrap_or(0);
        let nanos = (self.ticks.rem_euclid(50) as u32) * 20_000_000;
        UNIX_EPOCH + Duration::new(secs, nanos)
    }
}

/// Decoded date and time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateTime {
    /// Year (e.g., 1978-2100).
    pub year: u16,
    /// Month (1-12).
    pub month: u8,
    /// Day of month (1-31).
    pub day: u8,
    /// Hour (0-23).
    pub hour: u8,
    /// Minute (0-59).
    pub minute: u8,
    /// Second (0-59).
    pub second: u8,
}

fn days_to_date(mut days: i32) -> (u16, u8, u8) {
    const DAYS_IN_MONTH: [i32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    let mut year = 1978u16;
    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if days < days_in_year {
            break;
        }
        days -= days_in_year;
        let Some(next) = year.checked_add(1) else {
            return (u16::MAX, 12, 31);
        };
        year = next;
    }

    let leap = is_leap_year(year);
    let mut month = 1u8;
    for (i, &dim) in DAYS_IN_MONTH.iter().enumerate() {
        let dim = if i == 1 && leap { 29 } else { dim };
        if days < dim {
            break;
        }
        days -= dim;
        month += 1;
    }

    (year, month, (days + 1) as u8)
}

#[inline]
const fn is_leap_year(year: u16) -> bool {
    if year.is_multiple_of(100) {
        year.is_multiple_of(400)
    } else {
        year.is_multiple_of(4)
    }
}
