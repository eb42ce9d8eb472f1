//! [`WallClock`] – the validated calendar time shared across contexts – and
//! [`TzOffset`], the fixed `±HH:MM` offset applied to remote UTC time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::OrcError;

// ────────────────────────────────────────────────────────────────────────────
// WallClock
// ────────────────────────────────────────────────────────────────────────────

/// Earliest year the real-time clock can hold.
pub const MIN_YEAR: u16 = 2000;
/// Latest year the real-time clock can hold.
pub const MAX_YEAR: u16 = 2099;

/// A calendar date and time of day with whole-second resolution.
///
/// Only constructible through [`WallClock::new`] (or the parsing helpers that
/// call it), so every instance in the system is within range: year
/// 2000–2099, a day that exists in its month, hour 0–23, minute and second
/// 0–59.  Deserialization runs the same check.
///
/// # Example
///
/// ```
/// use orc_types::WallClock;
///
/// let t = WallClock::new(2025, 3, 14, 9, 26, 53).unwrap();
/// assert_eq!(t.to_string(), "2025-03-14 09:26:53");
/// assert!(WallClock::new(2025, 2, 30, 0, 0, 0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawWallClock", into = "RawWallClock")]
pub struct WallClock {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

impl WallClock {
    /// What a real-time clock reads after losing backup power.
    pub const RTC_RESET: WallClock = WallClock {
        year: MIN_YEAR,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
    };

    /// Build a validated wall-clock value.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::ValidationFailure`] naming the first field that is
    /// out of range.
    pub fn new(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<Self, OrcError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(OrcError::invalid(
                "year",
                format!("{year} outside {MIN_YEAR}-{MAX_YEAR}"),
            ));
        }
        if !(1..=12).contains(&month) {
            return Err(OrcError::invalid("month", format!("{month} outside 1-12")));
        }
        if !(1..=31).contains(&day)
            || NaiveDate::from_ymd_opt(year.into(), month.into(), day.into()).is_none()
        {
            return Err(OrcError::invalid(
                "day",
                format!("{year:04}-{month:02} has no day {day}"),
            ));
        }
        if hour > 23 {
            return Err(OrcError::invalid("hour", format!("{hour} outside 0-23")));
        }
        if minute > 59 {
            return Err(OrcError::invalid("minute", format!("{minute} outside 0-59")));
        }
        if second > 59 {
            return Err(OrcError::invalid("second", format!("{second} outside 0-59")));
        }
        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        })
    }

    /// Convert seconds since the Unix epoch (already shifted into local time)
    /// into a wall-clock value.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::ValidationFailure`] when the timestamp is not
    /// representable or falls outside the supported year range.
    pub fn from_epoch_seconds(epoch: i64) -> Result<Self, OrcError> {
        let dt = DateTime::from_timestamp(epoch, 0)
            .ok_or_else(|| OrcError::invalid("epoch", format!("{epoch} is not representable")))?
            .naive_utc();
        let year = u16::try_from(dt.year())
            .map_err(|_| OrcError::invalid("year", format!("{} outside {MIN_YEAR}-{MAX_YEAR}", dt.year())))?;
        // chrono guarantees month/day/hour/minute/second fit in u8.
        Self::new(
            year,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
        )
    }

    /// Parse an operator-supplied `YYYY-MM-DD` date and `HH:MM` or
    /// `HH:MM:SS` time.  Seconds default to zero.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::ValidationFailure`] on malformed input or
    /// out-of-range values.
    pub fn parse_date_time(date: &str, time: &str) -> Result<Self, OrcError> {
        let d = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|e| OrcError::invalid("date", format!("'{date}': {e}")))?;
        let t = NaiveTime::parse_from_str(time.trim(), "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M"))
            .map_err(|e| OrcError::invalid("time", format!("'{time}': {e}")))?;
        let year = u16::try_from(d.year())
            .map_err(|_| OrcError::invalid("year", format!("{} outside {MIN_YEAR}-{MAX_YEAR}", d.year())))?;
        Self::new(
            year,
            d.month() as u8,
            d.day() as u8,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
        )
    }

    /// Seconds since the Unix epoch, treating the value as UTC.
    pub fn to_epoch_seconds(&self) -> i64 {
        NaiveDate::from_ymd_opt(self.year.into(), self.month.into(), self.day.into())
            .and_then(|d| d.and_hms_opt(self.hour.into(), self.minute.into(), self.second.into()))
            .map(|dt| dt.and_utc().timestamp())
            // Unreachable: fields were validated on construction.
            .unwrap_or_default()
    }

    pub fn year(&self) -> u16 {
        self.year
    }
    pub fn month(&self) -> u8 {
        self.month
    }
    pub fn day(&self) -> u8 {
        self.day
    }
    pub fn hour(&self) -> u8 {
        self.hour
    }
    pub fn minute(&self) -> u8 {
        self.minute
    }
    pub fn second(&self) -> u8 {
        self.second
    }

    /// `YYYY-MM-DD`.
    pub fn date_string(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// `HH:MM:SS`.
    pub fn time_string(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date_string(), self.time_string())
    }
}

/// Unvalidated wire form of [`WallClock`].
#[derive(Serialize, Deserialize)]
struct RawWallClock {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

impl TryFrom<RawWallClock> for WallClock {
    type Error = OrcError;

    fn try_from(raw: RawWallClock) -> Result<Self, Self::Error> {
        WallClock::new(raw.year, raw.month, raw.day, raw.hour, raw.minute, raw.second)
    }
}

impl From<WallClock> for RawWallClock {
    fn from(c: WallClock) -> Self {
        RawWallClock {
            year: c.year,
            month: c.month,
            day: c.day,
            hour: c.hour,
            minute: c.minute,
            second: c.second,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TzOffset
// ────────────────────────────────────────────────────────────────────────────

/// A fixed timezone offset written as `±HH:MM`.
///
/// The sign is mandatory and applies to the whole offset, so `-05:30` is
/// minus five and a half hours.  Offsets are limited to −12:00…+14:00 and
/// minutes to 00–59.
///
/// ```
/// use orc_types::TzOffset;
///
/// let tz: TzOffset = "-05:30".parse().unwrap();
/// assert_eq!(tz.minutes(), -330);
/// assert!("+5:30".parse::<TzOffset>().is_err());
/// assert!("+15:00".parse::<TzOffset>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TzOffset {
    minutes: i16,
}

impl TzOffset {
    /// Most negative offset accepted (−12:00).
    pub const MIN_MINUTES: i16 = -12 * 60;
    /// Most positive offset accepted (+14:00).
    pub const MAX_MINUTES: i16 = 14 * 60;

    /// Offset from a signed minute count.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::ValidationFailure`] outside −12:00…+14:00.
    pub fn from_minutes(minutes: i16) -> Result<Self, OrcError> {
        if !(Self::MIN_MINUTES..=Self::MAX_MINUTES).contains(&minutes) {
            return Err(OrcError::invalid(
                "timezone",
                format!("offset {minutes} min outside -12:00..+14:00"),
            ));
        }
        Ok(Self { minutes })
    }

    /// Signed offset in minutes.
    pub fn minutes(&self) -> i16 {
        self.minutes
    }

    /// Signed offset in seconds.
    pub fn seconds(&self) -> i64 {
        i64::from(self.minutes) * 60
    }
}

impl Default for TzOffset {
    /// `+13:00`, the factory default of the instrument.
    fn default() -> Self {
        Self { minutes: 13 * 60 }
    }
}

impl FromStr for TzOffset {
    type Err = OrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |why: &str| OrcError::invalid("timezone", format!("'{s}': {why}"));
        let b = s.as_bytes();
        if b.len() != 6 || b[3] != b':' {
            return Err(bad("expected format ±HH:MM"));
        }
        let sign: i16 = match b[0] {
            b'+' => 1,
            b'-' => -1,
            _ => return Err(bad("missing leading '+' or '-'")),
        };
        let digits = |hi: u8, lo: u8| -> Option<i16> {
            (hi.is_ascii_digit() && lo.is_ascii_digit())
                .then(|| i16::from(hi - b'0') * 10 + i16::from(lo - b'0'))
        };
        let hours = digits(b[1], b[2]).ok_or_else(|| bad("hours are not two digits"))?;
        let minutes = digits(b[4], b[5]).ok_or_else(|| bad("minutes are not two digits"))?;
        if minutes > 59 {
            return Err(bad("minutes outside 00-59"));
        }
        Self::from_minutes(sign * (hours * 60 + minutes))
    }
}

impl fmt::Display for TzOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minutes < 0 { '-' } else { '+' };
        let abs = self.minutes.unsigned_abs();
        write!(f, "{sign}{:02}:{:02}", abs / 60, abs % 60)
    }
}

impl TryFrom<String> for TzOffset {
    type Error = OrcError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TzOffset> for String {
    fn from(tz: TzOffset) -> Self {
        tz.to_string()
    }
}
