use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ArchiveError, Result};

pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

/// The `(CDATE, CTIME)` / `TFLAG` pair carried by every dispersion file.
///
/// `date_code = year * 1000 + day_of_year` and
/// `time_code = hour * 10000 + minute * 100 + second`. Ordering on the pair is
/// chronological for every valid value, so it doubles as the archive's canonical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackedTimestamp {
    pub date_code: i32,
    pub time_code: i32,
}

impl PackedTimestamp {
    /// Build from raw codes, rejecting pairs that do not decode.
    pub fn new(date_code: i32, time_code: i32) -> Result<Self> {
        let packed = Self {
            date_code,
            time_code,
        };
        packed.decode()?;
        Ok(packed)
    }

    pub fn encode(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Result<Self> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(ArchiveError::InvalidDate {
                message: format!("year {} outside [{}, {}]", year, MIN_YEAR, MAX_YEAR),
            });
        }

        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            ArchiveError::InvalidDate {
                message: format!("{:04}-{:02}-{:02} is not a calendar date", year, month, day),
            }
        })?;

        if hour > 23 || minute > 59 || second > 59 {
            return Err(ArchiveError::InvalidDate {
                message: format!("{:02}:{:02}:{:02} is not a time of day", hour, minute, second),
            });
        }

        Ok(Self {
            date_code: year * 1000 + date.ordinal() as i32,
            time_code: (hour * 10000 + minute * 100 + second) as i32,
        })
    }

    pub fn from_datetime(datetime: &NaiveDateTime) -> Result<Self> {
        Self::encode(
            datetime.year(),
            datetime.month(),
            datetime.day(),
            datetime.hour(),
            datetime.minute(),
            datetime.second(),
        )
    }

    pub fn decode(&self) -> Result<NaiveDateTime> {
        let invalid = |reason: String| ArchiveError::InvalidPackedTimestamp {
            date_code: self.date_code,
            time_code: self.time_code,
            reason,
        };

        if self.date_code <= 0 {
            return Err(invalid("date code must be positive".to_string()));
        }

        let year = self.date_code / 1000;
        let day_of_year = (self.date_code % 1000) as u32;

        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(invalid(format!("year {} out of range", year)));
        }
        if day_of_year == 0 {
            return Err(invalid("day of year 0".to_string()));
        }

        let date = NaiveDate::from_yo_opt(year, day_of_year).ok_or_else(|| {
            invalid(format!(
                "day {} is past the end of {} ({} days)",
                day_of_year,
                year,
                days_in_year(year)
            ))
        })?;

        if !(0..=235959).contains(&self.time_code) {
            return Err(invalid("time code outside [0, 235959]".to_string()));
        }

        let hour = (self.time_code / 10000) as u32;
        let minute = ((self.time_code % 10000) / 100) as u32;
        let second = (self.time_code % 100) as u32;

        let time = NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(|| {
            invalid(format!(
                "{:02}:{:02}:{:02} is not a time of day",
                hour, minute, second
            ))
        })?;

        Ok(NaiveDateTime::new(date, time))
    }

    pub fn year(&self) -> i32 {
        self.date_code / 1000
    }

    pub fn day_of_year(&self) -> u32 {
        (self.date_code % 1000) as u32
    }
}

impl fmt::Display for PackedTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:06}", self.date_code, self.time_code)
    }
}

/// Calendar fields to packed pair.
pub fn encode(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Result<PackedTimestamp> {
    PackedTimestamp::encode(year, month, day, hour, minute, second)
}

/// Packed pair to civil date-time.
pub fn decode(packed: PackedTimestamp) -> Result<NaiveDateTime> {
    packed.decode()
}

pub fn days_in_year(year: i32) -> u32 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}
