use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ArchiveError, Result};
use crate::query::QueryIndex;
use crate::utils::constants::HOURS_PER_DAY;

/// What the three dashboard inputs may be set to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardBounds {
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
    pub max_resolution: u32,
}

impl DashboardBounds {
    pub fn from_index(index: &QueryIndex) -> Result<Self> {
        let (min_date, max_date) = index
            .date_bounds()
            .ok_or_else(|| ArchiveError::MissingData("index has no timesteps".to_string()))?;
        Ok(Self {
            min_date,
            max_date,
            max_resolution: index.max_resolution(),
        })
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        (self.min_date..=self.max_date).contains(&date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackSpeed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl PlaybackSpeed {
    /// Time between animation steps for a base interval.
    pub fn interval(&self, base: Duration) -> Duration {
        match self {
            PlaybackSpeed::Slow => base * 2,
            PlaybackSpeed::Normal => base,
            PlaybackSpeed::Fast => base / 2,
        }
    }
}

impl FromStr for PlaybackSpeed {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slow" => Ok(PlaybackSpeed::Slow),
            "normal" => Ok(PlaybackSpeed::Normal),
            "fast" => Ok(PlaybackSpeed::Fast),
            other => Err(format!(
                "unknown playback speed '{}' (expected slow, normal or fast)",
                other
            )),
        }
    }
}

impl fmt::Display for PlaybackSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackSpeed::Slow => "slow",
            PlaybackSpeed::Normal => "normal",
            PlaybackSpeed::Fast => "fast",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardState {
    pub date: NaiveDate,
    pub hour: u32,
    pub resolution: u32,
    pub playing: bool,
    pub speed: PlaybackSpeed,
}

impl DashboardState {
    /// Starts at midnight of the first day, native resolution, paused.
    pub fn new(bounds: &DashboardBounds) -> Self {
        Self {
            date: bounds.min_date,
            hour: 0,
            resolution: 0,
            playing: false,
            speed: PlaybackSpeed::default(),
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.date
            .and_hms_opt(self.hour.min(HOURS_PER_DAY - 1), 0, 0)
            .unwrap_or_else(|| self.date.and_time(NaiveTime::MIN))
    }

    /// One hour forward, wrapping to the first day after the last hour of the last.
    pub fn advance_hour(&mut self, bounds: &DashboardBounds) {
        let next = self.timestamp() + ChronoDuration::hours(1);
        if next.date() > bounds.max_date {
            self.date = bounds.min_date;
            self.hour = 0;
        } else {
            self.date = next.date();
            self.hour = next.hour();
        }
    }
}
