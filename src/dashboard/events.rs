use chrono::NaiveDate;

use crate::dashboard::PlaybackSpeed;

/// Inputs to the dashboard: user actions and playback ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    SetDate(NaiveDate),
    SetHour(u32),
    SetResolution(u32),
    /// Sent by the playback timer; ignored while paused.
    Tick,
    TogglePlayback,
    SetSpeed(PlaybackSpeed),
    Shutdown,
}
