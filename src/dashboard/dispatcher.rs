use chrono::NaiveDateTime;
use crossbeam::channel::{unbounded, Receiver, Sender};
use ndarray::Array2;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dashboard::{DashboardBounds, DashboardState, Event, PlaybackTimer};
use crate::error::{ArchiveError, Result};
use crate::query::QueryIndex;
use crate::utils::constants::HOURS_PER_DAY;

/// The raster the dashboard should show for its current inputs.
#[derive(Debug)]
pub struct DashboardFrame {
    pub timestamp: NaiveDateTime,
    pub resolution: u32,
    /// A missing timestamp is a value here, not a failure of the dispatcher.
    pub data: std::result::Result<Array2<f32>, ArchiveError>,
}

impl DashboardFrame {
    pub fn has_data(&self) -> bool {
        self.data.is_ok()
    }
}

/// Single-threaded event loop between the dashboard inputs and the query index.
///
/// Events arrive on a channel (from the UI or the playback timer); every change to
/// the inputs yields one recomputed frame. The index itself knows nothing of the UI.
pub struct Dispatcher {
    index: Arc<QueryIndex>,
    bounds: DashboardBounds,
    state: DashboardState,
    base_interval: Duration,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
    timer: Option<PlaybackTimer>,
}

impl Dispatcher {
    pub fn new(index: Arc<QueryIndex>, base_interval: Duration) -> Result<Self> {
        let bounds = DashboardBounds::from_index(&index)?;
        let (events_tx, events_rx) = unbounded();

        Ok(Self {
            index,
            state: DashboardState::new(&bounds),
            bounds,
            base_interval,
            events_tx,
            events_rx,
            timer: None,
        })
    }

    /// Handle for feeding events from other threads.
    pub fn sender(&self) -> Sender<Event> {
        self.events_tx.clone()
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn bounds(&self) -> &DashboardBounds {
        &self.bounds
    }

    pub fn current_frame(&self) -> DashboardFrame {
        let timestamp = self.state.timestamp();
        let resolution = self.state.resolution;
        DashboardFrame {
            timestamp,
            resolution,
            data: self
                .index
                .query_at(timestamp, resolution)
                .map(|view| view.to_owned()),
        }
    }

    /// Apply one event. Returns the new frame when the displayed inputs changed.
    pub fn handle(&mut self, event: Event) -> Option<DashboardFrame> {
        debug!(?event, "Dashboard event");

        match event {
            Event::SetDate(date) => {
                if !self.bounds.contains_date(date) {
                    warn!(%date, min = %self.bounds.min_date, max = %self.bounds.max_date, "Date outside archive, ignored");
                    return None;
                }
                self.state.date = date;
            }
            Event::SetHour(hour) => {
                if hour >= HOURS_PER_DAY {
                    warn!(hour, "Hour outside 0-23, ignored");
                    return None;
                }
                self.state.hour = hour;
            }
            Event::SetResolution(resolution) => {
                if resolution > self.bounds.max_resolution {
                    warn!(
                        resolution,
                        max = self.bounds.max_resolution,
                        "Resolution level not available, ignored"
                    );
                    return None;
                }
                self.state.resolution = resolution;
            }
            Event::Tick => {
                // a tick may still be queued after playback was stopped
                if !self.state.playing {
                    return None;
                }
                self.state.advance_hour(&self.bounds);
            }
            Event::TogglePlayback => {
                self.state.playing = !self.state.playing;
                if self.state.playing {
                    self.start_timer();
                } else {
                    self.stop_timer();
                }
                return None;
            }
            Event::SetSpeed(speed) => {
                self.state.speed = speed;
                if self.state.playing {
                    self.start_timer();
                }
                return None;
            }
            Event::Shutdown => {
                self.stop_timer();
                return None;
            }
        }

        Some(self.current_frame())
    }

    /// Drive the loop: the initial frame first, then one frame per input change,
    /// until `Shutdown` arrives or `sink` returns false.
    pub fn run<F>(&mut self, mut sink: F) -> Result<()>
    where
        F: FnMut(&DashboardFrame) -> bool,
    {
        info!(
            min_date = %self.bounds.min_date,
            max_date = %self.bounds.max_date,
            max_resolution = self.bounds.max_resolution,
            "Dashboard dispatcher running"
        );

        if !sink(&self.current_frame()) {
            self.stop_timer();
            return Ok(());
        }

        loop {
            let event = self
                .events_rx
                .recv()
                .map_err(|_| ArchiveError::Cancelled)?;
            if event == Event::Shutdown {
                self.handle(event);
                break;
            }
            if let Some(frame) = self.handle(event) {
                if !sink(&frame) {
                    break;
                }
            }
        }

        self.stop_timer();
        Ok(())
    }

    fn start_timer(&mut self) {
        self.stop_timer();
        let interval = self.state.speed.interval(self.base_interval);
        self.timer = Some(PlaybackTimer::start(self.events_tx.clone(), interval));
    }

    fn stop_timer(&mut self) {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::PlaybackSpeed;
    use crate::models::{DispersionDataset, GridGeometry, PackedTimestamp};
    use chrono::NaiveDate;
    use ndarray::Array3;

    /// Hours 0..=3 of 2024-02-28 plus hour 0 of 2024-02-29; cell values equal the
    /// timestep number.
    fn index() -> Arc<QueryIndex> {
        let geometry = GridGeometry {
            xorig: -160.0,
            yorig: 32.0,
            xcell: 0.1,
            ycell: 0.1,
            ncols: 4,
            nrows: 4,
        };
        let tflags = vec![
            PackedTimestamp::new(2024059, 0).unwrap(),
            PackedTimestamp::new(2024059, 10000).unwrap(),
            PackedTimestamp::new(2024059, 20000).unwrap(),
            PackedTimestamp::new(2024059, 30000).unwrap(),
            PackedTimestamp::new(2024060, 0).unwrap(),
        ];
        let pm25 = Array3::from_shape_fn((5, 4, 4), |(t, _, _)| t as f32);
        let dataset = DispersionDataset::new(geometry, tflags, pm25).unwrap();
        Arc::new(QueryIndex::build(vec![dataset]).unwrap())
    }

    fn feb(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, day).unwrap()
    }

    #[test]
    fn test_input_changes_recompute() -> Result<()> {
        let mut dispatcher = Dispatcher::new(index(), Duration::from_millis(10))?;
        assert_eq!(dispatcher.bounds().max_resolution, 2);

        let frame = dispatcher.handle(Event::SetHour(2)).unwrap();
        assert_eq!(frame.data.as_ref().unwrap()[[0, 0]], 2.0);

        let frame = dispatcher.handle(Event::SetResolution(1)).unwrap();
        assert_eq!(frame.data.as_ref().unwrap().dim(), (2, 2));

        let frame = dispatcher.handle(Event::SetDate(feb(29))).unwrap();
        assert!(!frame.has_data());
        assert!(frame.data.unwrap_err().is_no_data());
        Ok(())
    }

    #[test]
    fn test_out_of_bounds_inputs_are_ignored() -> Result<()> {
        let mut dispatcher = Dispatcher::new(index(), Duration::from_millis(10))?;
        let before = *dispatcher.state();

        assert!(dispatcher.handle(Event::SetDate(feb(27))).is_none());
        assert!(dispatcher.handle(Event::SetHour(24)).is_none());
        assert!(dispatcher.handle(Event::SetResolution(9)).is_none());
        assert_eq!(*dispatcher.state(), before);
        Ok(())
    }

    #[test]
    fn test_ticks_only_advance_while_playing() -> Result<()> {
        let mut dispatcher = Dispatcher::new(index(), Duration::from_secs(3600))?;

        assert!(dispatcher.handle(Event::Tick).is_none());
        assert!(dispatcher.handle(Event::TogglePlayback).is_none());
        assert!(dispatcher.state().playing);

        let frame = dispatcher.handle(Event::Tick).unwrap();
        assert_eq!(frame.timestamp, feb(28).and_hms_opt(1, 0, 0).unwrap());

        dispatcher.handle(Event::SetSpeed(PlaybackSpeed::Fast));
        assert_eq!(dispatcher.state().speed, PlaybackSpeed::Fast);

        dispatcher.handle(Event::TogglePlayback);
        assert!(dispatcher.handle(Event::Tick).is_none());
        Ok(())
    }

    #[test]
    fn test_run_with_playback_until_sink_stops() -> Result<()> {
        let mut dispatcher = Dispatcher::new(index(), Duration::from_millis(2))?;
        dispatcher.sender().send(Event::TogglePlayback).unwrap();

        let mut seen = Vec::new();
        dispatcher.run(|frame| {
            seen.push(frame.timestamp);
            seen.len() < 4
        })?;

        let hours: Vec<String> = seen.iter().map(|t| t.format("%d %H").to_string()).collect();
        assert_eq!(hours, vec!["28 00", "28 01", "28 02", "28 03"]);
        assert!(dispatcher.timer.is_none());
        Ok(())
    }

    #[test]
    fn test_shutdown_ends_run() -> Result<()> {
        let mut dispatcher = Dispatcher::new(index(), Duration::from_millis(10))?;
        let sender = dispatcher.sender();
        sender.send(Event::SetHour(3)).unwrap();
        sender.send(Event::Shutdown).unwrap();

        let mut frames = 0;
        dispatcher.run(|_| {
            frames += 1;
            true
        })?;
        assert_eq!(frames, 2);
        Ok(())
    }
}
