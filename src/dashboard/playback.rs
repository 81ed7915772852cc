use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

use crate::dashboard::Event;

/// Background thread that sends [`Event::Tick`] at a fixed interval until stopped.
pub struct PlaybackTimer {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackTimer {
    pub fn start(events: Sender<Event>, interval: Duration) -> Self {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);

        let handle = thread::spawn(move || loop {
            match cancel_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if events.send(Event::Tick).is_err() {
                        break;
                    }
                }
                // cancelled, or the timer handle was dropped
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        debug!(interval_ms = interval.as_millis() as u64, "Playback timer started");
        Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Cancel and wait for the thread. No tick is sent after this returns.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            debug!("Playback timer stopped");
        }
    }
}

impl Drop for PlaybackTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
