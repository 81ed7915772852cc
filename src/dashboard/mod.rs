//! Event-driven dashboard core: inputs, playback and the recompute loop. Drawing is
//! left to the caller.

pub mod dispatcher;
pub mod events;
pub mod playback;
pub mod state;

pub use dispatcher::{DashboardFrame, Dispatcher};
pub use events::Event;
pub use playback::PlaybackTimer;
pub use state::{DashboardBounds, DashboardState, PlaybackSpeed};
