pub mod colormap;
pub mod frames;

pub use colormap::{hot, render_raster, LogScale};
pub use frames::{plan_frames, scan_timelines, FileTimeline, FrameCall, FrameRenderer, FrameReport};
