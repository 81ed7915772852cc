pub mod constants;
pub mod filename;
pub mod logging;
pub mod progress;

pub use constants::*;
pub use filename::{frame_file_name, generate_default_manifest_filename, yesterday};
pub use logging::init_logging;
pub use progress::ProgressReporter;
