pub mod index;
pub mod projection;

pub use index::{block_mean, build_index, natural_max_level, query, QueryIndex, ResolutionLevel};
pub use projection::{from_web_mercator, to_web_mercator};
