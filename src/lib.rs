pub mod archive;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fetch;
pub mod models;
pub mod processors;
pub mod query;
pub mod readers;
pub mod render;
pub mod utils;

pub use error::{ArchiveError, Result};
