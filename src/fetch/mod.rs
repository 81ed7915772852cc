//! Downloading forecast files from the remote tree.

pub mod client;
pub mod job;
pub mod latest;
pub mod transport;

pub use client::{FetchFailure, FetchOutcome, FetchReport, FetchStatus, Fetcher};
pub use job::{current_url, enumerate_jobs, FetchJob};
pub use latest::{fetch_latest, LatestOutcome};
pub use transport::{FetchResponse, HttpTransport, Transport};
