pub mod naming;
pub mod provider;
pub mod staging;
pub mod store;

pub use naming::{canonical_file_name, parse_canonical_file_name, request_file_name};
pub use provider::{
    ArtifactOrigin, ArtifactPayload, ArtifactProvider, ArtifactScan, DirectoryListing,
    DirectoryProvider, FileListing, InMemoryProvider, ScannedArtifact,
};
pub use staging::StagingArea;
pub use store::{CanonicalArchive, MaterializeReport, StoreOutcome};
