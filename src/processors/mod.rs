pub mod integrity_checker;
pub mod parallel_processor;
pub mod reconciler;

pub use integrity_checker::{verify_union, SourceAudit, UnionAudit, UnionVerifier};
pub use parallel_processor::{build_pool, ParallelScanner};
pub use reconciler::{
    Collision, CollisionPolicy, CollisionResolution, KeyedArtifact, ReconcileOutcome,
    Reconciler, RejectedArtifact, SourceSummary,
};
