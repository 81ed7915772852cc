use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::archive::{ArtifactOrigin, ArtifactProvider, ArtifactScan, ScannedArtifact};
use crate::error::Result;
use crate::models::{Fingerprint, PackedTimestamp};

/// What to do when two artifacts share a canonical key but differ in content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Keep neither; report the key for manual review.
    #[default]
    Flag,
    KeepFirst,
    KeepLast,
}

impl FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flag" => Ok(CollisionPolicy::Flag),
            "keep-first" => Ok(CollisionPolicy::KeepFirst),
            "keep-last" => Ok(CollisionPolicy::KeepLast),
            other => Err(format!(
                "unknown collision policy '{}' (expected flag, keep-first or keep-last)",
                other
            )),
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollisionPolicy::Flag => "flag",
            CollisionPolicy::KeepFirst => "keep-first",
            CollisionPolicy::KeepLast => "keep-last",
        };
        write!(f, "{}", name)
    }
}

/// An artifact with its canonical key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedArtifact {
    pub key: PackedTimestamp,
    pub fingerprint: Fingerprint,
    pub origin: ArtifactOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CollisionResolution {
    Flagged,
    KeptFirst,
    KeptLast,
}

/// Differing artifacts that share one canonical key, in the order they were seen.
#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    pub key: PackedTimestamp,
    pub candidates: Vec<KeyedArtifact>,
    pub resolution: CollisionResolution,
}

/// An artifact left out because its embedded timestamp could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedArtifact {
    pub source: String,
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub scanned: usize,
    pub keyed: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub policy: CollisionPolicy,
    /// The chosen artifact per canonical key. Flagged keys are absent.
    pub entries: BTreeMap<PackedTimestamp, KeyedArtifact>,
    /// Ordered by key.
    pub collisions: Vec<Collision>,
    pub rejected: Vec<RejectedArtifact>,
    /// Artifacts that repeated an already chosen key with the same content.
    pub identical_duplicates: usize,
    pub sources: Vec<SourceSummary>,
}

impl ReconcileOutcome {
    pub fn keys(&self) -> Vec<PackedTimestamp> {
        self.entries.keys().copied().collect()
    }

    pub fn flagged_keys(&self) -> Vec<PackedTimestamp> {
        self.collisions
            .iter()
            .filter(|c| c.resolution == CollisionResolution::Flagged)
            .map(|c| c.key)
            .collect()
    }

    pub fn summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("=== Reconciliation Report ===\n");
        summary.push_str(&format!("Collision policy: {}\n", self.policy));
        for source in &self.sources {
            summary.push_str(&format!(
                "  {}: {} scanned, {} keyed, {} rejected\n",
                source.source, source.scanned, source.keyed, source.rejected
            ));
        }
        summary.push_str(&format!("Canonical entries: {}\n", self.entries.len()));
        summary.push_str(&format!(
            "Identical duplicates: {}\n",
            self.identical_duplicates
        ));
        summary.push_str(&format!("Collisions: {}\n", self.collisions.len()));

        for collision in &self.collisions {
            summary.push_str(&format!(
                "  {} ({:?}):\n",
                collision.key, collision.resolution
            ));
            for candidate in &collision.candidates {
                summary.push_str(&format!(
                    "    {}/{} ({} bytes, crc32 {:08x})\n",
                    candidate.origin.source,
                    candidate.origin.file_name,
                    candidate.fingerprint.len,
                    candidate.fingerprint.crc32
                ));
            }
        }

        if !self.rejected.is_empty() {
            summary.push_str(&format!("\nRejected artifacts: {}\n", self.rejected.len()));
            for (i, rejected) in self.rejected.iter().take(10).enumerate() {
                summary.push_str(&format!(
                    "  {}. {}/{}: {}\n",
                    i + 1,
                    rejected.source,
                    rejected.file_name,
                    rejected.reason
                ));
            }
        }

        summary
    }
}

/// Merges overlapping artifact sets into one canonical key space.
///
/// Sources are taken in the order given and each source's artifacts in file-name
/// order, so the outcome depends only on the inputs. The first artifact seen for a
/// key is kept; a later one with the same content is counted as a duplicate, and one
/// with different content is a collision handled by the policy.
pub struct Reconciler {
    policy: CollisionPolicy,
}

impl Reconciler {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    pub fn reconcile(&self, providers: &[&dyn ArtifactProvider]) -> Result<ReconcileOutcome> {
        let mut scans = Vec::with_capacity(providers.len());
        for provider in providers {
            scans.push((provider.label().to_string(), provider.scan()?));
        }
        Ok(self.reconcile_scans(scans))
    }

    pub fn reconcile_scans(&self, scans: Vec<(String, Vec<ScannedArtifact>)>) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome {
            policy: self.policy,
            ..Default::default()
        };
        let mut collisions: BTreeMap<PackedTimestamp, Collision> = BTreeMap::new();

        for (source, mut artifacts) in scans {
            artifacts.sort_by(|a, b| a.origin.file_name.cmp(&b.origin.file_name));

            let mut summary = SourceSummary {
                source: source.clone(),
                scanned: artifacts.len(),
                ..Default::default()
            };

            for artifact in artifacts {
                match artifact.scan {
                    ArtifactScan::Unreadable { reason } => {
                        warn!(
                            source = %artifact.origin.source,
                            file = %artifact.origin.file_name,
                            reason = %reason,
                            "Excluding artifact without a readable timestamp"
                        );
                        summary.rejected += 1;
                        outcome.rejected.push(RejectedArtifact {
                            source: artifact.origin.source,
                            file_name: artifact.origin.file_name,
                            reason,
                        });
                    }
                    ArtifactScan::Keyed {
                        timestamp,
                        fingerprint,
                    } => {
                        summary.keyed += 1;
                        let keyed = KeyedArtifact {
                            key: timestamp,
                            fingerprint,
                            origin: artifact.origin,
                        };
                        self.place(keyed, &mut outcome, &mut collisions);
                    }
                }
            }

            outcome.sources.push(summary);
        }

        outcome.collisions = collisions.into_values().collect();

        info!(
            policy = %self.policy,
            entries = outcome.entries.len(),
            collisions = outcome.collisions.len(),
            rejected = outcome.rejected.len(),
            "Reconciliation finished"
        );

        outcome
    }

    fn place(
        &self,
        artifact: KeyedArtifact,
        outcome: &mut ReconcileOutcome,
        collisions: &mut BTreeMap<PackedTimestamp, Collision>,
    ) {
        let key = artifact.key;

        if let Some(existing) = outcome.entries.get(&key) {
            if existing.fingerprint == artifact.fingerprint {
                outcome.identical_duplicates += 1;
                return;
            }

            warn!(
                key = %key,
                kept = %existing.origin.file_name,
                other = %artifact.origin.file_name,
                source = %artifact.origin.source,
                "Canonical key collision"
            );

            let resolution = match self.policy {
                CollisionPolicy::Flag => CollisionResolution::Flagged,
                CollisionPolicy::KeepFirst => CollisionResolution::KeptFirst,
                CollisionPolicy::KeepLast => CollisionResolution::KeptLast,
            };
            let collision = collisions.entry(key).or_insert_with(|| Collision {
                key,
                candidates: vec![existing.clone()],
                resolution,
            });
            push_candidate(collision, artifact.clone());

            match self.policy {
                CollisionPolicy::Flag => {
                    outcome.entries.remove(&key);
                }
                CollisionPolicy::KeepFirst => {}
                CollisionPolicy::KeepLast => {
                    outcome.entries.insert(key, artifact);
                }
            }
            return;
        }

        // A flagged key stays out of the entries; later artifacts join the review set.
        if let Some(collision) = collisions.get_mut(&key) {
            if collision
                .candidates
                .iter()
                .any(|c| c.fingerprint == artifact.fingerprint)
            {
                outcome.identical_duplicates += 1;
            } else {
                push_candidate(collision, artifact);
            }
            return;
        }

        outcome.entries.insert(key, artifact);
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(CollisionPolicy::default())
    }
}

fn push_candidate(collision: &mut Collision, artifact: KeyedArtifact) {
    if !collision
        .candidates
        .iter()
        .any(|c| c.fingerprint == artifact.fingerprint)
    {
        collision.candidates.push(artifact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::InMemoryProvider;
    use pretty_assertions::assert_eq;

    fn key(date_code: i32, time_code: i32) -> PackedTimestamp {
        PackedTimestamp::new(date_code, time_code).unwrap()
    }

    fn source_a() -> InMemoryProvider {
        InMemoryProvider::new("a")
            .with_artifact("dispersion_20210227.nc", key(2021058, 80000), &b"feb27"[..])
            .with_artifact("dispersion_20210228.nc", key(2021059, 25055), &b"feb28"[..])
    }

    #[test]
    fn test_identical_overlap_is_deduplicated() -> Result<()> {
        let b = InMemoryProvider::new("b")
            .with_artifact("dispersion_20210228.nc", key(2021059, 25055), &b"feb28"[..])
            .with_artifact("dispersion_20210301.nc", key(2021060, 80000), &b"mar01"[..]);

        let outcome = Reconciler::default().reconcile(&[&source_a(), &b])?;

        assert_eq!(outcome.entries.len(), 2 + 2 - 1);
        assert!(outcome.collisions.is_empty());
        assert_eq!(outcome.identical_duplicates, 1);
        assert_eq!(outcome.entries[&key(2021059, 25055)].origin.source, "a");
        Ok(())
    }

    #[test]
    fn test_differing_payload_is_flagged_by_default() -> Result<()> {
        let b = InMemoryProvider::new("b")
            .with_artifact("dispersion_20210228.nc", key(2021059, 25055), &b"FEB28"[..]);

        let outcome = Reconciler::default().reconcile(&[&source_a(), &b])?;

        assert_eq!(outcome.flagged_keys(), vec![key(2021059, 25055)]);
        assert_eq!(outcome.collisions[0].candidates.len(), 2);
        assert!(!outcome.entries.contains_key(&key(2021059, 25055)));
        assert_eq!(outcome.keys(), vec![key(2021058, 80000)]);
        Ok(())
    }

    #[test]
    fn test_flagged_key_collects_later_candidates() -> Result<()> {
        let b = InMemoryProvider::new("b")
            .with_artifact("dispersion_20210228.nc", key(2021059, 25055), &b"v2"[..]);
        let c = InMemoryProvider::new("c")
            .with_artifact("dispersion_20210228.nc", key(2021059, 25055), &b"v3"[..])
            .with_artifact("dispersion_20210228b.nc", key(2021059, 25055), &b"v2"[..]);

        let outcome = Reconciler::default().reconcile(&[&source_a(), &b, &c])?;

        let sources: Vec<_> = outcome.collisions[0]
            .candidates
            .iter()
            .map(|c| c.origin.source.as_str())
            .collect();
        assert_eq!(sources, vec!["a", "b", "c"]);
        assert_eq!(outcome.identical_duplicates, 1);
        assert!(!outcome.entries.contains_key(&key(2021059, 25055)));
        Ok(())
    }

    #[test]
    fn test_keep_first_and_keep_last() -> Result<()> {
        let b = InMemoryProvider::new("b")
            .with_artifact("dispersion_20210228.nc", key(2021059, 25055), &b"FEB28"[..]);

        let first = Reconciler::new(CollisionPolicy::KeepFirst).reconcile(&[&source_a(), &b])?;
        assert_eq!(first.entries[&key(2021059, 25055)].origin.source, "a");
        assert_eq!(first.collisions[0].resolution, CollisionResolution::KeptFirst);

        let last = Reconciler::new(CollisionPolicy::KeepLast).reconcile(&[&source_a(), &b])?;
        assert_eq!(last.entries[&key(2021059, 25055)].origin.source, "b");
        assert_eq!(last.collisions[0].resolution, CollisionResolution::KeptLast);
        assert!(last.flagged_keys().is_empty());
        Ok(())
    }

    #[test]
    fn test_unreadable_artifacts_are_reported_not_fatal() -> Result<()> {
        let b = InMemoryProvider::new("b")
            .with_unreadable("dispersion_20210302.nc", "CDATE attribute missing")
            .with_artifact("dispersion_20210301.nc", key(2021060, 80000), &b"mar01"[..]);

        let outcome = Reconciler::default().reconcile(&[&source_a(), &b])?;

        assert_eq!(outcome.entries.len(), 3);
        assert_eq!(
            outcome.rejected,
            vec![RejectedArtifact {
                source: "b".to_string(),
                file_name: "dispersion_20210302.nc".to_string(),
                reason: "CDATE attribute missing".to_string(),
            }]
        );
        assert_eq!(
            outcome.sources[1],
            SourceSummary {
                source: "b".to_string(),
                scanned: 2,
                keyed: 1,
                rejected: 1,
            }
        );
        assert!(outcome.summary().contains("Rejected artifacts: 1"));
        Ok(())
    }

    #[test]
    fn test_reconcile_is_idempotent_over_its_own_output() -> Result<()> {
        let first = Reconciler::default().reconcile(&[&source_a()])?;
        let again = Reconciler::default().reconcile(&[&source_a(), &source_a()])?;

        assert_eq!(first.keys(), again.keys());
        assert_eq!(again.identical_duplicates, 2);
        Ok(())
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("flag".parse::<CollisionPolicy>(), Ok(CollisionPolicy::Flag));
        assert_eq!(
            "Keep-Last".parse::<CollisionPolicy>(),
            Ok(CollisionPolicy::KeepLast)
        );
        assert!("overwrite".parse::<CollisionPolicy>().is_err());
        assert_eq!(CollisionPolicy::KeepFirst.to_string(), "keep-first");
    }
}
