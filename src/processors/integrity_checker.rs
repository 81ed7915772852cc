use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::archive::FileListing;
use crate::error::Result;

/// Names a source holds that the destination lacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceAudit {
    pub source: String,
    pub checked: usize,
    /// Sorted file names.
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnionAudit {
    pub destination: String,
    pub destination_files: usize,
    pub sources: Vec<SourceAudit>,
}

impl UnionAudit {
    pub fn is_complete(&self) -> bool {
        self.sources.iter().all(|s| s.missing.is_empty())
    }

    pub fn missing_for(&self, source: &str) -> Option<&[String]> {
        self.sources
            .iter()
            .find(|s| s.source == source)
            .map(|s| s.missing.as_slice())
    }

    pub fn total_missing(&self) -> usize {
        self.sources.iter().map(|s| s.missing.len()).sum()
    }
}

/// Checks that a destination archive is a superset of every source it was built from.
pub struct UnionVerifier {
    max_listed: usize,
}

impl UnionVerifier {
    pub fn new() -> Self {
        Self { max_listed: 20 }
    }

    /// Cap on missing names printed per source in the summary.
    pub fn with_max_listed(mut self, max_listed: usize) -> Self {
        self.max_listed = max_listed;
        self
    }

    pub fn verify(
        &self,
        sources: &[&dyn FileListing],
        destination: &dyn FileListing,
    ) -> Result<UnionAudit> {
        let destination_names: HashSet<String> = destination.file_names()?.into_iter().collect();

        let mut audits = Vec::with_capacity(sources.len());
        for source in sources {
            let names = source.file_names()?;
            let mut missing: Vec<String> = names
                .iter()
                .filter(|name| !destination_names.contains(*name))
                .cloned()
                .collect();
            missing.sort();

            if missing.is_empty() {
                info!(source = source.label(), checked = names.len(), "Source fully contained");
            } else {
                warn!(
                    source = source.label(),
                    missing = missing.len(),
                    "Source has files absent from destination"
                );
            }

            audits.push(SourceAudit {
                source: source.label().to_string(),
                checked: names.len(),
                missing,
            });
        }

        Ok(UnionAudit {
            destination: destination.label().to_string(),
            destination_files: destination_names.len(),
            sources: audits,
        })
    }

    pub fn generate_summary(&self, audit: &UnionAudit) -> String {
        let mut summary = String::new();

        summary.push_str("=== Union Verification Report ===\n");
        summary.push_str(&format!(
            "Destination: {} ({} files)\n",
            audit.destination, audit.destination_files
        ));

        for source in &audit.sources {
            summary.push_str(&format!(
                "\n{}: {} checked, {} missing\n",
                source.source,
                source.checked,
                source.missing.len()
            ));
            for name in source.missing.iter().take(self.max_listed) {
                summary.push_str(&format!("  - {}\n", name));
            }
            if source.missing.len() > self.max_listed {
                summary.push_str(&format!(
                    "  ... and {} more\n",
                    source.missing.len() - self.max_listed
                ));
            }
        }

        summary.push_str(&format!(
            "\nResult: {}\n",
            if audit.is_complete() {
                "destination contains every source file".to_string()
            } else {
                format!("{} files missing from destination", audit.total_missing())
            }
        ));

        summary
    }
}

impl Default for UnionVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Per source, the names present there but absent from `destination`.
pub fn verify_union(
    sources: &[&dyn FileListing],
    destination: &dyn FileListing,
) -> Result<UnionAudit> {
    UnionVerifier::new().verify(sources, destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::InMemoryProvider;
    use crate::models::PackedTimestamp;
    use pretty_assertions::assert_eq;

    fn listing(label: &str, names: &[&str]) -> InMemoryProvider {
        let key = PackedTimestamp::new(2021059, 25055).unwrap();
        names
            .iter()
            .fold(InMemoryProvider::new(label), |p, name| {
                p.with_artifact(*name, key, name.as_bytes().to_vec())
            })
    }

    #[test]
    fn test_superset_destination_is_complete() -> Result<()> {
        let a = listing("a", &["dispersion_2021059_025055.nc", "dispersion_2021060_000000.nc"]);
        let b = listing("b", &["dispersion_2021060_000000.nc"]);
        let dest = listing(
            "dest",
            &[
                "dispersion_2021059_025055.nc",
                "dispersion_2021060_000000.nc",
                "dispersion_2021061_000000.nc",
            ],
        );

        let audit = verify_union(&[&a, &b], &dest)?;
        assert!(audit.is_complete());
        assert_eq!(audit.missing_for("a"), Some(&[][..]));
        assert_eq!(audit.missing_for("b"), Some(&[][..]));
        assert_eq!(audit.destination_files, 3);
        Ok(())
    }

    #[test]
    fn test_one_uncopied_file_is_reported_under_its_source() -> Result<()> {
        let a = listing("a", &["dispersion_2021059_025055.nc"]);
        let b = listing("b", &["dispersion_2021060_000000.nc", "dispersion_2021062_000000.nc"]);
        let dest = listing(
            "dest",
            &["dispersion_2021059_025055.nc", "dispersion_2021060_000000.nc"],
        );

        let audit = verify_union(&[&a, &b], &dest)?;
        assert!(!audit.is_complete());
        assert_eq!(audit.total_missing(), 1);
        assert_eq!(audit.missing_for("a"), Some(&[][..]));
        assert_eq!(
            audit.missing_for("b"),
            Some(&["dispersion_2021062_000000.nc".to_string()][..])
        );

        let summary = UnionVerifier::new().generate_summary(&audit);
        assert!(summary.contains("dispersion_2021062_000000.nc"));
        assert!(summary.contains("1 files missing from destination"));
        Ok(())
    }

    #[test]
    fn test_summary_truncates_long_lists() -> Result<()> {
        let names: Vec<String> = (0..5).map(|i| format!("dispersion_20210{}01.nc", i + 1)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let a = listing("a", &refs);
        let dest = listing("dest", &[]);

        let verifier = UnionVerifier::new().with_max_listed(2);
        let audit = verifier.verify(&[&a], &dest)?;
        assert!(verifier.generate_summary(&audit).contains("... and 3 more"));
        Ok(())
    }
}
