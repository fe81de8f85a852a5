//! Immutable version snapshots.

use std::path::Path;

use chrono::{DateTime, Utc};
use grimoire_core::{Document, ResolvedDocument};
use grimoire_validate::ValidationReport;
use serde::Serialize;

/// An immutable, timestamped snapshot of a parsed-and-validated document for
/// one path. Published by replacement; a version handed to a reader is never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonVersion {
    /// Derived from the path's file stem plus creation time and load
    /// sequence, unique across the store's lifetime.
    pub id: String,
    pub resolved: ResolvedDocument,
    /// blake3 digest of the raw file content; used to short-circuit reloads
    /// when a filesystem event fires without a real content change.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub report: ValidationReport,
}

impl CanonVersion {
    pub fn document(&self) -> &Document {
        &self.resolved.document
    }

    pub fn is_valid(&self) -> bool {
        self.report.is_valid()
    }
}

pub fn content_hash(raw: &str) -> String {
    blake3::hash(raw.as_bytes()).to_hex().to_string()
}

pub fn version_id(path: &Path, created_at: DateTime<Utc>, seq: u64) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "canon".to_string());
    format!("{}@{}-{}", stem, created_at.timestamp_millis(), seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_content_addressed() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }

    #[test]
    fn test_version_id_shape() {
        let at = Utc::now();
        let id = version_id(Path::new("/tmp/world.md"), at, 3);
        assert!(id.starts_with("world@"));
        assert!(id.ends_with("-3"));
    }

    #[test]
    fn test_version_ids_distinct_across_sequence() {
        let at = Utc::now();
        let a = version_id(Path::new("w.md"), at, 1);
        let b = version_id(Path::new("w.md"), at, 2);
        assert_ne!(a, b);
    }
}
