//! Bundle manifest types and serialization.
//!
//! The manifest is the source of truth for a bundle's contents: run
//! identity, tool version and a SHA-256 checksum for every artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::paths;

pub const BUNDLE_SCHEMA_VERSION: &str = "1.0.0";

/// Members every complete run bundle carries, in export order.
pub const RUN_ARTIFACTS: &[&str] = &[
    paths::SUMMARY,
    paths::PARAMS,
    paths::METRICS,
    paths::CONFIG,
    paths::MODEL,
    paths::ANOMALIES,
];

/// Run identity plus one checksummed entry per archived artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub bundle_version: String,

    pub created_at: DateTime<Utc>,

    /// Run this bundle was produced by.
    pub run_id: String,

    /// Host ID (hashed).
    pub host_id: String,

    /// Files included in the bundle with checksums.
    pub files: Vec<FileEntry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// claimscope version that created this bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
}

impl BundleManifest {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        Self {
            bundle_version: BUNDLE_SCHEMA_VERSION.to_string(),
            created_at: Utc::now(),
            run_id: run_id.into(),
            host_id: host_id.into(),
            files: Vec::new(),
            description: None,
            tool_version: None,
        }
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = Some(version.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_file(&mut self, entry: FileEntry) {
        self.files.push(entry);
    }

    /// Uncompressed size of all artifacts.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn find_file(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Run artifacts the manifest does not list.
    ///
    /// A bundle with gaps still opens; `inspect` reports them.
    pub fn missing_artifacts(&self) -> Vec<&'static str> {
        RUN_ARTIFACTS
            .iter()
            .copied()
            .filter(|path| self.find_file(path).is_none())
            .collect()
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.bundle_version != BUNDLE_SCHEMA_VERSION {
            return Err(crate::BundleError::UnsupportedVersion {
                version: self.bundle_version.clone(),
                supported: BUNDLE_SCHEMA_VERSION.to_string(),
            });
        }

        if self.run_id.is_empty() {
            return Err(crate::BundleError::CorruptedManifest(
                "run_id is empty".to_string(),
            ));
        }

        if self.host_id.is_empty() {
            return Err(crate::BundleError::CorruptedManifest(
                "host_id is empty".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for file in &self.files {
            if file.path.is_empty() {
                return Err(crate::BundleError::CorruptedManifest(
                    "file entry has empty path".to_string(),
                ));
            }
            if file.sha256.len() != 64 || !file.sha256.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(crate::BundleError::CorruptedManifest(format!(
                    "file '{}' has invalid checksum",
                    file.path
                )));
            }
            if !seen.insert(file.path.as_str()) {
                return Err(crate::BundleError::CorruptedManifest(format!(
                    "file '{}' listed twice",
                    file.path
                )));
            }
        }

        Ok(())
    }

    pub fn sort_files(&mut self) {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One archived artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path within the bundle (relative).
    pub path: String,

    /// SHA-256 checksum (64 hex characters).
    pub sha256: String,

    pub bytes: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, sha256: impl Into<String>, bytes: u64) -> Self {
        Self {
            path: path.into(),
            sha256: sha256.into(),
            bytes,
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Lowercase hex SHA-256.
    pub fn compute_checksum(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute_checksum(data) == self.sha256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN: &str = "run-20260115-143022-a7xq";

    #[test]
    fn test_manifest_new() {
        let manifest = BundleManifest::new(RUN, "host-abc")
            .with_tool_version("0.1.0")
            .with_description("nightly claims batch");

        assert_eq!(manifest.run_id, RUN);
        assert_eq!(manifest.bundle_version, BUNDLE_SCHEMA_VERSION);
        assert_eq!(manifest.tool_version.as_deref(), Some("0.1.0"));
        assert_eq!(manifest.description.as_deref(), Some("nightly claims batch"));
    }

    #[test]
    fn test_manifest_totals_and_lookup() {
        let mut manifest = BundleManifest::new(RUN, "host-abc");
        manifest.add_file(FileEntry::new("summary.json", "a".repeat(64), 100));
        manifest.add_file(FileEntry::new("anomalies.csv", "b".repeat(64), 250));

        assert_eq!(manifest.file_count(), 2);
        assert_eq!(manifest.total_bytes(), 350);
        assert!(manifest.find_file("anomalies.csv").is_some());
        assert!(manifest.find_file("model/mixture.json").is_none());
    }

    #[test]
    fn test_missing_artifacts() {
        let mut manifest = BundleManifest::new(RUN, "host-abc");
        assert_eq!(manifest.missing_artifacts(), RUN_ARTIFACTS.to_vec());
        for path in RUN_ARTIFACTS {
            manifest.add_file(FileEntry::new(*path, "a".repeat(64), 1));
        }
        assert!(manifest.missing_artifacts().is_empty());

        manifest.files.retain(|f| f.path != paths::MODEL);
        assert_eq!(manifest.missing_artifacts(), vec![paths::MODEL]);
    }

    #[test]
    fn test_manifest_sort_files() {
        let mut manifest = BundleManifest::new(RUN, "host-abc");
        manifest.add_file(FileEntry::new("summary.json", "a".repeat(64), 1));
        manifest.add_file(FileEntry::new("anomalies.csv", "b".repeat(64), 1));
        manifest.add_file(FileEntry::new("model/mixture.json", "c".repeat(64), 1));
        manifest.sort_files();

        let paths: Vec<_> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["anomalies.csv", "model/mixture.json", "summary.json"]);
    }

    #[test]
    fn test_manifest_validate() {
        let mut manifest = BundleManifest::new(RUN, "host-abc");
        manifest.add_file(FileEntry::new("params.json", "a".repeat(64), 10));
        assert!(manifest.validate().is_ok());

        assert!(BundleManifest::new("", "host-abc").validate().is_err());

        let mut bad = BundleManifest::new(RUN, "host-abc");
        bad.add_file(FileEntry::new("params.json", "zz".repeat(32), 10));
        assert!(bad.validate().is_err());

        let mut dup = BundleManifest::new(RUN, "host-abc");
        dup.add_file(FileEntry::new("params.json", "a".repeat(64), 10));
        dup.add_file(FileEntry::new("params.json", "a".repeat(64), 10));
        assert!(matches!(
            dup.validate(),
            Err(crate::BundleError::CorruptedManifest(_))
        ));
    }

    #[test]
    fn test_manifest_version_check() {
        let mut manifest = BundleManifest::new(RUN, "host-abc");
        manifest.bundle_version = "9.9.9".into();
        assert!(matches!(
            manifest.validate(),
            Err(crate::BundleError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_file_entry_verify() {
        let data = b"pc_0,pc_1\n-12.5,3.1\n";
        let entry = FileEntry::new(
            "anomalies.csv",
            FileEntry::compute_checksum(data),
            data.len() as u64,
        )
        .with_mime_type("text/csv");

        assert!(entry.verify(data));
        assert!(!entry.verify(b"pc_0\n"));
        assert_eq!(entry.mime_type.as_deref(), Some("text/csv"));
    }

    #[test]
    fn test_known_checksum() {
        assert_eq!(
            FileEntry::compute_checksum(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
