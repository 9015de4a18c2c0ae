//! Bundle failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("bundle I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("bundle archive is unreadable: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("bundle JSON member is malformed: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored bytes no longer hash to the manifest entry.
    #[error("'{path}' fails its checksum (manifest {expected}, archive {actual})")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A run artifact every bundle must carry is absent.
    #[error("run bundle lacks {0}")]
    MissingFile(String),

    #[error("bundle schema {version} is not readable by this build (reads {supported})")]
    UnsupportedVersion { version: String, supported: String },

    #[error("manifest is inconsistent: {0}")]
    CorruptedManifest(String),

    #[error("no member '{0}' in bundle")]
    FileNotFound(String),

    #[error("refusing to write a bundle with no artifacts")]
    EmptyBundle,
}

impl BundleError {
    /// True when the archive opened but its contents cannot be trusted.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            BundleError::ChecksumMismatch { .. }
                | BundleError::CorruptedManifest(_)
                | BundleError::MissingFile(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;
