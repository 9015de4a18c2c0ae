//! Configuration snapshots for run bundles.
//!
//! A snapshot captures the exact configuration a run used, so its
//! anomaly set can be audited and reproduced later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::pipeline::PipelineConfig;
use crate::resolve::{ConfigPath, ConfigSource};

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub timestamp: DateTime<Utc>,

    pub schema_version: String,

    /// Path the configuration was loaded from.
    #[serde(default)]
    pub path: Option<String>,

    pub source: String,

    /// SHA-256 of the raw file content, when a file was read.
    #[serde(default)]
    pub file_hash: Option<String>,

    /// SHA-256 of the effective configuration after overrides.
    pub effective_hash: String,

    /// Effective values the run used.
    pub effective: PipelineConfig,
}

impl ConfigSnapshot {
    pub fn new(effective: &PipelineConfig, resolved: &ConfigPath, raw: Option<&str>) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            path: resolved.path.as_ref().map(|p| p.display().to_string()),
            source: resolved.source.to_string(),
            file_hash: raw.map(hash_content),
            effective_hash: effective_hash(effective),
            effective: effective.clone(),
        }
    }

    /// Create a snapshot for built-in defaults (no file loaded).
    pub fn defaults_only() -> Self {
        let resolved = ConfigPath {
            path: None,
            source: ConfigSource::BuiltinDefault,
        };
        Self::new(&PipelineConfig::default(), &resolved, None)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if this snapshot describes the same effective configuration.
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.effective_hash == other.effective_hash
    }

    /// First 12 characters of the effective hash.
    pub fn short_id(&self) -> &str {
        &self.effective_hash[..12.min(self.effective_hash.len())]
    }
}

fn effective_hash(config: &PipelineConfig) -> String {
    // Field order is fixed by the struct definition, so compact JSON is stable.
    let canonical = serde_json::to_string(config).unwrap_or_default();
    hash_content(&canonical)
}

/// Hash content with SHA-256 and return hex string.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
