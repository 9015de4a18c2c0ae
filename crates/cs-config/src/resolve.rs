//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variable → XDG path → defaults.

use crate::pipeline::{ConfigOverrides, PipelineConfig};
use crate::snapshot::ConfigSnapshot;
use crate::validate::{validate_config, ValidationError, ValidationResult};
use std::path::{Path, PathBuf};

/// Where the configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via `--config`.
    CliArgument,

    /// Set via `CLAIMSCOPE_CONFIG`.
    Environment,

    /// Found in the XDG config directory.
    XdgConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// A resolved configuration location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPath {
    /// File to load, or `None` for built-in defaults.
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

pub const ENV_CONFIG_PATH: &str = "CLAIMSCOPE_CONFIG";

const CONFIG_FILENAME: &str = "config.json";

const APP_NAME: &str = "claimscope";

/// Resolve the configuration file path.
///
/// An explicit CLI path is returned even when it does not exist, so the
/// caller fails loudly instead of silently falling back to defaults. The
/// environment variable and XDG locations are only used when the file is
/// present.
pub fn resolve_config(cli_path: Option<&Path>) -> ConfigPath {
    if let Some(path) = cli_path {
        return ConfigPath {
            path: Some(path.to_path_buf()),
            source: ConfigSource::CliArgument,
        };
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return ConfigPath {
                path: Some(path),
                source: ConfigSource::Environment,
            };
        }
        tracing::debug!(path = %path.display(), "CLAIMSCOPE_CONFIG points at a missing file; ignoring");
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            return ConfigPath {
                path: Some(path),
                source: ConfigSource::XdgConfig,
            };
        }
    }

    ConfigPath::default()
}

/// Effective configuration together with its provenance snapshot.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PipelineConfig,
    pub snapshot: ConfigSnapshot,
}

/// Resolve, load, apply overrides and validate.
pub fn load_config(
    cli_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> ValidationResult<LoadedConfig> {
    let resolved = resolve_config(cli_path);
    let (base, raw) = match &resolved.path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
            })?;
            (PipelineConfig::from_json(&raw)?, Some(raw))
        }
        None => (PipelineConfig::default(), None),
    };

    let config = base.with_overrides(overrides);
    validate_config(&config)?;
    tracing::debug!(source = %resolved.source, "configuration resolved");

    let snapshot = ConfigSnapshot::new(&config, &resolved, raw.as_deref());
    Ok(LoadedConfig { config, snapshot })
}

/// Get the XDG config directory for claimscope.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}
