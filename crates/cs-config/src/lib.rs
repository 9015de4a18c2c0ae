//! claimscope configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for the pipeline configuration file
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation
//! - Config snapshots for run bundles

pub mod pipeline;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use pipeline::{
    AnomalyConfig, ConfigOverrides, DateDifference, ExportSpace, MixtureConfig, PipelineConfig,
    ReductionConfig, SchemaConfig,
};
pub use resolve::{load_config, resolve_config, ConfigPath, ConfigSource, LoadedConfig};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
