//! Run bundle writer/reader for claimscope.
//!
//! A `.csb` bundle packages every artifact of one batch run so it can be
//! audited or re-scored later. The bundle is the tracking backend the
//! orchestrator hands its artifacts to.
//!
//! # Bundle Format
//!
//! Bundles are ZIP archives containing:
//! - `manifest.json`: metadata and a file listing with SHA-256 checksums
//! - `summary.json`: anomalous row indices, threshold, shape facts
//! - `params.json`: fit parameters (components, restarts, variance, percentile)
//! - `metrics.json`: run metrics (rows, widths, log-likelihood, diagnostics)
//! - `config.json`: configuration snapshot
//! - `model/mixture.json`: the fitted density model
//! - `anomalies.csv`: the anomalous-record subset
//!
//! # Example
//!
//! ```no_run
//! use cs_bundle::{BundleReader, BundleWriter};
//! use std::path::Path;
//!
//! let mut writer = BundleWriter::new("run-20260115-143022-a7xq", "host-abc");
//! writer.add_summary(&serde_json::json!({"anomalies": 3})).unwrap();
//! writer.write(Path::new("run.csb")).unwrap();
//!
//! let mut reader = BundleReader::open(Path::new("run.csb")).unwrap();
//! let summary: serde_json::Value = reader.read_summary().unwrap();
//! ```

pub mod error;
pub mod manifest;
pub mod reader;
pub mod writer;

pub use error::{BundleError, Result};
pub use manifest::{BundleManifest, FileEntry, BUNDLE_SCHEMA_VERSION, RUN_ARTIFACTS};
pub use reader::BundleReader;
pub use writer::{BundleWriter, FileType};

/// Well-known artifact paths inside a bundle.
pub mod paths {
    pub const MANIFEST: &str = "manifest.json";
    pub const SUMMARY: &str = "summary.json";
    pub const PARAMS: &str = "params.json";
    pub const METRICS: &str = "metrics.json";
    pub const CONFIG: &str = "config.json";
    pub const MODEL: &str = "model/mixture.json";
    pub const ANOMALIES: &str = "anomalies.csv";
}
