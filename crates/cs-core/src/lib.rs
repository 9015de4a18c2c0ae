//! claimscope core library
//!
//! Batch anomaly detection over tabular claims records:
//! - Record table ingest and CSV export
//! - Column classification into semantic roles
//! - Feature normalization into a purely numeric table
//! - Standardize, impute and project onto principal axes
//! - Gaussian mixture density scoring with a percentile cut-off
//! - Run orchestration and artifact reporting
//!
//! The binary entry point is in `main.rs`.

pub mod classify;
pub mod exit_codes;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod reduce;
pub mod report;
pub mod score;
pub mod table;

pub use pipeline::{Pipeline, RunArtifacts, RunOutcome};
pub use report::{BundleReporter, MemoryReporter, NullReporter, ReportError, RunReporter};
