//! Tracking collaborators that receive a finished run.
//!
//! The orchestrator calls [`RunReporter::report`] exactly once per
//! successful run. Implementations must either persist every artifact or
//! nothing.

use crate::pipeline::RunArtifacts;
use cs_bundle::{BundleError, BundleManifest, BundleWriter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("bundle export failed: {0}")]
    Bundle(#[from] BundleError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<ReportError> for cs_common::Error {
    fn from(err: ReportError) -> Self {
        cs_common::Error::ArtifactExport(err.to_string())
    }
}

/// Receives the artifacts of one run.
pub trait RunReporter {
    fn report(&mut self, artifacts: &RunArtifacts) -> Result<(), ReportError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl RunReporter for NullReporter {
    fn report(&mut self, _artifacts: &RunArtifacts) -> Result<(), ReportError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Keeps every reported run in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryReporter {
    runs: Vec<RunArtifacts>,
}

impl MemoryReporter {
    pub fn runs(&self) -> &[RunArtifacts] {
        &self.runs
    }

    pub fn last(&self) -> Option<&RunArtifacts> {
        self.runs.last()
    }
}

impl RunReporter for MemoryReporter {
    fn report(&mut self, artifacts: &RunArtifacts) -> Result<(), ReportError> {
        self.runs.push(artifacts.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Writes a run bundle, and optionally a standalone anomaly CSV.
///
/// The CSV is staged next to its destination and only renamed into place
/// once the bundle is written; if the rename fails the bundle is removed.
#[derive(Debug)]
pub struct BundleReporter {
    path: PathBuf,
    anomalies_csv: Option<PathBuf>,
    manifest: Option<BundleManifest>,
}

impl BundleReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            anomalies_csv: None,
            manifest: None,
        }
    }

    pub fn with_anomalies_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.anomalies_csv = Some(path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Manifest of the last bundle written.
    pub fn manifest(&self) -> Option<&BundleManifest> {
        self.manifest.as_ref()
    }

    fn build(artifacts: &RunArtifacts) -> Result<BundleWriter, ReportError> {
        let mut writer = BundleWriter::new(artifacts.run_id.as_str(), artifacts.host_id.as_str())
            .with_tool_version(env!("CARGO_PKG_VERSION"))
            .with_description(format!(
                "{} anomalous of {} records",
                artifacts.metrics.anomaly_count, artifacts.metrics.rows
            ));
        writer.add_params(&artifacts.params)?;
        writer.add_metrics(&artifacts.metrics)?;
        writer.add_summary(&artifacts.summary)?;
        writer.add_config(&artifacts.config)?;
        writer.add_model(artifacts.model_json.clone());
        writer.add_anomalies(artifacts.anomalies_csv.clone());
        Ok(writer)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "anomalies.csv".to_string());
    path.with_file_name(format!(".{}.partial-{}", name, std::process::id()))
}

impl RunReporter for BundleReporter {
    fn report(&mut self, artifacts: &RunArtifacts) -> Result<(), ReportError> {
        let staged = match &self.anomalies_csv {
            Some(dest) => {
                let tmp = staging_path(dest);
                fs::write(&tmp, &artifacts.anomalies_csv).map_err(|source| {
                    let _ = fs::remove_file(&tmp);
                    ReportError::Write {
                        path: dest.clone(),
                        source,
                    }
                })?;
                Some((tmp, dest.clone()))
            }
            None => None,
        };

        let manifest = match Self::build(artifacts)
            .and_then(|w| w.write(&self.path).map_err(ReportError::from))
        {
            Ok(m) => m,
            Err(e) => {
                if let Some((tmp, _)) = &staged {
                    let _ = fs::remove_file(tmp);
                }
                return Err(e);
            }
        };

        if let Some((tmp, dest)) = staged {
            if let Err(source) = fs::rename(&tmp, &dest) {
                let _ = fs::remove_file(&tmp);
                let _ = fs::remove_file(&self.path);
                return Err(ReportError::Write { path: dest, source });
            }
            debug!(path = %dest.display(), "anomaly table written");
        }

        info!(
            path = %self.path.display(),
            files = manifest.file_count(),
            bytes = manifest.total_bytes(),
            "run bundle exported"
        );
        self.manifest = Some(manifest);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "bundle"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::table::{Column, RecordTable};
    use cs_bundle::{paths, BundleReader};
    use cs_config::{ConfigSnapshot, PipelineConfig};
    use tempfile::TempDir;

    fn run_into(reporter: &mut dyn RunReporter) -> cs_common::Result<crate::pipeline::RunOutcome> {
        let mut config = PipelineConfig::default();
        config.mixture.n_components = 1;
        config.mixture.n_init = 1;
        config.mixture.seed = Some(4);
        let x: Vec<f64> = (0..30).map(|i| (i as f64).sqrt()).collect();
        let y: Vec<f64> = (0..30).map(|i| ((i * 5) % 9) as f64).collect();
        let table =
            RecordTable::from_columns(vec![Column::numeric("x", x), Column::numeric("y", y)])
                .unwrap();
        Pipeline::new(config, ConfigSnapshot::defaults_only()).run(table, reporter)
    }

    #[test]
    fn test_bundle_contains_all_artifacts() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("run.csb");
        let csv = dir.path().join("anomalies.csv");
        let mut reporter = BundleReporter::new(&bundle).with_anomalies_csv(&csv);
        let outcome = run_into(&mut reporter).unwrap();

        let mut reader = BundleReader::open(&bundle).unwrap();
        assert_eq!(reader.run_id(), outcome.run_id.as_str());
        assert!(reader.verify_all().is_empty());
        for path in [
            paths::SUMMARY,
            paths::PARAMS,
            paths::METRICS,
            paths::CONFIG,
            paths::MODEL,
            paths::ANOMALIES,
        ] {
            assert!(reader.has_file(path), "missing {path}");
        }
        let standalone = fs::read(&csv).unwrap();
        assert_eq!(standalone, reader.read_anomalies().unwrap());
        assert!(reporter.manifest().is_some());
    }

    #[test]
    fn test_unwritable_destination_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("missing-dir").join("run.csb");
        let csv = dir.path().join("anomalies.csv");
        let mut reporter = BundleReporter::new(&bundle).with_anomalies_csv(&csv);
        let err = run_into(&mut reporter).unwrap_err();
        assert!(matches!(err, cs_common::Error::ArtifactExport(_)));
        assert!(!csv.exists());
        assert!(!bundle.exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_null_and_memory_reporters() {
        let mut null = NullReporter;
        assert!(run_into(&mut null).is_ok());

        let mut memory = MemoryReporter::default();
        run_into(&mut memory).unwrap();
        run_into(&mut memory).unwrap();
        assert_eq!(memory.runs().len(), 2);
        assert_eq!(memory.name(), "memory");
    }
}
