//! Bundle writer for creating .csb files.
//!
//! Creates ZIP archives with manifest and checksums. Writing to a path is
//! all-or-nothing: the archive is assembled in a temporary sibling file and
//! renamed into place only once it is complete.

use crate::{paths, BundleError, BundleManifest, FileEntry, Result};
use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// File type hints for MIME type assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Json,
    Csv,
    Log,
    Binary,
}

impl FileType {
    pub fn mime_type(&self) -> &'static str {
        match self {
            FileType::Json => "application/json",
            FileType::Csv => "text/csv",
            FileType::Log => "application/x-ndjson",
            FileType::Binary => "application/octet-stream",
        }
    }

    pub fn from_path(path: &str) -> Self {
        if path.ends_with(".jsonl") {
            FileType::Log
        } else if path.ends_with(".json") {
            FileType::Json
        } else if path.ends_with(".csv") {
            FileType::Csv
        } else {
            FileType::Binary
        }
    }
}

/// Builder for creating .csb run bundles.
pub struct BundleWriter {
    manifest: BundleManifest,
    files: Vec<(String, Vec<u8>)>,
}

impl BundleWriter {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        Self {
            manifest: BundleManifest::new(run_id, host_id),
            files: Vec::new(),
        }
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.manifest = self.manifest.with_tool_version(version);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.manifest = self.manifest.with_description(description);
        self
    }

    /// Add a file to the bundle with automatic checksum.
    ///
    /// A second file at an existing path replaces the first.
    pub fn add_file(&mut self, path: impl Into<String>, data: Vec<u8>, file_type: Option<FileType>) {
        let path = path.into();
        let file_type = file_type.unwrap_or_else(|| FileType::from_path(&path));
        let bytes = data.len() as u64;
        let entry = FileEntry::new(&path, FileEntry::compute_checksum(&data), bytes)
            .with_mime_type(file_type.mime_type());

        if let Some(pos) = self.files.iter().position(|(p, _)| *p == path) {
            warn!(path = %path, "Replacing file already added to bundle");
            self.files.remove(pos);
            self.manifest.files.retain(|f| f.path != path);
        }

        debug!(path = %path, bytes, "Added file to bundle");
        self.manifest.add_file(entry);
        self.files.push((path, data));
    }

    /// Add a JSON-serializable value as a file.
    pub fn add_json<T: serde::Serialize>(&mut self, path: impl Into<String>, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        self.add_file(path, json.into_bytes(), Some(FileType::Json));
        Ok(())
    }

    pub fn add_summary<T: serde::Serialize>(&mut self, summary: &T) -> Result<()> {
        self.add_json(paths::SUMMARY, summary)
    }

    pub fn add_params<T: serde::Serialize>(&mut self, params: &T) -> Result<()> {
        self.add_json(paths::PARAMS, params)
    }

    pub fn add_metrics<T: serde::Serialize>(&mut self, metrics: &T) -> Result<()> {
        self.add_json(paths::METRICS, metrics)
    }

    pub fn add_config<T: serde::Serialize>(&mut self, snapshot: &T) -> Result<()> {
        self.add_json(paths::CONFIG, snapshot)
    }

    /// Add the serialized density model.
    pub fn add_model(&mut self, model_json: Vec<u8>) {
        self.add_file(paths::MODEL, model_json, Some(FileType::Json));
    }

    /// Add the anomalous-record table.
    pub fn add_anomalies(&mut self, csv: Vec<u8>) {
        self.add_file(paths::ANOMALIES, csv, Some(FileType::Csv));
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    /// Get total size in bytes before compression.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|(_, data)| data.len() as u64).sum()
    }

    /// Get file count (not including manifest).
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Write the bundle to a file.
    ///
    /// On any failure the destination is left untouched and the temporary
    /// file is removed.
    pub fn write(mut self, path: &Path) -> Result<BundleManifest> {
        self.prepare()?;

        let tmp = temp_sibling(path);
        let result = File::create(&tmp)
            .map_err(BundleError::from)
            .and_then(|file| self.write_archive(file))
            .and_then(|file| {
                file.sync_all()?;
                Ok(())
            })
            .and_then(|()| std::fs::rename(&tmp, path).map_err(BundleError::from));

        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        info!(
            path = %path.display(),
            run_id = %self.manifest.run_id,
            files = self.files.len(),
            bytes = self.total_bytes(),
            "Bundle written"
        );

        Ok(self.manifest)
    }

    /// Write the bundle to a byte vector (for in-memory use).
    pub fn write_to_vec(mut self) -> Result<(Vec<u8>, BundleManifest)> {
        self.prepare()?;
        let bytes = self.write_archive(Cursor::new(Vec::new()))?.into_inner();

        info!(
            files = self.files.len(),
            compressed_bytes = bytes.len(),
            uncompressed_bytes = self.total_bytes(),
            "Bundle written to memory"
        );

        Ok((bytes, self.manifest))
    }

    fn prepare(&mut self) -> Result<()> {
        if self.files.is_empty() {
            return Err(BundleError::EmptyBundle);
        }
        self.manifest.sort_files();
        self.files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(())
    }

    fn write_archive<W: Write + Seek>(&self, sink: W) -> Result<W> {
        let manifest_json = self.manifest.to_json()?;

        let mut zip = ZipWriter::new(sink);
        let options: FileOptions<'_, ()> = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        // Manifest first
        zip.start_file(paths::MANIFEST, options)?;
        zip.write_all(manifest_json.as_bytes())?;

        for (file_path, data) in &self.files {
            zip.start_file(file_path.as_str(), options)?;
            zip.write_all(data)?;
        }

        Ok(zip.finish()?)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bundle".to_string());
    path.with_file_name(format!(".{}.partial-{}", name, std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RUN: &str = "run-20260115-143022-a7xq";

    #[test]
    fn test_bundle_writer_new() {
        let writer = BundleWriter::new(RUN, "host-abc");
        assert_eq!(writer.manifest().run_id, RUN);
        assert_eq!(writer.file_count(), 0);
    }

    #[test]
    fn test_bundle_writer_typed_adds() {
        let mut writer = BundleWriter::new(RUN, "host-abc");
        writer.add_summary(&serde_json::json!({"anomalies": [3, 17]})).unwrap();
        writer.add_params(&serde_json::json!({"n_components": 5})).unwrap();
        writer.add_anomalies(b"pc_0\n-4.2\n".to_vec());
        writer.add_model(b"{}".to_vec());

        assert_eq!(writer.file_count(), 4);
        let csv = writer.manifest().find_file(paths::ANOMALIES).unwrap();
        assert_eq!(csv.mime_type.as_deref(), Some("text/csv"));
        let model = writer.manifest().find_file(paths::MODEL).unwrap();
        assert_eq!(model.mime_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn test_bundle_writer_replaces_duplicate_path() {
        let mut writer = BundleWriter::new(RUN, "host-abc");
        writer.add_file("a.txt", b"one".to_vec(), None);
        writer.add_file("a.txt", b"three".to_vec(), None);

        assert_eq!(writer.file_count(), 1);
        assert_eq!(writer.manifest().file_count(), 1);
        assert_eq!(writer.total_bytes(), 5);
    }

    #[test]
    fn test_bundle_writer_write_empty_fails() {
        let writer = BundleWriter::new(RUN, "host-abc");
        assert!(matches!(writer.write_to_vec(), Err(BundleError::EmptyBundle)));
    }

    #[test]
    fn test_bundle_writer_write_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let bundle_path = temp_dir.path().join("run.csb");

        let mut writer = BundleWriter::new(RUN, "host-abc").with_tool_version("0.1.0");
        writer.add_summary(&serde_json::json!({"total": 42})).unwrap();
        writer.add_file("data.txt", b"test data".to_vec(), None);

        let manifest = writer.write(&bundle_path).unwrap();

        assert!(bundle_path.exists());
        assert_eq!(manifest.file_count(), 2);
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().contains(".partial-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_bundle_writer_failed_write_leaves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let bundle_path = temp_dir.path().join("missing-dir").join("run.csb");

        let mut writer = BundleWriter::new(RUN, "host-abc");
        writer.add_file("data.txt", b"x".to_vec(), None);

        assert!(writer.write(&bundle_path).is_err());
        assert!(!bundle_path.exists());
    }

    #[test]
    fn test_bundle_writer_write_to_vec() {
        let mut writer = BundleWriter::new(RUN, "host-abc");
        writer.add_summary(&serde_json::json!({"total": 42})).unwrap();

        let (bytes, manifest) = writer.write_to_vec().unwrap();
        assert_eq!(manifest.file_count(), 1);
        assert_eq!(&bytes[0..2], b"PK");
    }

    #[test]
    fn test_bundle_writer_deterministic_order() {
        let mut writer1 = BundleWriter::new(RUN, "host");
        writer1.add_file("z.txt", b"z".to_vec(), None);
        writer1.add_file("a.txt", b"a".to_vec(), None);

        let mut writer2 = BundleWriter::new(RUN, "host");
        writer2.add_file("a.txt", b"a".to_vec(), None);
        writer2.add_file("z.txt", b"z".to_vec(), None);

        let (_, manifest1) = writer1.write_to_vec().unwrap();
        let (_, manifest2) = writer2.write_to_vec().unwrap();

        let paths1: Vec<_> = manifest1.files.iter().map(|f| &f.path).collect();
        let paths2: Vec<_> = manifest2.files.iter().map(|f| &f.path).collect();
        assert_eq!(paths1, paths2);
        assert_eq!(paths1, vec!["a.txt", "z.txt"]);
    }

    #[test]
    fn test_file_type_from_path() {
        assert_eq!(FileType::from_path("params.json"), FileType::Json);
        assert_eq!(FileType::from_path("events.jsonl"), FileType::Log);
        assert_eq!(FileType::from_path("anomalies.csv"), FileType::Csv);
        assert_eq!(FileType::from_path("blob.bin"), FileType::Binary);
    }
}
