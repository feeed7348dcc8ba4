use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use cdnsync_audit::{record_best_effort, AuditEntry, AuditHandle, AuditStage};
use cdnsync_dl::StagedVersion;
use cdnsync_kv::repository::{PublishedFile, VersionsRepository};
use cdnsync_package::Package;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::{
    compress::{CompressionSummary, Compressor},
    error::{CoreError, CoreResult},
    message::{StageMessage, UploadMetadata, MESSAGE_FILE, UPLOAD_METADATA_FILE},
    sandbox::{prepare_output, relative_files, OptimizeReport, Sandbox},
};

/// A version whose files are optimized, compressed and hashed, ready for the
/// KV store.
#[derive(Debug, Clone)]
pub struct ProcessedVersion {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub output: PathBuf,
    /// Files as stored, compression suffix included.
    pub files: Vec<PublishedFile>,
    /// Logical file names, without compression suffixes.
    pub logical_files: Vec<String>,
    pub sri: BTreeMap<String, String>,
    pub optimize: OptimizeReport,
    pub compression: CompressionSummary,
}

/// Turns staged versions into publishable file sets.
pub struct Ingestor {
    sandbox: Box<dyn Sandbox>,
    compressor: Compressor,
    audit: AuditHandle,
}

impl Ingestor {
    pub fn new(sandbox: Box<dyn Sandbox>, workers: usize, audit: AuditHandle) -> Self {
        Self {
            sandbox,
            compressor: Compressor::new(workers),
            audit,
        }
    }

    /// Writes the stage message and upload metadata next to the staged
    /// files and returns the message path.
    pub fn stage_message(
        &self,
        package: &Package,
        staged: &StagedVersion,
    ) -> CoreResult<PathBuf> {
        let version_dir = version_dir(staged)?;
        let message = StageMessage::new(
            package,
            &staged.candidate.version,
            &staged.path,
            &version_dir.join("output"),
        )?;
        let path = version_dir.join(MESSAGE_FILE);
        message.write(&path)?;
        UploadMetadata::from_message(&message)?.write(&version_dir.join(UPLOAD_METADATA_FILE))?;
        Ok(path)
    }

    /// Optimizes and compresses a staged version described by its message.
    ///
    /// Sandbox errors fail the version. Individual optimizer and compression
    /// failures are logged and the affected files published as they are.
    pub fn process(
        &self,
        message_path: &Path,
        timestamp: DateTime<Utc>,
    ) -> CoreResult<ProcessedVersion> {
        let message = StageMessage::read(message_path)?;
        let input = PathBuf::from(&message.tar);
        let output = message
            .outgoing_signed_url
            .strip_prefix("file://")
            .map(PathBuf::from)
            .ok_or_else(|| {
                CoreError::InvalidMessage(format!(
                    "unsupported output location {}",
                    message.outgoing_signed_url
                ))
            })?;

        prepare_output(&output)?;
        let optimize = self.sandbox.optimize(&message, &input, &output)?;
        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                &message.package,
                &message.version,
                AuditStage::Processing,
                format!(
                    "{} sandbox optimized {} file(s), {} failed",
                    self.sandbox.name(),
                    optimize.optimized.len(),
                    optimize.failed.len()
                ),
            ),
        );

        let compression = self.compressor.compress_dir(&output)?;
        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                &message.package,
                &message.version,
                AuditStage::Processing,
                format!(
                    "compressed {} file(s), {} uncompressed, {} failed, {} integrity hash(es)",
                    compression.compressed.len(),
                    compression.skipped.len(),
                    compression.failed.len(),
                    compression.sri.len()
                ),
            ),
        );

        let names = relative_files(&output)?;
        let files = names
            .iter()
            .map(|name| {
                PublishedFile {
                    name: name.clone(),
                    path: output.join(name),
                }
            })
            .collect();
        let logical_files = VersionsRepository::published_names(&names);

        info!(
            "{}@{}: {} file(s) ready to publish",
            message.package,
            message.version,
            logical_files.len()
        );

        Ok(ProcessedVersion {
            version: message.version,
            timestamp,
            output,
            files,
            logical_files,
            sri: compression.sri.clone(),
            optimize,
            compression,
        })
    }

    pub fn ingest(
        &self,
        package: &Package,
        staged: &StagedVersion,
    ) -> CoreResult<ProcessedVersion> {
        let message = self.stage_message(package, staged)?;
        self.process(&message, staged.candidate.timestamp)
    }
}

fn version_dir(staged: &StagedVersion) -> CoreResult<PathBuf> {
    staged
        .path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            CoreError::Custom(format!(
                "staged path {} has no parent",
                staged.path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use cdnsync_audit::CollectorAudit;
    use cdnsync_config::OptimizeConfig;
    use cdnsync_dl::Candidate;
    use cdnsync_package::Optimization;
    use chrono::TimeZone;
    use tempfile::tempdir;

    use super::*;
    use crate::sandbox::LocalSandbox;

    fn commands() -> OptimizeConfig {
        OptimizeConfig {
            js: "cp {input} {output}".into(),
            css: String::new(),
            png: String::new(),
            jpg: String::new(),
        }
    }

    fn minified_js() -> Package {
        let mut pkg = Package::new("foo");
        pkg.optimization = Some(Optimization {
            js: true,
            ..Default::default()
        });
        pkg
    }

    fn staged(root: &Path) -> StagedVersion {
        let files_dir = root.join("foo/1.0.0/files");
        fs::create_dir_all(files_dir.join("dist")).unwrap();
        fs::write(files_dir.join("dist/foo.js"), b"var foo = 1;").unwrap();
        fs::write(files_dir.join("dist/logo.png"), b"png").unwrap();
        StagedVersion {
            candidate: Candidate::new(
                "1.0.0",
                Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
                "v1.0.0",
            ),
            path: files_dir,
            files: vec!["dist/foo.js".into(), "dist/logo.png".into()],
        }
    }

    #[test]
    fn test_ingest_pipeline() {
        let dir = tempdir().unwrap();
        let audit = Arc::new(CollectorAudit::default());
        let ingestor = Ingestor::new(
            Box::new(LocalSandbox::new(commands(), false)),
            2,
            audit.clone(),
        );
        let staged = staged(dir.path());

        let processed = ingestor.ingest(&minified_js(), &staged).unwrap();
        assert_eq!(
            processed.logical_files,
            vec!["dist/foo.js", "dist/foo.min.js", "dist/logo.png"]
        );
        let stored: Vec<_> = processed.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            stored,
            vec![
                "dist/foo.js.br",
                "dist/foo.js.gz",
                "dist/foo.min.js.br",
                "dist/foo.min.js.gz",
                "dist/logo.png",
            ]
        );
        assert!(processed.sri.contains_key("dist/foo.js"));
        assert!(processed.sri.contains_key("dist/foo.min.js"));
        assert!(staged.path.join("dist/foo.js").is_file());

        let version_dir = dir.path().join("foo/1.0.0");
        assert!(version_dir.join(MESSAGE_FILE).is_file());
        assert!(version_dir.join(UPLOAD_METADATA_FILE).is_file());

        let stages: Vec<_> = audit.entries().iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![AuditStage::Processing, AuditStage::Processing]);
    }

    #[test]
    fn test_reprocess_replaces_output() {
        let dir = tempdir().unwrap();
        let ingestor = Ingestor::new(
            Box::new(LocalSandbox::new(commands(), false)),
            1,
            Arc::new(CollectorAudit::default()),
        );
        let staged = staged(dir.path());
        let first = ingestor.ingest(&minified_js(), &staged).unwrap();
        let second = ingestor.ingest(&minified_js(), &staged).unwrap();
        assert_eq!(first.logical_files, second.logical_files);
        assert_eq!(first.sri, second.sri);
    }

    #[test]
    fn test_ingest_without_flags_publishes_originals() {
        let dir = tempdir().unwrap();
        let ingestor = Ingestor::new(
            Box::new(LocalSandbox::new(commands(), false)),
            1,
            Arc::new(CollectorAudit::default()),
        );
        let staged = staged(dir.path());

        let processed = ingestor.ingest(&Package::new("foo"), &staged).unwrap();
        assert_eq!(processed.logical_files, vec!["dist/foo.js", "dist/logo.png"]);
        assert!(processed.logical_files.iter().all(|f| !f.contains(".min.")));
        assert!(processed.sri.contains_key("dist/foo.js"));
    }
}
