use std::{
    fs::OpenOptions,
    io::Write as _,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use cdnsync_utils::fs::ensure_dir_exists;
use tracing::warn;

use crate::{
    entry::AuditEntry,
    error::{AuditError, Result},
};

/// Destination of audit entries.
pub trait AuditLog: Send + Sync {
    fn record(&self, entry: &AuditEntry) -> Result<()>;
}

/// Records `entry`, logging instead of failing. Audit writes never block or
/// roll back the mutation they describe.
pub fn record_best_effort(log: &dyn AuditLog, entry: AuditEntry) {
    if let Err(err) = log.record(&entry) {
        warn!(
            "failed to record {} audit entry for {}@{}: {err}",
            entry.stage, entry.package, entry.version
        );
    }
}

/// Appends entries below a directory, usually a mounted bucket.
pub struct FsAuditLog {
    root: PathBuf,
}

impl FsAuditLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AuditLog for FsAuditLog {
    fn record(&self, entry: &AuditEntry) -> Result<()> {
        let path = self.root.join(entry.path());
        if let Some(parent) = path.parent() {
            ensure_dir_exists(parent).map_err(|err| {
                AuditError::Write {
                    path: parent.to_path_buf(),
                    reason: err.to_string(),
                }
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| {
                AuditError::Write {
                    path: path.clone(),
                    reason: err.to_string(),
                }
            })?;
        file.write_all(entry.line().as_bytes()).map_err(|err| {
            AuditError::Write {
                path,
                reason: err.to_string(),
            }
        })
    }
}

/// Discards every entry.
pub struct NullAudit;

impl AuditLog for NullAudit {
    fn record(&self, _entry: &AuditEntry) -> Result<()> {
        Ok(())
    }
}

/// Keeps entries in memory for inspection.
#[derive(Default)]
pub struct CollectorAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl CollectorAudit {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLog for CollectorAudit {
    fn record(&self, entry: &AuditEntry) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}
