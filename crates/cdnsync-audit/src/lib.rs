mod entry;
mod error;
mod sink;

use std::sync::Arc;

pub use entry::*;
pub use error::*;
pub use sink::*;

/// Shared handle to an audit log.
pub type AuditHandle = Arc<dyn AuditLog>;

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_fs_audit_appends() {
        let dir = tempdir().unwrap();
        let log = FsAuditLog::new(dir.path());
        log.record(&AuditEntry::new("jquery", "3.7.1", AuditStage::Processing, "optimized 4 files"))
            .unwrap();
        log.record(&AuditEntry::new("jquery", "3.7.1", AuditStage::Processing, "compressed 8 files"))
            .unwrap();

        let content =
            fs::read_to_string(dir.path().join("packages/j/jquery/3.7.1/processing.log")).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" optimized 4 files"));
        assert!(lines[1].ends_with(" compressed 8 files"));
    }

    #[test]
    fn test_best_effort_swallows_errors() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let log = FsAuditLog::new(&blocker);
        let entry = AuditEntry::new("a", "1.0.0", AuditStage::NewVersion, "detected");
        assert!(log.record(&entry).is_err());
        record_best_effort(&log, entry);
    }

    #[test]
    fn test_collector_audit() {
        let collector = Arc::new(CollectorAudit::default());
        let handle: AuditHandle = collector.clone();
        assert!(collector.is_empty());

        record_best_effort(
            handle.as_ref(),
            AuditEntry::new("a", "1.0.0", AuditStage::KvPublish, "published"),
        );
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.entries()[0].stage, AuditStage::KvPublish);
    }

    #[test]
    fn test_null_audit() {
        NullAudit
            .record(&AuditEntry::new("a", "1.0.0", AuditStage::NewVersion, "x"))
            .unwrap();
    }
}
