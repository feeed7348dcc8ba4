use std::{fmt, path::PathBuf};

use cdnsync_utils::string::first_letter;
use chrono::{DateTime, SecondsFormat, Utc};

/// Externally visible mutations that are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStage {
    /// A new upstream version was detected.
    NewVersion,
    /// The version went through optimization and compression.
    Processing,
    /// The version's records were written to the KV store.
    KvPublish,
}

impl AuditStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStage::NewVersion => "new-version",
            AuditStage::Processing => "processing",
            AuditStage::KvPublish => "kv-publish",
        }
    }
}

impl fmt::Display for AuditStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub package: String,
    pub version: String,
    pub stage: AuditStage,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        package: impl Into<String>,
        version: impl Into<String>,
        stage: AuditStage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            stage,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// `packages/<first letter>/<name>/<version>/<stage>.log`
    pub fn path(&self) -> PathBuf {
        PathBuf::from("packages")
            .join(first_letter(&self.package))
            .join(&self.package)
            .join(&self.version)
            .join(format!("{}.log", self.stage))
    }

    pub fn line(&self) -> String {
        format!(
            "{} {}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.message
        )
    }
}
