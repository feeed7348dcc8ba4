use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// A release reported by an upstream source. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// Tarball URL for npm, tag name for git.
    pub locator: String,
}

impl Candidate {
    pub fn new(
        version: impl Into<String>,
        timestamp: DateTime<Utc>,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            timestamp,
            locator: locator.into(),
        }
    }
}

/// A candidate whose fileMap selection has been materialized on disk.
#[derive(Debug, Clone)]
pub struct StagedVersion {
    pub candidate: Candidate,
    /// Directory holding the selected files.
    pub path: PathBuf,
    /// Selected files, relative to `path`, in `/`-separated form.
    pub files: Vec<String>,
}
