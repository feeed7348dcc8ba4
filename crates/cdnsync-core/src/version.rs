use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// A version already published to the KV store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingVersion {
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// A version imported during this run, staged on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedVersion {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub staging_path: PathBuf,
}

/// Either kind of version known to a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Version {
    Existing(ExistingVersion),
    Imported(ImportedVersion),
}

impl Version {
    pub fn existing(version: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Version::Existing(ExistingVersion {
            version: version.into(),
            timestamp,
        })
    }

    pub fn imported(
        version: impl Into<String>,
        timestamp: DateTime<Utc>,
        staging_path: impl Into<PathBuf>,
    ) -> Self {
        Version::Imported(ImportedVersion {
            version: version.into(),
            timestamp,
            staging_path: staging_path.into(),
        })
    }

    pub fn version(&self) -> &str {
        match self {
            Version::Existing(v) => &v.version,
            Version::Imported(v) => &v.version,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Version::Existing(v) => v.timestamp,
            Version::Imported(v) => v.timestamp,
        }
    }

    /// Staging directory of an imported version.
    pub fn staging_path(&self) -> Option<&Path> {
        match self {
            Version::Existing(_) => None,
            Version::Imported(v) => Some(&v.staging_path),
        }
    }
}
