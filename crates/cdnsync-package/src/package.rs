use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Upstream a package's releases are tracked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Npm,
    Git,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Npm => write!(f, "npm"),
            Source::Git => write!(f, "git"),
        }
    }
}

/// One fileMap rule: globs evaluated relative to `basePath` inside the
/// upstream artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMapEntry {
    #[serde(rename = "basePath", default)]
    pub base_path: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Autoupdate {
    pub source: Source,
    /// npm package name or git remote URL.
    pub target: String,
    #[serde(rename = "fileMap", default)]
    pub file_map: Vec<FileMapEntry>,
    #[serde(
        rename = "ignoreVersions",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub ignore_versions: Vec<String>,
}

impl Autoupdate {
    pub fn is_ignored(&self, version: &str) -> bool {
        self.ignore_versions.iter().any(|v| v == version)
    }
}

/// Per-format optimization opt-in flags. A format is optimized only when
/// the package turns it on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Optimization {
    #[serde(default)]
    pub js: bool,
    #[serde(default)]
    pub css: bool,
    #[serde(default)]
    pub png: bool,
    #[serde(default)]
    pub jpg: bool,
}

impl Optimization {
    pub fn any(&self) -> bool {
        self.js || self.css || self.png || self.jpg
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

impl Repository {
    /// Returns `(owner, repo)` when the repository is hosted on GitHub.
    pub fn github_slug(&self) -> Option<(String, String)> {
        let rest = self
            .url
            .split_once("github.com")
            .map(|(_, rest)| rest.trim_start_matches([':', '/']))?;
        let mut parts = rest.trim_end_matches('/').splitn(3, '/');
        let owner = parts.next().filter(|s| !s.is_empty())?;
        let repo = parts.next().filter(|s| !s.is_empty())?;
        Some((
            owner.to_string(),
            repo.trim_end_matches(".git").to_string(),
        ))
    }
}

/// A tracked package document.
///
/// Fields the pipeline does not interpret are kept in [`Package::extra`] so the
/// authoritative record survives a read-modify-write unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoupdate: Option<Autoupdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization: Option<Optimization>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Package {
    /// Creates a bare package with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            keywords: Vec::new(),
            license: None,
            homepage: None,
            repository: None,
            filename: None,
            version: None,
            autoupdate: None,
            optimization: None,
            authors: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Effective optimization flags, defaulting to nothing enabled.
    pub fn optimization(&self) -> Optimization {
        self.optimization.unwrap_or_default()
    }

    /// `true` when `other` carries the same current version and filename.
    pub fn same_release(&self, other: &Package) -> bool {
        self.version == other.version && self.filename == other.filename
    }
}

/// The published file set of one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub version: String,
    pub files: Vec<String>,
}

impl Asset {
    pub fn new(version: impl Into<String>, files: Vec<String>) -> Self {
        Self {
            version: version.into(),
            files,
        }
    }
}
