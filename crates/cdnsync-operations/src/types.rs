use std::fmt;

/// Options for a sync run.
#[derive(Debug, Default, Clone)]
pub struct SyncOptions {
    /// Package names to sync; empty syncs every package document.
    pub packages: Vec<String>,
}

/// How a package ended up after a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageStatus {
    /// Nothing new upstream.
    UpToDate,
    /// Every new version was published.
    Published,
    /// Nothing new upstream, but interrupted publishes were completed.
    Repaired,
    /// The package was not processed.
    Skipped(String),
    /// A version failed; it and every later version are retried next run.
    /// Fatal errors such as rejected KV credentials land here as well.
    Failed(String),
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageStatus::UpToDate => f.write_str("up to date"),
            PackageStatus::Published => f.write_str("published"),
            PackageStatus::Repaired => f.write_str("repaired"),
            PackageStatus::Skipped(reason) => write!(f, "skipped: {reason}"),
            PackageStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Outcome of one package.
#[derive(Debug, Clone)]
pub struct PackageReport {
    pub name: String,
    pub status: PackageStatus,
    /// Versions published in this run, oldest first.
    pub published: Vec<String>,
    /// Earlier versions whose interrupted publish was completed in this run.
    pub repaired: Vec<String>,
    /// Versions passed over with the reason, such as an empty fileMap match.
    pub skipped_versions: Vec<(String, String)>,
    /// Version the package record points at after the run.
    pub current_version: Option<String>,
}

impl PackageReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: PackageStatus::UpToDate,
            published: Vec::new(),
            repaired: Vec::new(),
            skipped_versions: Vec::new(),
            current_version: None,
        }
    }

    pub fn with_status(mut self, status: PackageStatus) -> Self {
        self.status = status;
        self
    }
}

/// Report returned after a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub packages: Vec<PackageReport>,
    /// The run stopped early on a cancellation request.
    pub cancelled: bool,
}

impl SyncReport {
    pub fn published_count(&self) -> usize {
        self.packages.iter().map(|p| p.published.len()).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &PackageReport> {
        self.packages
            .iter()
            .filter(|p| matches!(p.status, PackageStatus::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}
