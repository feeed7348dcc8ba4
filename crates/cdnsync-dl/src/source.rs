use std::path::Path;

use cdnsync_package::{Autoupdate, Package, Source};
use tracing::debug;

use crate::{
    error::{DownloadError, Result},
    git::GitSource,
    npm::NpmSource,
    types::Candidate,
};

/// An upstream that publishes releases of a package.
pub trait VersionSource: Send + Sync {
    /// Lists every release the upstream currently knows about.
    fn candidates(&self, autoupdate: &Autoupdate) -> Result<Vec<Candidate>>;

    /// Writes the release archive for `candidate` to `archive` as a gzipped
    /// tarball whose entries live under a single top-level directory.
    fn fetch_archive(
        &self,
        autoupdate: &Autoupdate,
        candidate: &Candidate,
        archive: &Path,
    ) -> Result<()>;
}

/// Both adapters, selected per package by `autoupdate.source`.
pub struct Sources {
    npm: Box<dyn VersionSource>,
    git: Box<dyn VersionSource>,
}

impl Sources {
    /// The npm registry adapter and the git adapter mirroring under
    /// `cache_root`.
    pub fn new(registry: impl Into<String>, cache_root: impl AsRef<Path>) -> Self {
        Self::from_parts(
            Box::new(NpmSource::new(registry)),
            Box::new(GitSource::new(cache_root)),
        )
    }

    pub fn from_parts(npm: Box<dyn VersionSource>, git: Box<dyn VersionSource>) -> Self {
        Self { npm, git }
    }

    pub fn for_source(&self, source: Source) -> &dyn VersionSource {
        match source {
            Source::Npm => self.npm.as_ref(),
            Source::Git => self.git.as_ref(),
        }
    }

    /// Candidates for `package` with its ignored versions removed.
    pub fn candidates(&self, package: &Package) -> Result<Vec<Candidate>> {
        let autoupdate = package
            .autoupdate
            .as_ref()
            .ok_or(DownloadError::NoAutoupdate)?;
        let candidates = self.for_source(autoupdate.source).candidates(autoupdate)?;
        Ok(without_ignored(autoupdate, candidates))
    }
}

pub fn without_ignored(autoupdate: &Autoupdate, candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| {
            let ignored = autoupdate.is_ignored(&c.version);
            if ignored {
                debug!("ignoring {} {}", autoupdate.target, c.version);
            }
            !ignored
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_without_ignored() {
        let autoupdate = Autoupdate {
            source: Source::Npm,
            target: "left-pad".into(),
            file_map: Vec::new(),
            ignore_versions: vec!["1.1.0".into()],
        };
        let t = Utc.timestamp_opt(0, 0).unwrap();
        let kept = without_ignored(
            &autoupdate,
            vec![
                Candidate::new("1.0.0", t, "a"),
                Candidate::new("1.1.0", t, "b"),
            ],
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].version, "1.0.0");
    }
}
