use std::{
    path::{Path, PathBuf},
    process::Command,
};

use cdnsync_package::Autoupdate;
use cdnsync_utils::fs::ensure_dir_exists;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    error::{DownloadError, ErrorContext, Result},
    source::VersionSource,
    types::Candidate,
};

/// Tracks releases from the tags of a git remote, using a bare mirror kept
/// under `<cache>/git/<owner>_<repo>.git`.
pub struct GitSource {
    mirrors: PathBuf,
}

impl GitSource {
    pub fn new(cache_root: impl AsRef<Path>) -> Self {
        Self {
            mirrors: cache_root.as_ref().join("git"),
        }
    }

    /// `<owner>_<repo>.git`, so remotes sharing a repository name don't collide.
    fn mirror_path(&self, target: &str) -> PathBuf {
        let trimmed = target.trim_end_matches('/').trim_end_matches(".git");
        let segments: Vec<&str> = trimmed.rsplit(['/', ':']).take(2).collect();
        let name: String = segments
            .iter()
            .rev()
            .copied()
            .collect::<Vec<_>>()
            .join("_")
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.mirrors.join(format!("{name}.git"))
    }

    fn sync_mirror(&self, target: &str) -> Result<PathBuf> {
        let mirror = self.mirror_path(target);
        if mirror.join("HEAD").exists() {
            debug!("updating mirror {}", mirror.display());
            run_git(
                Some(&mirror),
                &["fetch", "--prune", "--prune-tags", "--tags", "--force", "origin"],
            )?;
        } else {
            ensure_dir_exists(&self.mirrors)?;
            info!("cloning {target} into {}", mirror.display());
            let dest = mirror.to_string_lossy();
            run_git(None, &["clone", "--mirror", "--quiet", target, &dest])?;
        }
        Ok(mirror)
    }
}

impl VersionSource for GitSource {
    fn candidates(&self, autoupdate: &Autoupdate) -> Result<Vec<Candidate>> {
        let mirror = self.sync_mirror(&autoupdate.target)?;
        let listing = run_git(
            Some(&mirror),
            &[
                "for-each-ref",
                "--format=%(refname:short)%09%(creatordate:iso-strict)",
                "refs/tags",
            ],
        )?;
        Ok(parse_tags(&listing))
    }

    fn fetch_archive(
        &self,
        autoupdate: &Autoupdate,
        candidate: &Candidate,
        archive: &Path,
    ) -> Result<()> {
        let mirror = self.mirror_path(&autoupdate.target);
        let output = archive.to_string_lossy();
        run_git(
            Some(&mirror),
            &[
                "archive",
                "--format=tar.gz",
                "--prefix=package/",
                "-o",
                &output,
                &candidate.locator,
            ],
        )?;
        Ok(())
    }
}

fn run_git(git_dir: Option<&Path>, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new("git");
    if let Some(dir) = git_dir {
        cmd.arg("--git-dir").arg(dir);
    }
    cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");

    let output = cmd
        .output()
        .with_context(|| format!("running git {}", args.join(" ")))?;
    if !output.status.success() {
        return Err(DownloadError::Git {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses `<tag>\t<iso-date>` lines. The version is the tag with a leading
/// `v` removed; the locator is the tag itself.
fn parse_tags(listing: &str) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = listing
        .lines()
        .filter_map(|line| {
            let (tag, date) = line.split_once('\t')?;
            let tag = tag.trim();
            match DateTime::parse_from_rfc3339(date.trim()) {
                Ok(t) => {
                    let version = tag.strip_prefix('v').unwrap_or(tag);
                    Some(Candidate::new(version, t.with_timezone(&Utc), tag))
                }
                Err(err) => {
                    warn!("tag {tag} has unparseable date '{date}': {err}");
                    None
                }
            }
        })
        .collect();
    candidates.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        let listing = "v2.0.0\t2021-06-01T10:00:00+02:00\n\
                       1.0.0\t2020-01-01T00:00:00+00:00\n\
                       broken\tnot-a-date\n";
        let tags = parse_tags(listing);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].version, "1.0.0");
        assert_eq!(tags[1].version, "2.0.0");
        assert_eq!(tags[1].locator, "v2.0.0");
        assert_eq!(tags[1].timestamp.to_rfc3339(), "2021-06-01T08:00:00+00:00");
    }

    #[test]
    fn test_mirror_path() {
        let git = GitSource::new("/cache");
        assert_eq!(
            git.mirror_path("https://github.com/twbs/bootstrap.git"),
            PathBuf::from("/cache/git/twbs_bootstrap.git")
        );
        assert_eq!(
            git.mirror_path("git@github.com:user/my repo"),
            PathBuf::from("/cache/git/user_my_repo.git")
        );
    }
}
