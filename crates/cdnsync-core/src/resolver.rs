//! Decides which upstream versions to import and which version is current.

use std::collections::HashSet;

use cdnsync_dl::Candidate;
use cdnsync_utils::string::levenshtein;
use semver::Version as SemVer;
use tracing::{debug, warn};

use crate::version::Version;

/// Default bound on versions imported for a package with no history.
pub const DEFAULT_MAX_INITIAL_VERSIONS: usize = 10;

/// Outcome of diffing upstream candidates against published versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Versions to import, oldest first.
    pub new_versions: Vec<Candidate>,
    /// Latest upstream candidate that is already published.
    pub most_recent_existing: Option<Candidate>,
    /// Published versions exist but none of them is reported upstream anymore.
    pub vanished: bool,
}

/// Candidates of one package with their semver parsed once.
///
/// Built per resolution and dropped with it; nothing is cached across
/// packages or runs.
#[derive(Debug, Clone)]
pub struct Resolver {
    candidates: Vec<(Candidate, SemVer)>,
}

impl Resolver {
    /// Drops candidates whose version is not valid semver.
    pub fn new(package: &str, candidates: Vec<Candidate>) -> Self {
        let candidates = candidates
            .into_iter()
            .filter_map(|candidate| {
                match SemVer::parse(&candidate.version) {
                    Ok(parsed) => Some((candidate, parsed)),
                    Err(err) => {
                        warn!(
                            "{package}: ignoring non-semver version {}: {err}",
                            candidate.version
                        );
                        None
                    }
                }
            })
            .collect();
        Self { candidates }
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().map(|(c, _)| c)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates sorted by timestamp ascending. Ties keep upstream order.
    fn chronological(&self) -> Vec<&Candidate> {
        let mut sorted: Vec<&Candidate> = self.candidates().collect();
        sorted.sort_by_key(|c| c.timestamp);
        sorted
    }

    /// Diffs the candidates against the `existing` published versions.
    ///
    /// With no history, the `max_initial` most recent candidates are imported.
    /// Otherwise only candidates strictly newer than the latest published
    /// candidate are imported; older unpublished releases are never
    /// backfilled. Existing versions that are not valid semver take no part
    /// in the comparison.
    pub fn resolve(&self, package: &str, existing: &[String], max_initial: usize) -> Resolution {
        let existing: HashSet<&str> = existing
            .iter()
            .map(String::as_str)
            .filter(|v| SemVer::parse(v).is_ok())
            .collect();

        if existing.is_empty() {
            let sorted = self.chronological();
            let skip = sorted.len().saturating_sub(max_initial);
            let new_versions: Vec<Candidate> = sorted.into_iter().skip(skip).cloned().collect();
            debug!(
                "{package}: no published versions, importing {} of {}",
                new_versions.len(),
                self.len()
            );
            return Resolution {
                new_versions,
                ..Default::default()
            };
        }

        let mut most_recent: Option<&Candidate> = None;
        for candidate in self.candidates() {
            if !existing.contains(candidate.version.as_str()) {
                continue;
            }
            match most_recent {
                Some(m) if candidate.timestamp <= m.timestamp => {}
                _ => most_recent = Some(candidate),
            }
        }

        let Some(most_recent) = most_recent else {
            warn!(
                "{package}: none of the {} published version(s) is reported upstream; skipping",
                existing.len()
            );
            return Resolution {
                vanished: true,
                ..Default::default()
            };
        };

        let new_versions: Vec<Candidate> = self
            .chronological()
            .into_iter()
            .filter(|c| {
                !existing.contains(c.version.as_str()) && c.timestamp > most_recent.timestamp
            })
            .cloned()
            .collect();

        debug!(
            "{package}: latest published is {}, {} newer version(s) upstream",
            most_recent.version,
            new_versions.len()
        );
        Resolution {
            new_versions,
            most_recent_existing: Some(most_recent.clone()),
            vanished: false,
        }
    }

    /// Timestamp of a published version, when upstream still reports it.
    pub fn existing_version(&self, version: &str) -> Option<Version> {
        self.candidates()
            .find(|c| c.version == version)
            .map(|c| Version::existing(&c.version, c.timestamp))
    }
}

fn is_stable(version: &str) -> bool {
    SemVer::parse(version).is_ok_and(|v| v.pre.is_empty())
}

/// Picks the version the package record points at.
///
/// The most recent stable version wins; if every version is a pre-release
/// the most recent overall is used. Ties go to the first in `versions`.
pub fn current_version(versions: &[Version]) -> Option<&Version> {
    fn latest<'a>(iter: impl Iterator<Item = &'a Version>) -> Option<&'a Version> {
        iter.fold(None, |best: Option<&Version>, v| {
            match best {
                Some(b) if v.timestamp() <= b.timestamp() => Some(b),
                _ => Some(v),
            }
        })
    }

    latest(versions.iter().filter(|v| is_stable(v.version())))
        .or_else(|| latest(versions.iter()))
}

/// `foo.min.js` -> `foo.js`; other names are returned unchanged.
fn without_min(name: &str) -> String {
    match name.rfind(".min.") {
        Some(idx) => format!("{}{}", &name[..idx], &name[idx + 4..]),
        None => name.to_string(),
    }
}

/// Chooses the default filename for the current version.
///
/// The previous filename is kept when the version still ships it. Otherwise
/// the candidate closest to it by edit distance is taken, comparing with any
/// `.min` infix removed so that a minified rename of the old file wins over an
/// unrelated file of similar length. Raw distance breaks ties, then order.
pub fn continue_filename<S: AsRef<str>>(previous: Option<&str>, files: &[S]) -> Option<String> {
    let previous = previous?;
    if files.is_empty() || files.iter().any(|f| f.as_ref() == previous) {
        return Some(previous.to_string());
    }

    files
        .iter()
        .map(AsRef::as_ref)
        .enumerate()
        .min_by_key(|(idx, f)| {
            (
                levenshtein(previous, &without_min(f)),
                levenshtein(previous, f),
                *idx,
            )
        })
        .map(|(_, f)| f.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap()
    }

    fn candidate(version: &str, secs: i64) -> Candidate {
        Candidate::new(version, at(secs), format!("v{version}"))
    }

    fn versions(resolution: &Resolution) -> Vec<&str> {
        resolution
            .new_versions
            .iter()
            .map(|c| c.version.as_str())
            .collect()
    }

    fn existing(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_non_semver_dropped() {
        let resolver = Resolver::new(
            "foo",
            vec![candidate("1.0.0", 1), candidate("latest", 2), candidate("v1", 3)],
        );
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_initial_import_is_bounded_and_ascending() {
        let candidates = (0..15).map(|i| candidate(&format!("1.{i}.0"), i)).collect();
        let resolver = Resolver::new("foo", candidates);
        let resolution = resolver.resolve("foo", &[], 10);
        let got = versions(&resolution);
        assert_eq!(got.len(), 10);
        assert_eq!(got.first(), Some(&"1.5.0"));
        assert_eq!(got.last(), Some(&"1.14.0"));
        assert!(resolution.most_recent_existing.is_none());
    }

    #[test]
    fn test_initial_import_fewer_than_bound() {
        let resolver = Resolver::new("foo", vec![candidate("2.0.0", 5), candidate("1.0.0", 1)]);
        let resolution = resolver.resolve("foo", &[], 10);
        assert_eq!(versions(&resolution), vec!["1.0.0", "2.0.0"]);
    }

    #[test]
    fn test_scenario_incremental_skips_backfill() {
        let resolver = Resolver::new(
            "foo",
            vec![
                candidate("1.0.0", 1),
                candidate("1.1.0", 2),
                candidate("1.2.0", 3),
                candidate("1.0.1", 4),
            ],
        );
        let resolution = resolver.resolve("foo", &existing(&["1.0.0", "1.1.0"]), 10);
        assert_eq!(versions(&resolution), vec!["1.2.0", "1.0.1"]);
        assert_eq!(
            resolution.most_recent_existing.map(|c| c.version),
            Some("1.1.0".to_string())
        );

        let with_gap = Resolver::new(
            "foo",
            vec![
                candidate("1.0.0", 1),
                candidate("1.0.5", 2),
                candidate("1.1.0", 3),
                candidate("1.2.0", 4),
            ],
        );
        let resolution = with_gap.resolve("foo", &existing(&["1.0.0", "1.1.0"]), 10);
        assert_eq!(versions(&resolution), vec!["1.2.0"]);
    }

    #[test]
    fn test_no_reimport_of_existing() {
        let resolver = Resolver::new(
            "foo",
            vec![candidate("1.0.0", 1), candidate("2.0.0", 2), candidate("3.0.0", 3)],
        );
        let resolution = resolver.resolve("foo", &existing(&["1.0.0", "3.0.0"]), 10);
        assert!(resolution.new_versions.is_empty());
    }

    #[test]
    fn test_idempotent_after_import() {
        let resolver = Resolver::new(
            "foo",
            vec![candidate("1.0.0", 1), candidate("1.1.0", 2), candidate("1.2.0", 3)],
        );
        let first = resolver.resolve("foo", &existing(&["1.0.0"]), 10);
        let mut published = existing(&["1.0.0"]);
        published.extend(first.new_versions.iter().map(|c| c.version.clone()));

        let second = resolver.resolve("foo", &published, 10);
        assert!(second.new_versions.is_empty());
    }

    #[test]
    fn test_vanished_upstream() {
        let resolver = Resolver::new("foo", vec![candidate("2.0.0", 1)]);
        let resolution = resolver.resolve("foo", &existing(&["1.0.0"]), 10);
        assert!(resolution.vanished);
        assert!(resolution.new_versions.is_empty());
    }

    #[test]
    fn test_non_semver_existing_ignored() {
        let resolver = Resolver::new("foo", vec![candidate("1.0.0", 1)]);
        let resolution = resolver.resolve("foo", &existing(&["nightly"]), 10);
        assert_eq!(versions(&resolution), vec!["1.0.0"]);
    }

    #[test]
    fn test_current_prefers_stable() {
        let all = vec![
            Version::existing("1.0.0", at(1)),
            Version::imported("2.0.0-beta.1", at(5), "/tmp/a"),
            Version::imported("1.1.0", at(3), "/tmp/b"),
        ];
        assert_eq!(current_version(&all).map(Version::version), Some("1.1.0"));
    }

    #[test]
    fn test_current_falls_back_to_prerelease() {
        let all = vec![
            Version::existing("1.0.0-rc.1", at(1)),
            Version::existing("1.0.0-rc.2", at(2)),
        ];
        assert_eq!(current_version(&all).map(Version::version), Some("1.0.0-rc.2"));
        assert!(current_version(&[]).is_none());
    }

    #[test]
    fn test_current_tie_keeps_first() {
        let all = vec![
            Version::existing("1.0.0", at(1)),
            Version::existing("1.0.1", at(1)),
        ];
        assert_eq!(current_version(&all).map(Version::version), Some("1.0.0"));
    }

    #[test]
    fn test_scenario_filename_continuity() {
        assert_eq!(
            continue_filename(Some("foo.js"), &["foo.min.js", "bar.js"]),
            Some("foo.min.js".to_string())
        );
        assert_eq!(
            continue_filename(Some("foo.js"), &["bar.js", "foo.js"]),
            Some("foo.js".to_string())
        );
    }

    #[test]
    fn test_filename_continuity_edges() {
        assert_eq!(continue_filename::<&str>(None, &["a.js"]), None);
        assert_eq!(
            continue_filename::<&str>(Some("a.js"), &[]),
            Some("a.js".to_string())
        );
        assert_eq!(
            continue_filename(Some("dist/lib.js"), &["dist/lib.umd.js", "dist/other.css"]),
            Some("dist/lib.umd.js".to_string())
        );
    }

    #[test]
    fn test_scenario_incremental_with_prerelease() {
        let resolver = Resolver::new(
            "foo",
            vec![
                candidate("1.0.0", 0),
                candidate("1.1.0", 1),
                candidate("2.0.0-beta", 2),
            ],
        );
        let resolution = resolver.resolve("foo", &existing(&["1.0.0"]), 10);
        assert_eq!(versions(&resolution), vec!["1.1.0", "2.0.0-beta"]);

        let mut all: Vec<Version> = resolver.existing_version("1.0.0").into_iter().collect();
        all.extend(
            resolution
                .new_versions
                .iter()
                .map(|c| Version::existing(c.version.as_str(), c.timestamp)),
        );
        assert_eq!(all.len(), 3);
        assert_eq!(current_version(&all).map(Version::version), Some("1.1.0"));
    }
}
