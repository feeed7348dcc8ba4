use std::{
    collections::HashSet,
    fs::{self, File},
    path::{Path, PathBuf},
};

use cdnsync_package::{FileMapEntry, Package};
use cdnsync_utils::fs::{copy_file, ensure_dir_exists, list_files, safe_remove, to_slash_path};
use fast_glob::glob_match;
use flate2::read::GzDecoder;
use tracing::{debug, warn};

use crate::{
    error::{DownloadError, ErrorContext, Result},
    source::VersionSource,
    types::{Candidate, StagedVersion},
};

/// Downloads `candidate`, unpacks it, and copies the files selected by the
/// package's fileMap into `<work_root>/<name>/<version>/files`.
///
/// # Errors
///
/// * [`DownloadError::NoMatch`] when the fileMap selects nothing.
/// * Any fetch or extraction failure of the source.
pub fn stage_version(
    source: &dyn VersionSource,
    package: &Package,
    candidate: &Candidate,
    work_root: &Path,
) -> Result<StagedVersion> {
    let autoupdate = package
        .autoupdate
        .as_ref()
        .ok_or(DownloadError::NoAutoupdate)?;

    let version_dir = work_root.join(&package.name).join(&candidate.version);
    safe_remove(&version_dir)?;
    ensure_dir_exists(&version_dir)?;

    let archive = version_dir.join("upstream.tgz");
    source.fetch_archive(autoupdate, candidate, &archive)?;

    let extracted = version_dir.join("upstream");
    extract_archive(&archive, &extracted)?;
    let root = package_root(&extracted)?;

    let staged = version_dir.join("files");
    ensure_dir_exists(&staged)?;
    let files = apply_file_map(&root, &autoupdate.file_map, &staged)?;

    safe_remove(&archive)?;
    safe_remove(&extracted)?;

    if files.is_empty() {
        return Err(DownloadError::NoMatch {
            version: candidate.version.clone(),
            globs: autoupdate
                .file_map
                .iter()
                .flat_map(|e| e.files.iter().map(|g| format!("{}/{g}", e.base_path)))
                .collect(),
        });
    }

    debug!(
        "staged {} file(s) for {}@{}",
        files.len(),
        package.name,
        candidate.version
    );

    Ok(StagedVersion {
        candidate: candidate.clone(),
        path: staged,
        files,
    })
}

/// Unpacks a gzipped tarball into `dest`. Entries escaping `dest` are skipped
/// by the tar reader.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    ensure_dir_exists(dest)?;
    let file =
        File::open(archive).with_context(|| format!("opening {}", archive.display()))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(false);
    tar.set_overwrite(true);
    tar.unpack(dest).map_err(|err| {
        DownloadError::Extract {
            path: archive.display().to_string(),
            reason: err.to_string(),
        }
    })
}

/// The directory fileMap base paths are relative to: `package/` when present,
/// otherwise the sole top-level directory, otherwise `extracted` itself.
fn package_root(extracted: &Path) -> Result<PathBuf> {
    let conventional = extracted.join("package");
    if conventional.is_dir() {
        return Ok(conventional);
    }

    let entries: Vec<PathBuf> = fs::read_dir(extracted)
        .with_context(|| format!("reading {}", extracted.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    match entries.as_slice() {
        [only] if only.is_dir() => Ok(only.clone()),
        _ => Ok(extracted.to_path_buf()),
    }
}

/// Copies files under `root` matched by `file_map` into `out`.
///
/// Returns the `/`-separated relative names in first-matched order. A file
/// matched by several entries is copied once.
pub fn apply_file_map(root: &Path, file_map: &[FileMapEntry], out: &Path) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();

    for entry in file_map {
        let base = root.join(&entry.base_path);
        if !base.is_dir() {
            warn!("fileMap basePath '{}' not found in artifact", entry.base_path);
            continue;
        }

        for relative in list_files(&base)? {
            let name = to_slash_path(&relative);
            if !entry.files.iter().any(|glob| glob_match(glob, &name)) {
                continue;
            }
            if !seen.insert(name.clone()) {
                continue;
            }
            copy_file(base.join(&relative), out.join(&relative))?;
            selected.push(name);
        }
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use cdnsync_package::{Autoupdate, Source};
    use chrono::Utc;
    use flate2::{write::GzEncoder, Compression};
    use tempfile::tempdir;

    use super::*;

    fn write_tarball(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::fast()));
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap().flush().unwrap();
    }

    struct LocalSource {
        tarball: PathBuf,
    }

    impl VersionSource for LocalSource {
        fn candidates(&self, _autoupdate: &Autoupdate) -> Result<Vec<Candidate>> {
            Ok(Vec::new())
        }

        fn fetch_archive(
            &self,
            _autoupdate: &Autoupdate,
            _candidate: &Candidate,
            archive: &Path,
        ) -> Result<()> {
            fs::copy(&self.tarball, archive).with_context(|| "copying fixture".into())?;
            Ok(())
        }
    }

    fn package(globs: &[&str]) -> Package {
        let mut pkg = Package::new("demo");
        pkg.autoupdate = Some(Autoupdate {
            source: Source::Npm,
            target: "demo".into(),
            file_map: vec![FileMapEntry {
                base_path: "dist".into(),
                files: globs.iter().map(|g| g.to_string()).collect(),
            }],
            ignore_versions: Vec::new(),
        });
        pkg
    }

    #[test]
    fn test_stage_version_applies_file_map() {
        let dir = tempdir().unwrap();
        let tarball = dir.path().join("fixture.tgz");
        write_tarball(
            &tarball,
            &[
                ("package/dist/demo.js", b"var demo = 1;"),
                ("package/dist/css/demo.css", b"a{}"),
                ("package/src/index.js", b"export {}"),
                ("package/README.md", b"# demo"),
            ],
        );

        let source = LocalSource { tarball };
        let candidate = Candidate::new("1.0.0", Utc::now(), "fixture");
        let staged = stage_version(
            &source,
            &package(&["*.js", "css/*.css"]),
            &candidate,
            &dir.path().join("work"),
        )
        .unwrap();

        assert_eq!(staged.files, vec!["css/demo.css", "demo.js"]);
        assert_eq!(fs::read(staged.path.join("demo.js")).unwrap(), b"var demo = 1;");
        assert!(!staged.path.join("index.js").exists());
        assert!(!dir.path().join("work/demo/1.0.0/upstream").exists());
    }

    #[test]
    fn test_stage_version_no_match() {
        let dir = tempdir().unwrap();
        let tarball = dir.path().join("fixture.tgz");
        write_tarball(&tarball, &[("package/dist/demo.js", b"x")]);

        let source = LocalSource { tarball };
        let candidate = Candidate::new("1.0.0", Utc::now(), "fixture");
        let err = stage_version(
            &source,
            &package(&["*.css"]),
            &candidate,
            &dir.path().join("work"),
        )
        .unwrap_err();
        assert!(err.is_empty_match());
    }

    #[test]
    fn test_package_root_single_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib-1.0/dist")).unwrap();
        assert_eq!(package_root(dir.path()).unwrap(), dir.path().join("lib-1.0"));
    }

    #[test]
    fn test_apply_file_map_dedups_overlapping_entries() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("dist")).unwrap();
        fs::write(root.join("dist/a.js"), b"a").unwrap();

        let map = vec![
            FileMapEntry {
                base_path: "dist".into(),
                files: vec!["*.js".into()],
            },
            FileMapEntry {
                base_path: "dist".into(),
                files: vec!["a.*".into()],
            },
            FileMapEntry {
                base_path: "missing".into(),
                files: vec!["*".into()],
            },
        ];
        let out = dir.path().join("out");
        let files = apply_file_map(&root, &map, &out).unwrap();
        assert_eq!(files, vec!["a.js"]);
    }
}
