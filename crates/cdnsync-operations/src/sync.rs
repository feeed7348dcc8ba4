use std::{collections::HashSet, fs, path::Path};

use cdnsync_audit::{record_best_effort, AuditEntry, AuditStage};
use cdnsync_core::{CoreError, CoreResult, ErrorContext as _, PublishOutcome, Resolver, Version};
use cdnsync_dl::{staging::stage_version, Candidate, VersionSource};
use cdnsync_kv::repository::{PackagesRepository, VersionsRepository};
use cdnsync_package::Package;
use cdnsync_utils::fs::safe_remove;
use tracing::{debug, error, info, warn};

use crate::{PackageReport, PackageStatus, SyncContext, SyncOptions, SyncReport};

/// Reads every `<name>.json` package document in `dir`, sorted by name.
/// Documents that do not parse are returned as errors so the caller can
/// report them per package.
pub fn load_packages(dir: &Path) -> CoreResult<Vec<(String, CoreResult<Package>)>> {
    let entries = fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("reading {}", dir.display()))?
            .path();
        if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .filter_map(|path| {
            let name = path.file_stem()?.to_string_lossy().into_owned();
            let doc = fs::read(&path)
                .with_context(|| format!("reading {}", path.display()))
                .and_then(|bytes| Package::from_slice(&bytes).map_err(CoreError::from));
            Some((name, doc))
        })
        .collect())
}

/// Syncs the selected packages one after another.
///
/// The cancellation flag is checked before each package; a package that has
/// started always runs to completion. A failing package, fatal or not, is
/// recorded in the report and the run moves on to the next one.
///
/// # Errors
///
/// Only when the package directory itself cannot be read.
pub fn sync(ctx: &SyncContext, options: &SyncOptions) -> CoreResult<SyncReport> {
    let mut docs = load_packages(ctx.packages_path())?;
    if !options.packages.is_empty() {
        let wanted: HashSet<&str> = options.packages.iter().map(String::as_str).collect();
        docs.retain(|(name, _)| wanted.contains(name.as_str()));
        for name in &options.packages {
            if !docs.iter().any(|(n, _)| n == name) {
                warn!("no package document for {name}");
            }
        }
    }

    info!("syncing {} package(s)", docs.len());
    let mut report = SyncReport::default();

    for (name, doc) in docs {
        if ctx.is_cancelled() {
            info!("cancellation requested, stopping before {name}");
            report.cancelled = true;
            break;
        }

        let package = match doc {
            Ok(package) => package,
            Err(err) => {
                error!("{name}: invalid package document: {err}");
                report.packages.push(
                    PackageReport::new(&name).with_status(PackageStatus::Failed(err.to_string())),
                );
                continue;
            }
        };

        match sync_package(ctx, package) {
            Ok(package_report) => report.packages.push(package_report),
            Err(err) => {
                if err.is_fatal() {
                    error!("{name}: {err} (check the KV credentials and configuration)");
                } else {
                    error!("{name}: {err}");
                }
                report.packages.push(
                    PackageReport::new(&name).with_status(PackageStatus::Failed(err.to_string())),
                );
            }
        }
    }

    Ok(report)
}

/// Carries the stored release pointer over onto the local document, which
/// supplies every other field.
fn with_stored_release(ctx: &SyncContext, mut package: Package) -> CoreResult<Package> {
    if let Some(stored) = PackagesRepository::read(ctx.store(), &package.name)? {
        package.version = stored.version;
        package.filename = stored.filename;
    }
    Ok(package)
}

/// Imports and publishes every new version of one package, oldest first.
///
/// Versions whose publish was interrupted on an earlier run are completed
/// first. A version whose fileMap selects nothing is skipped; it is not
/// recorded anywhere, so every run downloads it again until a newer version
/// moves past it. Any other failure stops the package; the failed version
/// and those after it stay unpublished and are picked up again by the next
/// run.
pub fn sync_package(ctx: &SyncContext, package: Package) -> CoreResult<PackageReport> {
    let name = package.name.clone();
    let mut report = PackageReport::new(&name);

    let Some(source_kind) = package.autoupdate.as_ref().map(|a| a.source) else {
        debug!("{name}: no autoupdate configuration");
        return Ok(report.with_status(PackageStatus::Skipped("no autoupdate".into())));
    };

    let source = ctx.sources().for_source(source_kind);
    let package = with_stored_release(ctx, package)?;
    let candidates = ctx.sources().candidates(&package)?;
    let resolver = Resolver::new(&name, candidates);
    let existing = VersionsRepository::list(ctx.store(), &name)?;
    let resolution = resolver.resolve(&name, &existing, ctx.max_initial_versions());

    report.current_version = package.version.clone();
    if resolution.vanished {
        return Ok(report.with_status(PackageStatus::Skipped(
            "published versions no longer reported upstream".into(),
        )));
    }

    let mut known: Vec<Version> = existing
        .iter()
        .filter_map(|v| resolver.existing_version(v))
        .collect();

    let reconciled = ctx.publisher().reconcile(&package, &known, &existing)?;
    let mut package = reconciled.package;
    report.current_version = package.version.clone();
    report.repaired = reconciled.repaired;

    if resolution.new_versions.is_empty() {
        debug!("{name}: up to date");
        if !report.repaired.is_empty() {
            report.status = PackageStatus::Repaired;
        }
        return Ok(report);
    }

    for candidate in &resolution.new_versions {
        record_best_effort(
            ctx.audit().as_ref(),
            AuditEntry::new(
                &name,
                &candidate.version,
                AuditStage::NewVersion,
                format!(
                    "detected {} from {source_kind}, published {}",
                    candidate.version, candidate.timestamp
                ),
            ),
        );

        match import_version(ctx, source, &package, candidate, &known) {
            Ok(Imported::Published(outcome, version)) => {
                info!("{name}@{}: published", candidate.version);
                package = outcome.package;
                report.current_version = outcome.current_version;
                report.published.push(candidate.version.clone());
                known.push(version);
            }
            Ok(Imported::Skipped(reason)) => {
                warn!("{name}@{}: skipped, {reason}", candidate.version);
                report
                    .skipped_versions
                    .push((candidate.version.clone(), reason));
            }
            Err(err) => {
                error!("{name}@{}: {err}", candidate.version);
                report.status = PackageStatus::Failed(format!("{}: {err}", candidate.version));
                return Ok(report);
            }
        }
    }

    if !report.published.is_empty() {
        report.status = PackageStatus::Published;
    } else if !report.repaired.is_empty() {
        report.status = PackageStatus::Repaired;
    }
    Ok(report)
}

enum Imported {
    Published(Box<PublishOutcome>, Version),
    Skipped(String),
}

fn import_version(
    ctx: &SyncContext,
    source: &dyn VersionSource,
    package: &Package,
    candidate: &Candidate,
    known: &[Version],
) -> CoreResult<Imported> {
    let staged = match stage_version(source, package, candidate, ctx.work_root()) {
        Ok(staged) => staged,
        Err(err) if err.is_empty_match() => {
            return Ok(Imported::Skipped(format!("{err}; checked again on every run")));
        }
        Err(err) => return Err(err.into()),
    };

    let processed = ctx.ingestor().ingest(package, &staged)?;
    let version = Version::imported(&candidate.version, candidate.timestamp, &staged.path);
    let mut all = known.to_vec();
    all.push(version.clone());

    let outcome = ctx.publisher().publish(package, &processed, &all)?;

    if let Some(version_dir) = staged.path.parent() {
        if let Err(err) = safe_remove(version_dir) {
            warn!("could not clean up {}: {err}", version_dir.display());
        }
    }

    Ok(Imported::Published(Box::new(outcome), version))
}
