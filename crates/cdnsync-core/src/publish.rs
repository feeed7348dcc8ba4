//! Writes a processed version to the KV store.
//!
//! Namespaces are written in a fixed order: files, versions, sri, package,
//! aggregated. Each step only starts after the previous one was fully
//! acknowledged. The aggregated asset is written last, so a version with a
//! version record but no aggregated asset is an incomplete publish that
//! [`Publisher::reconcile`] finishes on a later run.

use std::collections::{BTreeMap, HashSet};

use cdnsync_audit::{record_best_effort, AuditEntry, AuditHandle, AuditStage};
use cdnsync_kv::{
    keys,
    repository::{
        AggregatedRepository, FilesRepository, PackageWrite, PackagesRepository, SriRepository,
        VersionsRepository,
    },
    KvError, KvStore, Namespace,
};
use cdnsync_package::{Asset, Package};
use tracing::{debug, info, warn};

use crate::{
    error::{CoreError, CoreResult},
    ingest::ProcessedVersion,
    resolver::{continue_filename, current_version},
    search::SearchSync,
    version::Version,
};

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    /// The package document as stored after this version.
    pub package: Package,
    pub package_write: PackageWrite,
    pub current_version: Option<String>,
}

/// What [`Publisher::reconcile`] found and rewrote.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// The package document as stored after reconciling.
    pub package: Package,
    pub package_write: PackageWrite,
    /// Versions whose sri and aggregated records were rewritten, oldest
    /// first.
    pub repaired: Vec<String>,
}

pub struct Publisher {
    store: KvStore,
    audit: AuditHandle,
    search: SearchSync,
}

/// Fails with [`KvError::ZeroWrite`] for the first expected key that was not
/// acknowledged.
fn ensure_written(
    namespace: Namespace,
    expected: &[String],
    written: &[String],
) -> CoreResult<()> {
    match expected.iter().find(|key| !written.contains(key)) {
        Some(key) => {
            Err(CoreError::partial(
                namespace,
                KvError::ZeroWrite {
                    namespace,
                    key: key.clone(),
                },
            ))
        }
        None => Ok(()),
    }
}

impl Publisher {
    pub fn new(store: KvStore, audit: AuditHandle, search: SearchSync) -> Self {
        Self {
            store,
            audit,
            search,
        }
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    /// Drops the version from the aggregated list after a failed file
    /// upload. A failure here is only logged; the original error wins.
    fn roll_back(&self, package: &str, version: &str) {
        match AggregatedRepository::remove_version(&self.store, package, version) {
            Ok(true) => info!("{package}@{version}: removed from aggregated metadata"),
            Ok(false) => {}
            Err(err) => warn!("{package}@{version}: aggregated rollback failed: {err}"),
        }
    }

    fn write_files(&self, name: &str, processed: &ProcessedVersion) -> CoreResult<()> {
        let expected: Vec<String> = processed
            .files
            .iter()
            .map(|f| keys::file(name, &processed.version, &f.name))
            .collect();
        let written = FilesRepository::write(
            &self.store,
            name,
            &processed.version,
            &processed.files,
            &processed.sri,
        )
        .map_err(|err| CoreError::partial(Namespace::Files, err))?;
        ensure_written(Namespace::Files, &expected, &written)
    }

    fn write_sri(
        &self,
        name: &str,
        version: &str,
        hashes: &BTreeMap<String, String>,
    ) -> CoreResult<()> {
        let expected: Vec<String> = hashes
            .keys()
            .map(|path| keys::file(name, version, path))
            .collect();
        let written = SriRepository::write(&self.store, name, version, hashes)
            .map_err(|err| CoreError::partial(Namespace::Sri, err))?;
        ensure_written(Namespace::Sri, &expected, &written)
    }

    fn append_asset(&self, name: &str, version: &str, files: Vec<String>) -> CoreResult<()> {
        AggregatedRepository::append(&self.store, name, Asset::new(version, files))
            .map_err(|err| CoreError::partial(Namespace::Aggregated, err))?;
        Ok(())
    }

    /// Points the package at the current version of `all` and continues its
    /// filename into that version's file list. `processed` supplies the file
    /// list when it is the current version; otherwise it is read back.
    fn advance_package(
        &self,
        package: &Package,
        all: &[Version],
        processed: Option<&ProcessedVersion>,
    ) -> CoreResult<(Package, Option<String>)> {
        let mut updated = package.clone();
        let Some(current) = current_version(all).map(|v| v.version().to_string()) else {
            return Ok((updated, None));
        };

        let files = match processed {
            Some(p) if p.version == current => p.logical_files.clone(),
            _ => {
                VersionsRepository::read(&self.store, &package.name, &current)
                    .map_err(|err| CoreError::partial(Namespace::Packages, err))?
                    .unwrap_or_default()
            }
        };
        updated.filename = continue_filename(package.filename.as_deref(), &files)
            .or_else(|| package.filename.clone());
        updated.version = Some(current.clone());
        Ok((updated, Some(current)))
    }

    /// Writes the package record and refreshes the search entry when the
    /// version or filename changed.
    fn store_package(&self, updated: &Package) -> CoreResult<PackageWrite> {
        let package_write = PackagesRepository::update(&self.store, updated)
            .map_err(|err| CoreError::partial(Namespace::Packages, err))?;
        if package_write.changed() {
            info!(
                "{}: package record now at {} ({})",
                updated.name,
                updated.version.as_deref().unwrap_or("-"),
                updated.filename.as_deref().unwrap_or("-")
            );
            self.search.sync(updated, self.current_sri(updated));
        }
        Ok(package_write)
    }

    fn current_sri(&self, package: &Package) -> Option<String> {
        let filename = package.filename.as_deref()?;
        let version = package.version.as_deref()?;
        match SriRepository::read(&self.store, &package.name, version, filename) {
            Ok(sri) => sri,
            Err(err) => {
                debug!("{}: no integrity hash for the search entry: {err}", package.name);
                None
            }
        }
    }

    /// Publishes one processed version.
    ///
    /// `known` holds every version of the package known so far, including
    /// versions imported earlier in this run; the version being published is
    /// added when missing. The returned package is the input for the next
    /// version of the same package.
    ///
    /// # Errors
    ///
    /// [`CoreError::PartialPublish`] naming the namespace that failed. A
    /// failed file upload also removes the version from the aggregated list.
    pub fn publish(
        &self,
        package: &Package,
        processed: &ProcessedVersion,
        known: &[Version],
    ) -> CoreResult<PublishOutcome> {
        let name = package.name.as_str();
        let version = processed.version.as_str();

        if let Err(err) = self.write_files(name, processed) {
            self.roll_back(name, version);
            return Err(err);
        }
        debug!("{name}@{version}: {} file record(s) written", processed.files.len());

        let written =
            VersionsRepository::write(&self.store, name, version, &processed.logical_files)
                .map_err(|err| CoreError::partial(Namespace::Versions, err))?;
        ensure_written(Namespace::Versions, &[keys::version(name, version)], &written)?;

        self.write_sri(name, version, &processed.sri)?;

        let mut all = known.to_vec();
        if !all.iter().any(|v| v.version() == version) {
            all.push(Version::imported(version, processed.timestamp, &processed.output));
        }
        let (updated, current) = self.advance_package(package, &all, Some(processed))?;
        let package_write = self.store_package(&updated)?;

        self.append_asset(name, version, processed.logical_files.clone())?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                name,
                version,
                AuditStage::KvPublish,
                format!(
                    "published {} file(s), {} integrity hash(es); package record {:?}",
                    processed.files.len(),
                    processed.sri.len(),
                    package_write
                ),
            ),
        );

        Ok(PublishOutcome {
            package: updated,
            package_write,
            current_version: current,
        })
    }

    /// Finishes publishes that stopped after the version record was written.
    ///
    /// Every version in `existing` without an aggregated asset, and not
    /// withdrawn with [`VersionsRepository::mark_removed`], gets its sri
    /// records re-derived from the stored file metadata and its asset rebuilt
    /// from the version record. The package record is moved to the current
    /// version of `known`, which writes nothing when it is already there.
    /// The package record is left alone when its stored version is missing
    /// from `known`.
    pub fn reconcile(
        &self,
        package: &Package,
        known: &[Version],
        existing: &[String],
    ) -> CoreResult<Reconciled> {
        let name = package.name.as_str();
        let listed: HashSet<String> = AggregatedRepository::read(&self.store, name)
            .map_err(|err| CoreError::partial(Namespace::Aggregated, err))?
            .unwrap_or_default()
            .into_iter()
            .map(|asset| asset.version)
            .collect();

        let mut incomplete = Vec::new();
        for version in existing.iter().filter(|v| !listed.contains(v.as_str())) {
            let removed = VersionsRepository::is_removed(&self.store, name, version)
                .map_err(|err| CoreError::partial(Namespace::Versions, err))?;
            if removed {
                debug!("{name}@{version}: withdrawn, not restoring its asset");
            } else {
                incomplete.push(version.as_str());
            }
        }
        let timestamp = |version: &str| {
            known
                .iter()
                .find(|v| v.version() == version)
                .map(Version::timestamp)
        };
        incomplete.sort_by_key(|v| (timestamp(*v).is_none(), timestamp(*v)));

        for version in &incomplete {
            warn!("{name}@{version}: publish was incomplete, repairing");
            let hashes = FilesRepository::stored_sri(&self.store, name, version)
                .map_err(|err| CoreError::partial(Namespace::Sri, err))?;
            self.write_sri(name, version, &hashes)?;
        }

        let stale = package
            .version
            .as_deref()
            .is_some_and(|stored| !known.iter().any(|v| v.version() == stored));
        let (updated, package_write) = if stale {
            debug!("{name}: stored version is not reported upstream, keeping package record");
            (package.clone(), PackageWrite::Unchanged)
        } else {
            match self.advance_package(package, known, None)? {
                (updated, Some(_)) => {
                    let package_write = self.store_package(&updated)?;
                    (updated, package_write)
                }
                (updated, None) => (updated, PackageWrite::Unchanged),
            }
        };

        let mut repaired = Vec::with_capacity(incomplete.len());
        for version in incomplete {
            let files = VersionsRepository::read(&self.store, name, version)
                .map_err(|err| CoreError::partial(Namespace::Aggregated, err))?
                .unwrap_or_default();
            self.append_asset(name, version, files)?;
            info!("{name}@{version}: publish completed");
            record_best_effort(
                self.audit.as_ref(),
                AuditEntry::new(
                    name,
                    version,
                    AuditStage::KvPublish,
                    "completed an interrupted publish",
                ),
            );
            repaired.push(version.to_string());
        }

        Ok(Reconciled {
            package: updated,
            package_write,
            repaired,
        })
    }
}
