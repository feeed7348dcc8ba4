use cdnsync_package::{validate, Package};
use tracing::debug;

use crate::{
    backend::KvRecord,
    error::{KvError, Result},
    namespace::{keys, Namespace},
    store::KvStore,
};

/// Outcome of a package record update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageWrite {
    /// No record existed; one was created.
    Inserted,
    /// The stored version or filename differed and was overwritten.
    Updated,
    /// Version and filename already matched; nothing was written.
    Unchanged,
}

impl PackageWrite {
    pub fn changed(&self) -> bool {
        !matches!(self, PackageWrite::Unchanged)
    }
}

pub struct PackagesRepository;

impl PackagesRepository {
    pub fn read(store: &KvStore, name: &str) -> Result<Option<Package>> {
        let key = keys::package(name);
        let Some(bytes) = store.read_optional(Namespace::Packages, &key)? else {
            return Ok(None);
        };
        Package::from_slice(&bytes).map(Some).map_err(|err| {
            KvError::Corrupt {
                namespace: Namespace::Packages,
                key,
                reason: err.to_string(),
            }
        })
    }

    /// Read-modify-write of the authoritative package record.
    ///
    /// A missing record is a first insert. When the stored version and
    /// filename equal `package`'s, no write is issued. Otherwise `package` is
    /// validated and written whole.
    ///
    /// # Errors
    ///
    /// * [`KvError::SchemaValidation`] when `package` fails validation; the
    ///   stored record is left untouched.
    /// * [`KvError::ZeroWrite`] when the store acknowledged no key.
    pub fn update(store: &KvStore, package: &Package) -> Result<PackageWrite> {
        let existing = Self::read(store, &package.name)?;
        if existing.as_ref().is_some_and(|e| e.same_release(package)) {
            debug!("package record for {} unchanged", package.name);
            return Ok(PackageWrite::Unchanged);
        }

        validate(package).map_err(KvError::SchemaValidation)?;

        let key = keys::package(&package.name);
        let value = package.to_json().map_err(KvError::SchemaValidation)?;
        let written = store.bulk_write(Namespace::Packages, vec![KvRecord::new(&key, value)])?;
        if !written.contains(&key) {
            return Err(KvError::ZeroWrite {
                namespace: Namespace::Packages,
                key,
            });
        }

        Ok(if existing.is_some() {
            PackageWrite::Updated
        } else {
            PackageWrite::Inserted
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::MemoryBackend;

    fn package(version: &str, filename: &str) -> Package {
        let mut pkg = Package::new("foo");
        pkg.version = Some(version.into());
        pkg.filename = Some(filename.into());
        pkg
    }

    fn seeded(pkg: &Package) -> (Arc<MemoryBackend>, KvStore) {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(Namespace::Packages, "foo", pkg.to_json().unwrap(), None);
        (backend.clone(), KvStore::new(backend, 1))
    }

    #[test]
    fn test_first_insert() {
        let backend = Arc::new(MemoryBackend::new());
        let store = KvStore::new(backend.clone(), 1);
        let outcome = PackagesRepository::update(&store, &package("1.0.0", "foo.js")).unwrap();
        assert_eq!(outcome, PackageWrite::Inserted);
        assert_eq!(backend.write_calls(), 1);
        let stored = PackagesRepository::read(&store, "foo").unwrap().unwrap();
        assert_eq!(stored.version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_unchanged_release_issues_no_write() {
        let stored = package("1.0.0", "foo.js");
        let (backend, store) = seeded(&stored);

        let mut candidate = stored.clone();
        candidate.description = Some("only descriptive fields differ".into());
        let outcome = PackagesRepository::update(&store, &candidate).unwrap();

        assert_eq!(outcome, PackageWrite::Unchanged);
        assert!(!outcome.changed());
        assert_eq!(backend.write_calls(), 0);
    }

    #[test]
    fn test_changed_version_overwrites() {
        let (backend, store) = seeded(&package("1.0.0", "foo.js"));
        let outcome = PackagesRepository::update(&store, &package("1.1.0", "foo.min.js")).unwrap();
        assert_eq!(outcome, PackageWrite::Updated);
        assert_eq!(backend.write_calls(), 1);
    }

    #[test]
    fn test_invalid_record_never_written() {
        let stored = package("1.0.0", "foo.js");
        let (backend, store) = seeded(&stored);

        let bad = package("1.1.0", "../escape.js");
        assert!(matches!(
            PackagesRepository::update(&store, &bad),
            Err(KvError::SchemaValidation(_))
        ));
        assert_eq!(backend.write_calls(), 0);
        let kept = PackagesRepository::read(&store, "foo").unwrap().unwrap();
        assert_eq!(kept, stored);
    }

    #[test]
    fn test_corrupt_record() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(Namespace::Packages, "foo", b"{not json".to_vec(), None);
        let store = KvStore::new(backend, 1);
        assert!(matches!(
            PackagesRepository::read(&store, "foo"),
            Err(KvError::Corrupt { .. })
        ));
    }
}
