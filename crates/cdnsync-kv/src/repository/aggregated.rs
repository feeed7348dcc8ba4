use std::io::{Read as _, Write as _};

use cdnsync_package::Asset;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tracing::warn;

use crate::{
    backend::KvRecord,
    error::{ErrorContext, KvError, Result},
    namespace::{keys, Namespace},
    store::KvStore,
};

pub struct AggregatedRepository;

impl AggregatedRepository {
    fn decode(key: &str, bytes: &[u8]) -> Result<Vec<Asset>> {
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .map_err(|err| corrupt(key, err.to_string()))?;
        serde_json::from_slice(&json).map_err(|err| corrupt(key, err.to_string()))
    }

    fn encode(assets: &[Asset]) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(assets).map_err(|source| {
            KvError::Encode {
                what: "aggregated assets",
                source,
            }
        })?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder
            .write_all(&json)
            .with_context(|| "compressing aggregated assets".to_string())?;
        encoder
            .finish()
            .with_context(|| "compressing aggregated assets".to_string())
    }

    pub fn read(store: &KvStore, package: &str) -> Result<Option<Vec<Asset>>> {
        let key = keys::package(package);
        store
            .read_optional(Namespace::Aggregated, &key)?
            .map(|bytes| Self::decode(&key, &bytes))
            .transpose()
    }

    fn store_assets(
        store: &KvStore,
        key: String,
        assets: &[Asset],
        had_existing: bool,
    ) -> Result<()> {
        let written = store.bulk_write(
            Namespace::Aggregated,
            vec![KvRecord::new(&key, Self::encode(assets)?)],
        )?;
        if written.contains(&key) {
            return Ok(());
        }
        if had_existing {
            return Err(KvError::ZeroWrite {
                namespace: Namespace::Aggregated,
                key,
            });
        }
        warn!("aggregated insert for {key} acknowledged no keys");
        Ok(())
    }

    /// Appends `asset` to the package's list, creating the list on first
    /// insert. Assets of other versions are never merged or deduplicated; an
    /// asset already recorded for the same version is replaced in place so a
    /// retried publish does not list the version twice.
    pub fn append(store: &KvStore, package: &str, asset: Asset) -> Result<Vec<Asset>> {
        let key = keys::package(package);
        let existing = Self::read(store, package)?;
        let had_existing = existing.is_some();

        let mut assets = existing.unwrap_or_default();
        match assets.iter_mut().find(|a| a.version == asset.version) {
            Some(slot) => *slot = asset,
            None => assets.push(asset),
        }
        Self::store_assets(store, key, &assets, had_existing)?;
        Ok(assets)
    }

    /// Drops every asset recorded for `version`. Returns `false` when nothing
    /// matched and no write was issued.
    pub fn remove_version(store: &KvStore, package: &str, version: &str) -> Result<bool> {
        let key = keys::package(package);
        let Some(mut assets) = Self::read(store, package)? else {
            return Ok(false);
        };

        let before = assets.len();
        assets.retain(|a| a.version != version);
        if assets.len() == before {
            return Ok(false);
        }

        Self::store_assets(store, key, &assets, true)?;
        Ok(true)
    }
}

fn corrupt(key: &str, reason: String) -> KvError {
    KvError::Corrupt {
        namespace: Namespace::Aggregated,
        key: key.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::{InjectedFailure, MemoryBackend};

    fn asset(version: &str, files: &[&str]) -> Asset {
        Asset::new(version, files.iter().map(|f| f.to_string()).collect())
    }

    fn store() -> (Arc<MemoryBackend>, KvStore) {
        let backend = Arc::new(MemoryBackend::new());
        (backend.clone(), KvStore::new(backend, 1))
    }

    #[test]
    fn test_first_insert_is_single_asset() {
        let (_, store) = store();
        let merged =
            AggregatedRepository::append(&store, "foo", asset("1.0.0", &["a.js"])).unwrap();
        assert_eq!(merged, vec![asset("1.0.0", &["a.js"])]);
        assert_eq!(
            AggregatedRepository::read(&store, "foo").unwrap(),
            Some(merged)
        );
    }

    #[test]
    fn test_append_does_not_dedup_across_versions() {
        let (_, store) = store();
        AggregatedRepository::append(&store, "foo", asset("1.0.0", &["a.js"])).unwrap();
        let merged =
            AggregatedRepository::append(&store, "foo", asset("1.1.0", &["a.js", "b.js"]))
                .unwrap();
        assert_eq!(
            merged,
            vec![asset("1.0.0", &["a.js"]), asset("1.1.0", &["a.js", "b.js"])]
        );
    }

    #[test]
    fn test_append_same_version_replaces() {
        let (_, store) = store();
        AggregatedRepository::append(&store, "foo", asset("1.0.0", &["a.js"])).unwrap();
        AggregatedRepository::append(&store, "foo", asset("1.1.0", &["b.js"])).unwrap();
        let merged =
            AggregatedRepository::append(&store, "foo", asset("1.0.0", &["a.js", "c.js"]))
                .unwrap();
        assert_eq!(
            merged,
            vec![asset("1.0.0", &["a.js", "c.js"]), asset("1.1.0", &["b.js"])]
        );
    }

    #[test]
    fn test_stored_value_is_gzip() {
        let (backend, store) = store();
        AggregatedRepository::append(&store, "foo", asset("1.0.0", &["a.js"])).unwrap();
        let raw = backend.get(Namespace::Aggregated, "foo").unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_remove_version() {
        let (backend, store) = store();
        AggregatedRepository::append(&store, "foo", asset("1.0.0", &["a.js"])).unwrap();
        AggregatedRepository::append(&store, "foo", asset("1.1.0", &["b.js"])).unwrap();

        assert!(AggregatedRepository::remove_version(&store, "foo", "1.1.0").unwrap());
        assert_eq!(
            AggregatedRepository::read(&store, "foo").unwrap(),
            Some(vec![asset("1.0.0", &["a.js"])])
        );

        let writes = backend.write_calls();
        assert!(!AggregatedRepository::remove_version(&store, "foo", "9.9.9").unwrap());
        assert!(!AggregatedRepository::remove_version(&store, "bar", "1.0.0").unwrap());
        assert_eq!(backend.write_calls(), writes);
    }

    #[test]
    fn test_zero_write_with_existing_row_is_error() {
        let (backend, store) = store();
        AggregatedRepository::append(&store, "foo", asset("1.0.0", &["a.js"])).unwrap();
        backend.fail_writes(Namespace::Aggregated, InjectedFailure::ZeroWrite);

        assert!(matches!(
            AggregatedRepository::append(&store, "foo", asset("1.1.0", &["b.js"])),
            Err(KvError::ZeroWrite { .. })
        ));
    }
}
