use std::collections::HashSet;

use serde_json::{json, Value};

use crate::{
    backend::KvRecord,
    error::{KvError, Result},
    namespace::{keys, strip_compression_suffix, Namespace},
    store::KvStore,
};

pub struct VersionsRepository;

impl VersionsRepository {
    /// Published names with compression suffixes stripped, deduplicated in
    /// first-seen order.
    pub fn published_names<S: AsRef<str>>(files: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        files
            .iter()
            .map(|f| strip_compression_suffix(f.as_ref()))
            .filter(|name| seen.insert(*name))
            .map(str::to_string)
            .collect()
    }

    pub fn write<S: AsRef<str>>(
        store: &KvStore,
        package: &str,
        version: &str,
        files: &[S],
    ) -> Result<Vec<String>> {
        let names = Self::published_names(files);
        let value = serde_json::to_vec(&names).map_err(|source| {
            KvError::Encode {
                what: "version file list",
                source,
            }
        })?;
        store.bulk_write(
            Namespace::Versions,
            vec![KvRecord::new(keys::version(package, version), value)],
        )
    }

    pub fn read(store: &KvStore, package: &str, version: &str) -> Result<Option<Vec<String>>> {
        let key = keys::version(package, version);
        let Some(bytes) = store.read_optional(Namespace::Versions, &key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|err| {
            KvError::Corrupt {
                namespace: Namespace::Versions,
                key,
                reason: err.to_string(),
            }
        })
    }

    /// Flags the version record as withdrawn by an operator, keeping its file
    /// list. Re-importing the version writes a fresh record without the flag.
    /// Returns `false` when the version has no record.
    pub fn mark_removed(store: &KvStore, package: &str, version: &str) -> Result<bool> {
        let key = keys::version(package, version);
        let Some(value) = store.read_optional(Namespace::Versions, &key)? else {
            return Ok(false);
        };
        let written = store.bulk_write(
            Namespace::Versions,
            vec![KvRecord::new(key.clone(), value).with_metadata(json!({ "removed": true }))],
        )?;
        if !written.contains(&key) {
            return Err(KvError::ZeroWrite {
                namespace: Namespace::Versions,
                key,
            });
        }
        Ok(true)
    }

    pub fn is_removed(store: &KvStore, package: &str, version: &str) -> Result<bool> {
        let metadata = store.read_metadata(Namespace::Versions, &keys::version(package, version))?;
        Ok(metadata
            .and_then(|m| m.get("removed").and_then(Value::as_bool))
            .unwrap_or(false))
    }

    /// Every version of `package` with a version record.
    pub fn list(store: &KvStore, package: &str) -> Result<Vec<String>> {
        let prefix = keys::versions_prefix(package);
        Ok(store
            .list_keys(Namespace::Versions, &prefix)?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .filter(|version| !version.is_empty() && !version.contains('/'))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::MemoryBackend;

    #[test]
    fn test_published_names_dedup_and_strip() {
        let names = VersionsRepository::published_names(&[
            "a.js.br", "a.js.gz", "b.css.gz", "b.css.br", "font.woff",
        ]);
        assert_eq!(names, vec!["a.js", "b.css", "font.woff"]);
    }

    #[test]
    fn test_write_read_list() {
        let backend = Arc::new(MemoryBackend::new());
        let store = KvStore::new(backend, 1);
        VersionsRepository::write(&store, "vue", "3.0.0", &["vue.js.br", "vue.js.gz"]).unwrap();
        VersionsRepository::write(&store, "vue", "3.1.0", &["vue.js.br"]).unwrap();
        VersionsRepository::write(&store, "vuex", "4.0.0", &["vuex.js.br"]).unwrap();

        assert_eq!(
            VersionsRepository::read(&store, "vue", "3.0.0").unwrap(),
            Some(vec!["vue.js".to_string()])
        );
        assert_eq!(VersionsRepository::read(&store, "vue", "9.9.9").unwrap(), None);
        assert_eq!(
            VersionsRepository::list(&store, "vue").unwrap(),
            vec!["3.0.0", "3.1.0"]
        );
    }

    #[test]
    fn test_mark_removed_until_rewritten() {
        let backend = Arc::new(MemoryBackend::new());
        let store = KvStore::new(backend, 1);
        VersionsRepository::write(&store, "vue", "3.0.0", &["vue.js.br"]).unwrap();
        assert!(!VersionsRepository::is_removed(&store, "vue", "3.0.0").unwrap());

        assert!(VersionsRepository::mark_removed(&store, "vue", "3.0.0").unwrap());
        assert!(VersionsRepository::is_removed(&store, "vue", "3.0.0").unwrap());
        assert_eq!(
            VersionsRepository::read(&store, "vue", "3.0.0").unwrap(),
            Some(vec!["vue.js".to_string()])
        );
        assert!(!VersionsRepository::mark_removed(&store, "vue", "9.9.9").unwrap());

        VersionsRepository::write(&store, "vue", "3.0.0", &["vue.js.br"]).unwrap();
        assert!(!VersionsRepository::is_removed(&store, "vue", "3.0.0").unwrap());
    }
}
