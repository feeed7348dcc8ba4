use std::{collections::BTreeMap, fs, path::PathBuf};

use cdnsync_utils::{
    hash::is_hashable,
    time::{epoch_seconds, etag, http_date},
};
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    backend::KvRecord,
    error::{ErrorContext, Result},
    namespace::{keys, strip_compression_suffix, Namespace},
    store::KvStore,
};

/// A file ready to be uploaded, named as it is stored (suffix included).
#[derive(Debug, Clone)]
pub struct PublishedFile {
    pub name: String,
    pub path: PathBuf,
}

pub struct FilesRepository;

impl FilesRepository {
    /// Builds the record for one file: its bytes plus `etag`, `lastModified`
    /// and, when known for the logical name, `sri` metadata.
    pub fn record(
        package: &str,
        version: &str,
        file: &PublishedFile,
        sri: &BTreeMap<String, String>,
    ) -> Result<KvRecord> {
        let bytes =
            fs::read(&file.path).with_context(|| format!("reading {}", file.path.display()))?;
        let modified = fs::metadata(&file.path)
            .and_then(|m| m.modified())
            .with_context(|| format!("reading mtime of {}", file.path.display()))?;

        let mut metadata = json!({
            "etag": etag(epoch_seconds(modified), bytes.len() as u64),
            "lastModified": http_date(modified),
        });
        if let Some(hash) = sri.get(strip_compression_suffix(&file.name)) {
            metadata["sri"] = Value::String(hash.clone());
        }

        Ok(KvRecord::new(keys::file(package, version, &file.name), bytes).with_metadata(metadata))
    }

    /// Uploads every file of a version in one bulk write and returns the
    /// acknowledged keys.
    pub fn write(
        store: &KvStore,
        package: &str,
        version: &str,
        files: &[PublishedFile],
        sri: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let records = files
            .iter()
            .map(|f| Self::record(package, version, f, sri))
            .collect::<Result<Vec<_>>>()?;
        debug!("writing {} file record(s) for {package}@{version}", records.len());
        store.bulk_write(Namespace::Files, records)
    }

    /// Integrity hashes carried by the stored file records of a version,
    /// keyed by logical name. One compressed sibling per name is consulted.
    pub fn stored_sri(
        store: &KvStore,
        package: &str,
        version: &str,
    ) -> Result<BTreeMap<String, String>> {
        let prefix = keys::file(package, version, "");
        let mut hashes = BTreeMap::new();
        for key in store.list_keys(Namespace::Files, &prefix)? {
            let Some(name) = key.strip_prefix(&prefix) else {
                continue;
            };
            let logical = strip_compression_suffix(name);
            if !is_hashable(logical) || hashes.contains_key(logical) {
                continue;
            }
            let hash = store
                .read_metadata(Namespace::Files, &key)?
                .and_then(|m| m.get("sri").and_then(Value::as_str).map(str::to_string));
            if let Some(hash) = hash {
                hashes.insert(logical.to_string(), hash);
            }
        }
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use super::*;
    use crate::memory::MemoryBackend;

    #[test]
    fn test_write_records_with_metadata() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js.br"), b"br-bytes").unwrap();
        fs::write(dir.path().join("a.js.gz"), b"gz-bytes!").unwrap();
        fs::write(dir.path().join("font.woff2"), b"woff").unwrap();

        let files: Vec<PublishedFile> = ["a.js.br", "a.js.gz", "font.woff2"]
            .iter()
            .map(|n| {
                PublishedFile {
                    name: n.to_string(),
                    path: dir.path().join(n),
                }
            })
            .collect();
        let sri = BTreeMap::from([("a.js".to_string(), "sha512-abc".to_string())]);

        let backend = Arc::new(MemoryBackend::new());
        let store = KvStore::new(backend.clone(), 1);
        let written = FilesRepository::write(&store, "demo", "1.0.0", &files, &sri).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(backend.write_calls(), 1);

        let gz_meta = store
            .read_metadata(Namespace::Files, "demo/1.0.0/a.js.gz")
            .unwrap()
            .unwrap();
        assert_eq!(gz_meta["sri"], "sha512-abc");
        assert!(gz_meta["etag"].as_str().unwrap().ends_with("-9"));
        assert!(gz_meta["lastModified"].as_str().unwrap().ends_with(" GMT"));

        let font_meta = store
            .read_metadata(Namespace::Files, "demo/1.0.0/font.woff2")
            .unwrap()
            .unwrap();
        assert!(font_meta.get("sri").is_none());
        assert_eq!(
            backend.get(Namespace::Files, "demo/1.0.0/font.woff2").unwrap(),
            b"woff"
        );
    }

    #[test]
    fn test_stored_sri_from_file_metadata() {
        let dir = tempdir().unwrap();
        let mut files = Vec::new();
        for name in ["a.js.br", "a.js.gz", "b.css.gz", "font.woff2"] {
            fs::write(dir.path().join(name), name).unwrap();
            files.push(PublishedFile {
                name: name.to_string(),
                path: dir.path().join(name),
            });
        }
        let sri = BTreeMap::from([
            ("a.js".to_string(), "sha512-a".to_string()),
            ("b.css".to_string(), "sha512-b".to_string()),
        ]);

        let backend = Arc::new(MemoryBackend::new());
        let store = KvStore::new(backend.clone(), 1);
        FilesRepository::write(&store, "demo", "1.0.0", &files, &sri).unwrap();
        FilesRepository::write(&store, "demo", "1.0.10", &files[..1], &BTreeMap::new()).unwrap();

        assert_eq!(
            FilesRepository::stored_sri(&store, "demo", "1.0.0").unwrap(),
            sri
        );
        assert!(FilesRepository::stored_sri(&store, "demo", "1.0.10")
            .unwrap()
            .is_empty());
        assert!(FilesRepository::stored_sri(&store, "demo", "2.0.0")
            .unwrap()
            .is_empty());
    }
}
