use std::collections::BTreeMap;

use serde_json::json;

use crate::{
    backend::KvRecord,
    error::Result,
    namespace::{keys, Namespace},
    store::KvStore,
};

pub struct SriRepository;

impl SriRepository {
    /// Writes one metadata-only record per logical file. The value is empty;
    /// the hash lives in the record's `sri` metadata.
    pub fn write(
        store: &KvStore,
        package: &str,
        version: &str,
        hashes: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let records = hashes
            .iter()
            .map(|(path, hash)| {
                KvRecord::new(keys::file(package, version, path), Vec::new())
                    .with_metadata(json!({ "sri": hash }))
            })
            .collect();
        store.bulk_write(Namespace::Sri, records)
    }

    pub fn read(store: &KvStore, package: &str, version: &str, path: &str) -> Result<Option<String>> {
        let metadata = store.read_metadata(Namespace::Sri, &keys::file(package, version, path))?;
        Ok(metadata
            .and_then(|m| m.get("sri").and_then(|v| v.as_str()).map(str::to_string)))
    }
}
