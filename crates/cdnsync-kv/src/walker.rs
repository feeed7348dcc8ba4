//! Read-only browsing of the store as a `/`-separated tree.

use std::{collections::BTreeSet, io::Read as _};

use flate2::read::GzDecoder;
use serde_json::Value;

use crate::{error::Result, namespace::Namespace, store::KvStore};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum TreeEntry {
    /// A key prefix with more keys below it, shown with a trailing `/`.
    Branch(String),
    Leaf(String),
}

impl TreeEntry {
    pub fn name(&self) -> &str {
        match self {
            TreeEntry::Branch(name) | TreeEntry::Leaf(name) => name,
        }
    }
}

/// A record rendered for display.
#[derive(Debug, Clone)]
pub struct RecordView {
    pub key: String,
    pub size: usize,
    /// UTF-8 content, decompressed first for gzip values. `None` for binary.
    pub text: Option<String>,
    pub metadata: Option<Value>,
}

pub struct KvTree<'a> {
    store: &'a KvStore,
}

impl<'a> KvTree<'a> {
    pub fn new(store: &'a KvStore) -> Self {
        Self { store }
    }

    /// The immediate children of `path` in `namespace`.
    pub fn list(&self, namespace: Namespace, path: &str) -> Result<Vec<TreeEntry>> {
        let prefix = match path.trim_matches('/') {
            "" => String::new(),
            p => format!("{p}/"),
        };

        let entries: BTreeSet<TreeEntry> = self
            .store
            .list_keys(namespace, &prefix)?
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty())
            .map(|rest| {
                match rest.split_once('/') {
                    Some((head, _)) => TreeEntry::Branch(format!("{head}/")),
                    None => TreeEntry::Leaf(rest.to_string()),
                }
            })
            .collect();
        Ok(entries.into_iter().collect())
    }

    pub fn get(&self, namespace: Namespace, key: &str) -> Result<RecordView> {
        let value = self.store.read(namespace, key)?;
        let metadata = self.store.read_metadata(namespace, key)?;
        Ok(RecordView {
            key: key.to_string(),
            size: value.len(),
            text: render(&value),
            metadata,
        })
    }
}

fn render(value: &[u8]) -> Option<String> {
    if value.starts_with(&[0x1f, 0x8b]) {
        let mut out = String::new();
        if GzDecoder::new(value).read_to_string(&mut out).is_ok() {
            return Some(out);
        }
    }
    std::str::from_utf8(value).ok().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cdnsync_package::Asset;

    use super::*;
    use crate::{memory::MemoryBackend, repository::AggregatedRepository};

    fn store() -> KvStore {
        let backend = Arc::new(MemoryBackend::new());
        for key in ["vue/3.0.0/vue.js.br", "vue/3.0.0/dist/x.js.gz", "vue/3.1.0/vue.js.br", "vuex/4.0.0/a.js.br"] {
            backend.insert(Namespace::Files, key, b"x".to_vec(), None);
        }
        KvStore::new(backend, 1)
    }

    #[test]
    fn test_list_levels() {
        let store = store();
        let tree = KvTree::new(&store);
        assert_eq!(
            tree.list(Namespace::Files, "").unwrap(),
            vec![
                TreeEntry::Branch("vue/".into()),
                TreeEntry::Branch("vuex/".into())
            ]
        );
        assert_eq!(
            tree.list(Namespace::Files, "vue/3.0.0").unwrap(),
            vec![
                TreeEntry::Branch("dist/".into()),
                TreeEntry::Leaf("vue.js.br".into())
            ]
        );
    }

    #[test]
    fn test_get_decompresses_gzip() {
        let store = store();
        AggregatedRepository::append(&store, "vue", Asset::new("3.0.0", vec!["vue.js".into()]))
            .unwrap();
        let view = KvTree::new(&store).get(Namespace::Aggregated, "vue").unwrap();
        assert!(view.text.unwrap().contains("\"3.0.0\""));
        assert!(view.metadata.is_none());
    }
}
