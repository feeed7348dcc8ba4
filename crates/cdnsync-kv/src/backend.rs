use serde_json::Value;

use crate::{error::Result, namespace::Namespace};

/// One record of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct KvRecord {
    pub key: String,
    pub value: Vec<u8>,
    pub metadata: Option<Value>,
}

impl KvRecord {
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The minimal contract a KV service has to satisfy.
///
/// Implementations perform a single attempt per call; retries belong to
/// [`crate::KvStore`].
pub trait KvBackend: Send + Sync {
    /// Reads the value stored at `key`.
    fn read(&self, namespace: Namespace, key: &str) -> Result<Vec<u8>>;

    /// Reads the metadata attached to `key`, `None` if the record has none.
    fn read_metadata(&self, namespace: Namespace, key: &str) -> Result<Option<Value>>;

    /// Writes all `records` and returns the keys the service acknowledged.
    fn bulk_write(&self, namespace: Namespace, records: Vec<KvRecord>) -> Result<Vec<String>>;

    /// Lists keys starting with `prefix`, in lexicographic order.
    fn list_keys(&self, namespace: Namespace, prefix: &str) -> Result<Vec<String>>;
}
