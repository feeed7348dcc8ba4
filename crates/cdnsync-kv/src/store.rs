use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::{
    backend::{KvBackend, KvRecord},
    error::{KvError, Result},
    namespace::Namespace,
};

/// Default number of attempts for a read that hits a service failure.
pub const DEFAULT_READ_ATTEMPTS: u32 = 5;

/// Retrying front of a [`KvBackend`].
///
/// Reads that fail with [`KvError::ServiceFailure`] are retried immediately
/// up to the attempt budget. Writes are never retried here: each namespace
/// write is idempotent and is re-derived on the next run instead.
#[derive(Clone)]
pub struct KvStore {
    backend: Arc<dyn KvBackend>,
    read_attempts: u32,
}

impl KvStore {
    pub fn new(backend: Arc<dyn KvBackend>, read_attempts: u32) -> Self {
        Self {
            backend,
            read_attempts: read_attempts.max(1),
        }
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    fn with_retry<T>(
        &self,
        namespace: Namespace,
        key: &str,
        op: impl Fn() -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_retryable() && attempt < self.read_attempts => {
                    warn!(
                        "read {namespace}/{key} failed (attempt {attempt}/{}): {err}",
                        self.read_attempts
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    pub fn read(&self, namespace: Namespace, key: &str) -> Result<Vec<u8>> {
        self.with_retry(namespace, key, || self.backend.read(namespace, key))
    }

    /// Like [`KvStore::read`], mapping a missing key to `None`.
    pub fn read_optional(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        match self.read(namespace, key) {
            Ok(value) => Ok(Some(value)),
            Err(KvError::KeyNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn read_metadata(&self, namespace: Namespace, key: &str) -> Result<Option<Value>> {
        match self.with_retry(namespace, key, || self.backend.read_metadata(namespace, key)) {
            Err(KvError::KeyNotFound { .. }) => Ok(None),
            other => other,
        }
    }

    pub fn list_keys(&self, namespace: Namespace, prefix: &str) -> Result<Vec<String>> {
        self.with_retry(namespace, prefix, || self.backend.list_keys(namespace, prefix))
    }

    pub fn bulk_write(&self, namespace: Namespace, records: Vec<KvRecord>) -> Result<Vec<String>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        self.backend.bulk_write(namespace, records)
    }
}
