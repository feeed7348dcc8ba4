use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

use serde_json::Value;

use crate::{
    backend::{KvBackend, KvRecord},
    error::{KvError, Result},
    namespace::Namespace,
};

#[derive(Debug, Clone)]
struct Stored {
    value: Vec<u8>,
    metadata: Option<Value>,
}

/// Failure injected into the next calls against a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Service,
    Auth,
    /// The write call succeeds but acknowledges no keys.
    ZeroWrite,
}

/// In-process backend used for dry runs and tests.
///
/// Counts every call so callers can assert on how many writes were issued.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<BTreeMap<(Namespace, String), Stored>>,
    read_failures: Mutex<HashMap<Namespace, Vec<InjectedFailure>>>,
    write_failures: Mutex<HashMap<Namespace, InjectedFailure>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record without counting it as a write.
    pub fn insert(&self, namespace: Namespace, key: &str, value: Vec<u8>, metadata: Option<Value>) {
        lock(&self.data).insert(
            (namespace, key.to_string()),
            Stored {
                value,
                metadata,
            },
        );
    }

    /// Makes the next `count` reads or listings in `namespace` fail with
    /// `failure`.
    pub fn fail_reads(&self, namespace: Namespace, failure: InjectedFailure, count: usize) {
        lock(&self.read_failures)
            .entry(namespace)
            .or_default()
            .extend(std::iter::repeat_n(failure, count));
    }

    /// Makes every write to `namespace` fail with `failure` until cleared.
    pub fn fail_writes(&self, namespace: Namespace, failure: InjectedFailure) {
        lock(&self.write_failures).insert(namespace, failure);
    }

    pub fn clear_failures(&self) {
        lock(&self.read_failures).clear();
        lock(&self.write_failures).clear();
    }

    /// Number of read and metadata calls made so far.
    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of bulk write calls made so far.
    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn get(&self, namespace: Namespace, key: &str) -> Option<Vec<u8>> {
        lock(&self.data)
            .get(&(namespace, key.to_string()))
            .map(|s| s.value.clone())
    }

    pub fn keys(&self, namespace: Namespace) -> Vec<String> {
        lock(&self.data)
            .keys()
            .filter(|(ns, _)| *ns == namespace)
            .map(|(_, k)| k.clone())
            .collect()
    }

    fn take_read_failure(&self, namespace: Namespace) -> Option<InjectedFailure> {
        let mut failures = lock(&self.read_failures);
        let queue = failures.get_mut(&namespace)?;
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    }

    fn injected(namespace: Namespace, failure: InjectedFailure) -> KvError {
        match failure {
            InjectedFailure::Auth => {
                KvError::Auth {
                    namespace,
                    status: 403,
                }
            }
            InjectedFailure::Service | InjectedFailure::ZeroWrite => {
                KvError::ServiceFailure {
                    namespace,
                    reason: "injected failure".into(),
                }
            }
        }
    }

    fn lookup(&self, namespace: Namespace, key: &str) -> Result<Stored> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.take_read_failure(namespace) {
            return Err(Self::injected(namespace, failure));
        }
        lock(&self.data)
            .get(&(namespace, key.to_string()))
            .cloned()
            .ok_or_else(|| {
                KvError::KeyNotFound {
                    namespace,
                    key: key.to_string(),
                }
            })
    }
}

impl KvBackend for MemoryBackend {
    fn read(&self, namespace: Namespace, key: &str) -> Result<Vec<u8>> {
        self.lookup(namespace, key).map(|s| s.value)
    }

    fn read_metadata(&self, namespace: Namespace, key: &str) -> Result<Option<Value>> {
        self.lookup(namespace, key).map(|s| s.metadata)
    }

    fn bulk_write(&self, namespace: Namespace, records: Vec<KvRecord>) -> Result<Vec<String>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        match lock(&self.write_failures).get(&namespace).copied() {
            Some(InjectedFailure::ZeroWrite) => return Ok(Vec::new()),
            Some(failure) => return Err(Self::injected(namespace, failure)),
            None => {}
        }

        let mut data = lock(&self.data);
        let mut written = Vec::with_capacity(records.len());
        let mut seen = HashSet::new();
        for record in records {
            if seen.insert(record.key.clone()) {
                written.push(record.key.clone());
            }
            data.insert(
                (namespace, record.key),
                Stored {
                    value: record.value,
                    metadata: record.metadata,
                },
            );
        }
        Ok(written)
    }

    fn list_keys(&self, namespace: Namespace, prefix: &str) -> Result<Vec<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.take_read_failure(namespace) {
            return Err(Self::injected(namespace, failure));
        }
        Ok(lock(&self.data)
            .keys()
            .filter(|(ns, key)| *ns == namespace && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect())
    }
}
