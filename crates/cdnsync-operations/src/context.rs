use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use cdnsync_audit::{AuditHandle, FsAuditLog, NullAudit};
use cdnsync_config::{Config, KvBackendKind};
use cdnsync_core::{
    sandbox,
    search::{AlgoliaIndex, GithubClient, SearchSync},
    CoreResult, Ingestor, Publisher,
};
use cdnsync_dl::Sources;
use cdnsync_kv::{cloudflare::NamespaceIds, CloudflareBackend, KvBackend, KvStore, MemoryBackend};
use tracing::{debug, info};

/// Everything a sync run needs, built once from the configuration.
pub struct SyncContext {
    store: KvStore,
    audit: AuditHandle,
    sources: Sources,
    ingestor: Ingestor,
    publisher: Publisher,
    packages_path: PathBuf,
    work_root: PathBuf,
    max_initial_versions: usize,
    cancel: Arc<AtomicBool>,
}

/// Parts of a [`SyncContext`] that are swapped out in dry runs and tests.
pub struct ContextParts {
    pub backend: Arc<dyn KvBackend>,
    pub read_attempts: u32,
    pub audit: AuditHandle,
    pub sources: Sources,
    pub sandbox: Box<dyn sandbox::Sandbox>,
    pub search: SearchSync,
    pub workers: usize,
    pub packages_path: PathBuf,
    pub work_root: PathBuf,
    pub max_initial_versions: usize,
}

impl SyncContext {
    pub fn from_parts(parts: ContextParts) -> Self {
        let store = KvStore::new(parts.backend, parts.read_attempts);
        Self {
            ingestor: Ingestor::new(parts.sandbox, parts.workers, parts.audit.clone()),
            publisher: Publisher::new(store.clone(), parts.audit.clone(), parts.search),
            store,
            audit: parts.audit,
            sources: parts.sources,
            packages_path: parts.packages_path,
            work_root: parts.work_root,
            max_initial_versions: parts.max_initial_versions,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Builds the context described by `config`.
    ///
    /// A dry run writes to an in-memory store and disables audit and search
    /// sync, so nothing outside the cache directory is touched.
    pub fn new(config: &Config, dry_run: bool) -> CoreResult<Self> {
        let cache = config.get_cache_path()?;

        let backend: Arc<dyn KvBackend> =
            if dry_run || config.kv.backend == KvBackendKind::Memory {
                info!("using in-memory KV store");
                Arc::new(MemoryBackend::new())
            } else {
                config.require_cloudflare()?;
                let ns = &config.kv.namespaces;
                Arc::new(CloudflareBackend::new(
                    &config.kv.api_url,
                    &config.kv.account_id,
                    config.kv_api_token()?,
                    NamespaceIds {
                        packages: ns.packages.clone(),
                        versions: ns.versions.clone(),
                        files: ns.files.clone(),
                        aggregated: ns.aggregated.clone(),
                        sri: ns.sri.clone(),
                    },
                    config.kv.bulk_chunk_size,
                ))
            };

        let audit: AuditHandle = match config.get_audit_path()? {
            Some(path) if !dry_run => Arc::new(FsAuditLog::new(path)),
            _ => Arc::new(NullAudit),
        };

        let search = match &config.search.app_id {
            Some(app_id) if !dry_run => {
                SearchSync::new(
                    Arc::new(AlgoliaIndex::new(
                        app_id,
                        config.search_api_key()?,
                        &config.search.index,
                    )),
                    Some(GithubClient::new(config.github_token())),
                )
            }
            _ => SearchSync::disabled(),
        };

        debug!("sandbox kind: {:?}", config.sandbox.kind);
        Ok(Self::from_parts(ContextParts {
            backend,
            read_attempts: config.kv.read_attempts,
            audit,
            sources: Sources::new(&config.npm.registry, &cache),
            sandbox: sandbox::from_config(&config.sandbox, &config.optimize),
            search,
            workers: config.worker_count(),
            packages_path: config.get_packages_path()?,
            work_root: cache.join("work"),
            max_initial_versions: config.max_initial_versions,
        }))
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn packages_path(&self) -> &Path {
        &self.packages_path
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    pub fn max_initial_versions(&self) -> usize {
        self.max_initial_versions
    }

    /// Flag that stops the run before the next package once set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}
