use cdnsync_core::CoreResult;
use cdnsync_kv::repository::{AggregatedRepository, VersionsRepository};
use tracing::{debug, info};

use crate::SyncContext;

/// Drops `version` from the package's aggregated asset list.
///
/// Per-version records in the other namespaces are left in place; they are
/// keyed by version and overwritten if the version is imported again. The
/// version record is flagged as withdrawn so later syncs do not restore the
/// asset. Returns `false` when the version was not listed.
pub fn remove_version(ctx: &SyncContext, package: &str, version: &str) -> CoreResult<bool> {
    debug!(package, version, "removing version from aggregated metadata");
    if VersionsRepository::mark_removed(ctx.store(), package, version)? {
        debug!("{package}@{version}: version record flagged as withdrawn");
    }
    let removed = AggregatedRepository::remove_version(ctx.store(), package, version)?;
    if removed {
        info!("removed {package}@{version} from aggregated metadata");
    } else {
        info!("{package}@{version} is not listed in aggregated metadata");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cdnsync_audit::NullAudit;
    use cdnsync_config::OptimizeConfig;
    use cdnsync_core::{sandbox::LocalSandbox, search::SearchSync};
    use cdnsync_dl::Sources;
    use cdnsync_kv::MemoryBackend;
    use cdnsync_package::Asset;
    use tempfile::tempdir;

    use super::*;
    use crate::context::ContextParts;

    fn context(backend: Arc<MemoryBackend>, root: &std::path::Path) -> SyncContext {
        SyncContext::from_parts(ContextParts {
            backend,
            read_attempts: 1,
            audit: Arc::new(NullAudit),
            sources: Sources::new("http://127.0.0.1:9", root),
            sandbox: Box::new(LocalSandbox::new(
                OptimizeConfig {
                    js: String::new(),
                    css: String::new(),
                    png: String::new(),
                    jpg: String::new(),
                },
                false,
            )),
            search: SearchSync::disabled(),
            workers: 1,
            packages_path: root.join("packages"),
            work_root: root.join("work"),
            max_initial_versions: 10,
        })
    }

    #[test]
    fn test_remove_version() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(MemoryBackend::new());
        let ctx = context(backend, dir.path());

        VersionsRepository::write(ctx.store(), "foo", "1.0.0", &["a.js.gz"]).unwrap();
        AggregatedRepository::append(ctx.store(), "foo", Asset::new("1.0.0", vec!["a.js".into()]))
            .unwrap();
        AggregatedRepository::append(ctx.store(), "foo", Asset::new("1.1.0", vec!["a.js".into()]))
            .unwrap();

        assert!(remove_version(&ctx, "foo", "1.0.0").unwrap());
        let assets = AggregatedRepository::read(ctx.store(), "foo")
            .unwrap()
            .unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].version, "1.1.0");
        assert!(VersionsRepository::is_removed(ctx.store(), "foo", "1.0.0").unwrap());
        assert!(!VersionsRepository::is_removed(ctx.store(), "foo", "1.1.0").unwrap());

        assert!(!remove_version(&ctx, "foo", "1.0.0").unwrap());
        assert!(!remove_version(&ctx, "missing", "1.0.0").unwrap());
    }
}
