//! Read-only views of the KV store for debugging.

use cdnsync_core::CoreResult;
use cdnsync_kv::{
    walker::{KvTree, RecordView, TreeEntry},
    Namespace,
};

use crate::SyncContext;

/// Children of `path` in `namespace`, branches first.
pub fn list(ctx: &SyncContext, namespace: Namespace, path: &str) -> CoreResult<Vec<TreeEntry>> {
    Ok(KvTree::new(ctx.store()).list(namespace, path)?)
}

pub fn get(ctx: &SyncContext, namespace: Namespace, key: &str) -> CoreResult<RecordView> {
    Ok(KvTree::new(ctx.store()).get(namespace, key)?)
}
