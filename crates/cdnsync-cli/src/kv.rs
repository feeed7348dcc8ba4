use cdnsync_core::CoreResult;
use cdnsync_kv::{walker::TreeEntry, Namespace};
use cdnsync_operations::{browse, SyncContext};
use nu_ansi_term::Color::{Blue, Cyan};
use tracing::info;

use crate::utils::Colored;

pub fn list_keys(ctx: &SyncContext, namespace: Namespace, path: &str) -> CoreResult<()> {
    let entries = browse::list(ctx, namespace, path)?;
    if entries.is_empty() {
        info!("No keys under '{path}' in {namespace}");
        return Ok(());
    }

    for entry in entries {
        match entry {
            TreeEntry::Branch(name) => info!("{}", Colored(Blue, name)),
            TreeEntry::Leaf(name) => info!("{name}"),
        }
    }
    Ok(())
}

pub fn get_record(ctx: &SyncContext, namespace: Namespace, key: &str) -> CoreResult<()> {
    let record = browse::get(ctx, namespace, key)?;

    info!("{} {} ({} bytes)", Colored(Cyan, namespace), record.key, record.size);
    if let Some(metadata) = &record.metadata {
        let pretty = serde_json::to_string_pretty(metadata).unwrap_or_else(|_| metadata.to_string());
        info!("metadata: {pretty}");
    }
    match record.text {
        Some(text) => info!("{text}"),
        None => info!("<binary value>"),
    }
    Ok(())
}
