//! KV metadata store for cdnsync.
//!
//! The store is split into five namespaces, each with its own update rule:
//!
//! - `files`: one record per published (usually compressed) file
//! - `versions`: the logical file list of one version
//! - `packages`: the authoritative package document, read-modify-write
//! - `aggregated`: gzip JSON list of every version's assets
//! - `sri`: metadata-only integrity records
//!
//! There are no cross-namespace transactions. Every write is a pure function
//! of its source data, so a failed run is repaired by rerunning it.

pub mod backend;
pub mod cloudflare;
pub mod error;
pub mod memory;
pub mod namespace;
pub mod repository;
pub mod store;
pub mod walker;

pub use backend::{KvBackend, KvRecord};
pub use cloudflare::CloudflareBackend;
pub use error::{KvError, Result};
pub use memory::MemoryBackend;
pub use namespace::{keys, strip_compression_suffix, Namespace};
pub use store::{KvStore, DEFAULT_READ_ATTEMPTS};
