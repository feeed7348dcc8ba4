//! Version resolution, ingestion and publishing for cdnsync.
//!
//! A package's upstream candidates are diffed against what the KV store
//! already holds ([`resolver`]). Each new version is optimized inside a
//! [`sandbox`], compressed and hashed ([`ingest`]), then written namespace by
//! namespace ([`publish`]).

pub mod compress;
pub mod error;
pub mod ingest;
pub mod message;
pub mod optimize;
pub mod publish;
pub mod resolver;
pub mod sandbox;
pub mod search;
pub mod version;

pub use error::{CoreError, CoreResult, ErrorContext};
pub use ingest::{Ingestor, ProcessedVersion};
pub use publish::{PublishOutcome, Publisher, Reconciled};
pub use resolver::{continue_filename, current_version, Resolution, Resolver};
pub use version::{ExistingVersion, ImportedVersion, Version};
