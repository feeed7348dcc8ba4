//! Upstream access for cdnsync: version sources for npm and git, and staging
//! of a release's fileMap selection on local disk.

pub mod error;
pub mod git;
pub mod http_client;
pub mod npm;
pub mod source;
pub mod staging;
pub mod types;

pub use error::{DownloadError, Result};
pub use source::{Sources, VersionSource};
pub use types::{Candidate, StagedVersion};
