//! Package-level operations driven by the `cdnsync` binary.

pub mod browse;
pub mod context;
pub mod remove;
pub mod sync;
pub mod types;

pub use context::{ContextParts, SyncContext};
pub use types::*;
