//! One repository per namespace, each owning that namespace's update rule.

pub mod aggregated;
pub mod files;
pub mod packages;
pub mod sri;
pub mod versions;

pub use aggregated::AggregatedRepository;
pub use files::{FilesRepository, PublishedFile};
pub use packages::{PackageWrite, PackagesRepository};
pub use sri::SriRepository;
pub use versions::VersionsRepository;
