//! Package documents for cdnsync.
//!
//! This crate owns the package JSON model shared by every pipeline stage and
//! the schema check guarding writes to the authoritative package record.
//!
//! # Example
//!
//! ```
//! use cdnsync_package::{validate, Package};
//!
//! let pkg = Package::from_slice(br#"{"name": "lodash", "version": "4.17.21"}"#).unwrap();
//! validate(&pkg).unwrap();
//! ```

pub mod error;
pub mod package;
pub mod schema;

pub use error::{ErrorContext, PackageError, Result};
pub use package::{Asset, Autoupdate, FileMapEntry, Optimization, Package, Repository, Source};
pub use schema::validate;
