//! Error types for the package crate.

use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur while loading or validating package documents.
#[derive(Error, Diagnostic, Debug)]
pub enum PackageError {
    #[error("Error while {action}: {source}")]
    #[diagnostic(code(cdnsync_package::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },

    #[error("Invalid package JSON: {0}")]
    #[diagnostic(
        code(cdnsync_package::json),
        help("Check the package document for syntax errors")
    )]
    Json(#[from] serde_json::Error),

    #[error("Package '{name}' violates the package schema: {}", .violations.join("; "))]
    #[diagnostic(
        code(cdnsync_package::schema),
        help("Fix the listed fields; the authoritative record is never overwritten with an invalid document")
    )]
    SchemaViolation {
        name: String,
        violations: Vec<String>,
    },
}

/// A specialized Result type for package operations.
pub type Result<T> = std::result::Result<T, PackageError>;

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    /// Adds context to an error, describing what action was being performed.
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            PackageError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
