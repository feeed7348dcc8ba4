use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum AuditError {
    #[error("Failed to write audit entry to {}: {reason}", .path.display())]
    #[diagnostic(
        code(cdnsync_audit::write),
        help("Check that the audit path is mounted and writable")
    )]
    Write { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, AuditError>;
