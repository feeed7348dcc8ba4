//! Error types for cdnsync-core.

use cdnsync_config::ConfigError;
use cdnsync_dl::DownloadError;
use cdnsync_kv::{KvError, Namespace};
use cdnsync_package::PackageError;
use cdnsync_utils::error::{FileSystemError, HashError};
use miette::Diagnostic;
use thiserror::Error;

/// Core error type for pipeline operations.
#[derive(Error, Diagnostic, Debug)]
pub enum CoreError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to fetch artifact")]
    #[diagnostic(
        code(cdnsync::artifact_fetch),
        help("The version is retried on the next run")
    )]
    ArtifactFetch(#[from] DownloadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    #[diagnostic(code(cdnsync::fs), help("Check file permissions and disk space"))]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(code(cdnsync::hash))]
    Hash(#[from] HashError),

    #[error("Error while {action}")]
    #[diagnostic(code(cdnsync::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid stage message: {0}")]
    #[diagnostic(code(cdnsync::message))]
    InvalidMessage(String),

    #[error("Failed to add sandbox rule for path '{path}': {reason}")]
    #[diagnostic(
        code(cdnsync::sandbox::path_rule),
        help("Check if the path exists and is accessible")
    )]
    SandboxPathRule { path: String, reason: String },

    #[error("Sandbox could not be started: {0}")]
    #[diagnostic(
        code(cdnsync::sandbox::execution),
        help("Check the sandbox runtime and configuration")
    )]
    SandboxExecution(String),

    #[error("Sandbox exited with {status}: {stderr}")]
    #[diagnostic(
        code(cdnsync::sandbox::failed),
        help("The version was not published and will be retried on the next run")
    )]
    SandboxFailed { status: String, stderr: String },

    #[error("Failed to compress {path}: {reason}")]
    #[diagnostic(code(cdnsync::compression))]
    Compression { path: String, reason: String },

    #[error("Failed to start worker pool: {0}")]
    #[diagnostic(code(cdnsync::worker_pool))]
    WorkerPool(String),

    #[error("Publish stopped at the {namespace} namespace")]
    #[diagnostic(
        code(cdnsync::partial_publish),
        help("Earlier namespace writes were kept; rerunning the sync re-derives and rewrites them")
    )]
    PartialPublish {
        namespace: Namespace,
        #[source]
        source: Box<CoreError>,
    },

    #[error("Search index update failed: {0}")]
    #[diagnostic(code(cdnsync::search))]
    Search(String),

    #[error("{0}")]
    #[diagnostic(code(cdnsync::error))]
    Custom(String),
}

impl CoreError {
    /// Errors that must stop the whole run rather than one package.
    pub fn is_fatal(&self) -> bool {
        match self {
            CoreError::Kv(KvError::Auth { .. }) | CoreError::Config(_) => true,
            CoreError::PartialPublish { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    pub fn partial(namespace: Namespace, source: impl Into<CoreError>) -> Self {
        CoreError::PartialPublish {
            namespace,
            source: Box::new(source.into()),
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Trait for adding context to IO errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> CoreResult<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> CoreResult<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            CoreError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fatal() {
        let auth = CoreError::Kv(KvError::Auth {
            namespace: Namespace::Files,
            status: 401,
        });
        assert!(auth.is_fatal());
        assert!(CoreError::partial(Namespace::Files, auth).is_fatal());

        let transient = CoreError::Kv(KvError::ServiceFailure {
            namespace: Namespace::Files,
            reason: "HTTP 502".into(),
        });
        assert!(!transient.is_fatal());
        assert!(!CoreError::Custom("x".into()).is_fatal());
    }

    #[test]
    fn test_partial_display() {
        let err = CoreError::partial(Namespace::Versions, CoreError::Custom("boom".into()));
        assert_eq!(err.to_string(), "Publish stopped at the versions namespace");
    }
}
