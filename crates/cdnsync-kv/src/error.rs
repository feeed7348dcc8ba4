//! Error types for the KV store.

use cdnsync_package::PackageError;
use miette::Diagnostic;
use thiserror::Error;

use crate::namespace::Namespace;

/// KV store error type.
#[derive(Error, Diagnostic, Debug)]
pub enum KvError {
    #[error("Key not found in {namespace}: {key}")]
    #[diagnostic(code(cdnsync_kv::not_found))]
    KeyNotFound { namespace: Namespace, key: String },

    #[error("Not authorized to access the {namespace} namespace (HTTP {status})")]
    #[diagnostic(
        code(cdnsync_kv::auth),
        help("Check the API token and that it has KV read/write permission")
    )]
    Auth { namespace: Namespace, status: u16 },

    #[error("KV service failure on {namespace}: {reason}")]
    #[diagnostic(
        code(cdnsync_kv::service),
        help("The KV service may be degraded; the operation is safe to retry")
    )]
    ServiceFailure { namespace: Namespace, reason: String },

    #[error("Refusing to write package record")]
    #[diagnostic(
        code(cdnsync_kv::schema),
        help("The existing record was left untouched")
    )]
    SchemaValidation(#[source] PackageError),

    #[error("Write to {namespace} key {key} affected no keys although a record exists")]
    #[diagnostic(
        code(cdnsync_kv::zero_write),
        help("The stored record may be stale; rerun the sync for this package")
    )]
    ZeroWrite { namespace: Namespace, key: String },

    #[error("Stored value at {namespace}/{key} is unreadable: {reason}")]
    #[diagnostic(code(cdnsync_kv::corrupt))]
    Corrupt {
        namespace: Namespace,
        key: String,
        reason: String,
    },

    #[error("I/O error while {action}: {source}")]
    #[diagnostic(code(cdnsync_kv::io))]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode {what}: {source}")]
    #[diagnostic(code(cdnsync_kv::encode))]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl KvError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::KeyNotFound { .. })
    }

    /// Only service failures are retried; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KvError::ServiceFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, KvError>;

/// Extension trait for attaching an action to I/O errors.
pub trait ErrorContext<T> {
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
            KvError::Io {
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
    fn test_retryable_classes() {
        let service = KvError::ServiceFailure {
            namespace: Namespace::Files,
            reason: "HTTP 503".into(),
        };
        let auth = KvError::Auth {
            namespace: Namespace::Files,
            status: 403,
        };
        let missing = KvError::KeyNotFound {
            namespace: Namespace::Packages,
            key: "jquery".into(),
        };
        assert!(service.is_retryable());
        assert!(!auth.is_retryable());
        assert!(!missing.is_retryable());
        assert!(missing.is_not_found());
    }

    #[test]
    fn test_display() {
        let err = KvError::ZeroWrite {
            namespace: Namespace::Aggregated,
            key: "vue".into(),
        };
        assert_eq!(
            err.to_string(),
            "Write to aggregated key vue affected no keys although a record exists"
        );
    }
}
