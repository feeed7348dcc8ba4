use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DownloadError {
    #[error("Invalid URL: {url}")]
    #[diagnostic(code(cdnsync_dl::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    #[diagnostic(
        code(cdnsync_dl::network),
        help("Check your internet connection or try again later")
    )]
    Network(#[from] Box<ureq::Error>),

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(cdnsync_dl::http_error))]
    HttpError { status: u16, url: String },

    #[error("I/O error while {action}: {source}")]
    #[diagnostic(code(cdnsync_dl::io))]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid response from {url}: {reason}")]
    #[diagnostic(code(cdnsync_dl::invalid_response))]
    InvalidResponse { url: String, reason: String },

    #[error("`git {command}` failed: {stderr}")]
    #[diagnostic(
        code(cdnsync_dl::git),
        help("Make sure git is installed and the remote is reachable")
    )]
    Git { command: String, stderr: String },

    #[error("Failed to extract {path}: {reason}")]
    #[diagnostic(code(cdnsync_dl::extract))]
    Extract { path: String, reason: String },

    #[error("fileMap matched no files in {version}")]
    #[diagnostic(
        code(cdnsync_dl::no_match),
        help("Globs tried:\n{}", .globs.join("\n"))
    )]
    NoMatch { version: String, globs: Vec<String> },

    #[error("Package has no autoupdate configuration")]
    #[diagnostic(code(cdnsync_dl::no_autoupdate))]
    NoAutoupdate,

    #[error(transparent)]
    #[diagnostic(code(cdnsync_dl::fs))]
    FileSystem(#[from] cdnsync_utils::error::FileSystemError),
}

impl From<ureq::Error> for DownloadError {
    fn from(e: ureq::Error) -> Self {
        Self::Network(Box::new(e))
    }
}

impl DownloadError {
    /// A fileMap that selects nothing is a property of the release, not a
    /// transient failure.
    pub fn is_empty_match(&self) -> bool {
        matches!(self, DownloadError::NoMatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

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
            DownloadError::Io {
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
    fn test_http_error_display() {
        let err = DownloadError::HttpError {
            status: 404,
            url: "https://registry.npmjs.org/missing".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 404: https://registry.npmjs.org/missing");
    }

    #[test]
    fn test_from_ureq_error() {
        let err: DownloadError = ureq::Error::ConnectionFailed.into();
        assert!(matches!(err, DownloadError::Network(_)));
    }

    #[test]
    fn test_is_empty_match() {
        let err = DownloadError::NoMatch {
            version: "1.0.0".into(),
            globs: vec!["*.js".into()],
        };
        assert!(err.is_empty_match());
        assert!(!DownloadError::NoAutoupdate.is_empty_match());
    }

    #[test]
    fn test_io_context() {
        let res: std::io::Result<()> = Err(std::io::Error::other("boom"));
        let err = res.with_context(|| "writing archive".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "I/O error while writing archive: boom");
    }
}
