//! Error types for reconciliation.
//!
//! Errors are categorized so callers can decide whether a failure is worth
//! surfacing as a retryable sync error or should be shown inline as a
//! validation problem.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Input rejected before any I/O
    Validation,
    /// A file or alias does not exist
    NotFound,
    /// Target already exists
    Conflict,
    /// Network or disk failure (retryable)
    Transient,
    /// A document could not be parsed
    Parse,
    /// Some steps of a cascade failed
    Partial,
}

impl ErrorCategory {
    /// Whether the next triggering change may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Partial)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid input",
            Self::NotFound => "Not found",
            Self::Conflict => "Already exists",
            Self::Transient => "Storage unavailable",
            Self::Parse => "Malformed document",
            Self::Partial => "Partially applied",
        }
    }
}

/// Errors that can occur while reconciling a workspace.
#[derive(Debug, Error)]
pub enum Error {
    /// Document or field validation failed
    #[error(transparent)]
    Codec(#[from] inventory::Error),

    /// Alias is already taken by another host
    #[error("host '{0}' already exists")]
    DuplicateAlias(String),

    /// Alias is not known to the engine
    #[error("unknown host '{0}'")]
    UnknownAlias(String),

    /// Rename source and target are the same
    #[error("'{0}' is already the current alias")]
    SameAlias(String),

    /// No workspace is active
    #[error("no workspace selected")]
    NoWorkspace,

    /// File does not exist
    #[error("file not found: {path}")]
    NotFound {
        /// Workspace-relative path
        path: String,
    },

    /// Target path already exists
    #[error("target already exists: {path}")]
    Conflict {
        /// Workspace-relative path
        path: String,
    },

    /// Path escapes the workspace or names a hidden file
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// Offending path
        path: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// HTTP request failed
    #[error("HTTP error: {message}")]
    Http {
        /// Error message
        message: String,
        /// HTTP status code if available
        status: Option<u16>,
    },

    /// Server returned something unexpected
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Filesystem error
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Store refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// One or more cascade steps failed
    #[error("{operation} '{alias}' incomplete: {}", .failures.join("; "))]
    Cascade {
        /// Cascade name ("rename", "delete", "purge")
        operation: &'static str,
        /// Alias the cascade ran for
        alias: String,
        /// One message per failed step
        failures: Vec<String>,
    },
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Codec(inner) => match inner.category() {
                inventory::ErrorCategory::Validation => ErrorCategory::Validation,
                inventory::ErrorCategory::Parse => ErrorCategory::Parse,
            },
            Error::DuplicateAlias(_)
            | Error::SameAlias(_)
            | Error::NoWorkspace
            | Error::InvalidPath { .. } => ErrorCategory::Validation,
            Error::UnknownAlias(_) | Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Http { status, .. } => match status {
                Some(404) => ErrorCategory::NotFound,
                Some(409) => ErrorCategory::Conflict,
                Some(400 | 403 | 422) => ErrorCategory::Validation,
                _ => ErrorCategory::Transient,
            },
            Error::InvalidResponse(_) => ErrorCategory::Parse,
            Error::Io { .. } | Error::Unavailable(_) => ErrorCategory::Transient,
            Error::Cascade { .. } => ErrorCategory::Partial,
        }
    }

    /// Whether the failure may go away on the next attempt.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether the input was rejected before any I/O.
    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_retryable() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(ErrorCategory::Partial.is_retryable());
        assert!(!ErrorCategory::Validation.is_retryable());
        assert!(!ErrorCategory::Conflict.is_retryable());
    }

    #[test]
    fn test_http_status_mapping() {
        let err = Error::Http {
            message: "HTTP 409".into(),
            status: Some(409),
        };
        assert_eq!(err.category(), ErrorCategory::Conflict);

        let err = Error::Http {
            message: "HTTP 502".into(),
            status: Some(502),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_codec_errors_keep_category() {
        let err: Error = inventory::validate_alias("Web!").unwrap_err().into();
        assert!(err.is_validation());
    }

    #[test]
    fn test_cascade_message() {
        let err = Error::Cascade {
            operation: "rename",
            alias: "web".into(),
            failures: vec!["host vars: HTTP 500".into(), "public key: HTTP 500".into()],
        };
        assert_eq!(
            err.to_string(),
            "rename 'web' incomplete: host vars: HTTP 500; public key: HTTP 500"
        );
        assert_eq!(err.category(), ErrorCategory::Partial);
    }
}
