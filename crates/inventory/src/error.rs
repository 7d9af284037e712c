//! Error types for inventory and host-vars codecs.
//!
//! Validation errors are raised before any document is touched; parse
//! errors carry the name of the document that failed so callers can surface
//! a single readable message.

use thiserror::Error;

/// Categories of codec errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Input rejected by a validation rule (alias, port, color, ...)
    Validation,
    /// Document could not be parsed or has the wrong shape
    Parse,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid input",
            Self::Parse => "Malformed document",
        }
    }
}

/// Errors that can occur while validating or (de)serializing documents.
#[derive(Debug, Error)]
pub enum Error {
    /// Alias does not match `[a-z0-9_-]+`
    #[error("invalid alias '{alias}': {reason}")]
    InvalidAlias {
        /// The rejected alias
        alias: String,
        /// Why it was rejected
        reason: String,
    },

    /// Role identifier does not match `[A-Za-z0-9._-]+`
    #[error("invalid role id '{0}'")]
    InvalidRoleId(String),

    /// A host field failed validation
    #[error("invalid {field}: {message}")]
    InvalidField {
        /// Name of the offending field
        field: &'static str,
        /// Description of the problem
        message: String,
    },

    /// Document has the wrong structure
    #[error("invalid {document}: {message}")]
    Parse {
        /// Which document failed ("inventory", "host vars")
        document: &'static str,
        /// Description of the structural problem
        message: String,
    },

    /// YAML syntax or serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidAlias { .. } | Error::InvalidRoleId(_) | Error::InvalidField { .. } => {
                ErrorCategory::Validation
            }
            Error::Parse { .. } | Error::Yaml(_) => ErrorCategory::Parse,
        }
    }

    /// Whether the error was raised by input validation.
    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    pub(crate) fn field(field: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidField {
            field,
            message: message.into(),
        }
    }
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;
