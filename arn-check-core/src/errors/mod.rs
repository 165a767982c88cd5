//! Error handling module

use std::path::PathBuf;
use thiserror::Error;

use crate::aws::AwsError;

/// Result type alias for operations that can fail with `AuditError`
pub type Result<T> = std::result::Result<T, AuditError>;

/// Error type for an audit pass.
///
/// Per-resource and per-candidate failures never surface here; they are
/// recorded in the report instead. What remains is fatal for one account
/// (session, propagated IAM listing errors) or for the whole invocation
/// (configuration).
#[derive(Error, Debug)]
pub enum AuditError {
    /// File system operation errors with detailed context
    #[error("File system error during {operation} on path '{path}': {source}")]
    FileSystem {
        /// The operation that failed (e.g., "read")
        operation: String,
        /// The file path involved in the operation
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing and serialization errors with context
    #[error("JSON parsing error in {context}: {source}")]
    JsonParsing {
        /// Context where the JSON error occurred (e.g., "config file")
        context: String,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// Detailed error message about the configuration issue
        message: String,
        /// Optional field name that failed validation
        field: Option<String>,
    },

    /// Session or credential resolution failed for a profile
    #[error("Session error for profile '{profile}': {message}")]
    Session {
        /// Profile being resolved
        profile: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// AWS call that is not tolerated during a scan
    #[error(transparent)]
    Aws(#[from] AwsError),
}

impl AuditError {
    /// Create a file system error with operation context
    pub(crate) fn file_system(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::FileSystem {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a JSON parsing error with context
    pub(crate) fn json_parsing(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::JsonParsing {
            context: context.into(),
            source,
        }
    }

    /// Create a configuration error for a named field
    pub(crate) fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a session error
    pub fn session(profile: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Session {
            profile: profile.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a session error with source
    pub(crate) fn session_with_source(
        profile: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Session {
            profile: profile.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
