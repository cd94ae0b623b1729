//! Error types for keystone-core

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for Keystone operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur across the Keystone crates.
///
/// Lookups that simply find nothing return `Ok(None)`; [`Error::NotFound`]
/// is reserved for operations that need an entity to exist.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// An entity required by the operation does not exist.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// Entity kind ("user", "group", "resource", ...)
        kind: &'static str,
        /// Key that was looked up
        key: String,
    },

    /// A data-model invariant would be violated.
    #[error("Validation error: {message}")]
    Validation {
        /// Field or aspect that failed validation
        field: Option<String>,
        /// What went wrong
        message: String,
    },

    /// Malformed caller input.
    #[error("Invalid argument '{argument}': {message}")]
    InvalidArgument {
        /// Name of the offending argument
        argument: String,
        /// What went wrong
        message: String,
    },

    /// The persistence collaborator failed.
    #[error("Storage failure: {message}")]
    Storage {
        /// Human-readable error message
        message: String,
        /// Source error if available
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic
        message: String,
    },

    /// I/O error with the path involved
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Creates a not-found error for an entity kind and key.
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Error::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// Creates a new validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Error::Validation {
            field: None,
            message: message.into(),
        }
    }

    /// Creates a new validation error with a field name.
    pub fn validation_field<F, M>(field: F, message: M) -> Self
    where
        F: Into<String>,
        M: Into<String>,
    {
        Error::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Creates a new invalid-argument error.
    pub fn invalid_argument<A, M>(argument: A, message: M) -> Self
    where
        A: Into<String>,
        M: Into<String>,
    {
        Error::InvalidArgument {
            argument: argument.into(),
            message: message.into(),
        }
    }

    /// Creates a new storage failure.
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Error::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage failure wrapping its cause.
    pub fn storage_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Wraps an I/O error with the path it occurred on.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns `true` for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Whether the caller caused this error (as opposed to the backend).
    pub fn is_client_error(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Validation { .. } => true,
            Error::InvalidArgument { .. } => true,
            Error::Config { .. } => true,
            Error::Storage { .. } => false,
            Error::Io { .. } => false,
            Error::Serialization(_) => false,
        }
    }
}
