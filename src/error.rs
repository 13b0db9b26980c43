//! Unified error handling for the shardstore crate
//!
//! Domain errors live next to the code that raises them and are wrapped by
//! the single [`Error`] enum here. The session loop asks two questions of
//! every failure:
//!
//! - [`Error::is_fatal`]: is the session's own stream broken? If so the
//!   session ends; otherwise the failure becomes an `ERR` reply and the
//!   session waits for the next command.
//! - [`Error::category`]: which part of the system failed, for logging.

use thiserror::Error;

pub use crate::protocol::ProtocolError;
pub use crate::store::error::{ArchiveError, StorageError};
pub use crate::transfer::ChannelError;

use crate::router::Backend;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transfer channel failures
    Channel,
    /// Malformed or unroutable commands
    Protocol,
    /// Filesystem failures
    Storage,
    /// Archive creation failures
    Archive,
    /// Requested file absent
    NotFound,
    /// Failures talking to a backend store
    Backend,
    /// Configuration and validation errors
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Protocol => "protocol",
            Self::Storage => "storage",
            Self::Archive => "archive",
            Self::NotFound => "not_found",
            Self::Backend => "backend",
            Self::Config => "config",
        }
    }
}

/// Unified error type for the shardstore crate
#[derive(Error, Debug)]
pub enum Error {
    /// Transfer channel failure
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Malformed, unknown or unroutable command
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Filesystem failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Archiver failure
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Requested file does not exist
    #[error("not found: {path}")]
    NotFound { path: String },

    /// A backend store failed while serving a forwarded operation
    #[error("{backend} backend: {source}")]
    Backend {
        backend: Backend,
        #[source]
        source: Box<Error>,
    },

    /// The peer answered with an error reply
    #[error("remote error: {0}")]
    Remote(String),

    /// A backend operation exceeded the command timeout
    #[error("operation timed out")]
    Timeout,

    /// Configuration errors
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a not-found error
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attribute an error to a backend store
    pub fn backend(backend: Backend, source: Error) -> Self {
        Self::Backend {
            backend,
            source: Box::new(source),
        }
    }

    /// Whether the stream that produced this error must be abandoned.
    ///
    /// Backend failures are never fatal to the caller's own stream.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Channel(e) => e.is_fatal(),
            _ => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Channel(ChannelError::Sink { .. }) => ErrorCategory::Storage,
            Self::Channel(_) => ErrorCategory::Channel,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Archive(_) => ErrorCategory::Archive,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Backend { .. } | Self::Remote(_) | Self::Timeout => ErrorCategory::Backend,
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = Error::from(ChannelError::Closed);
        assert_eq!(err.category(), ErrorCategory::Channel);

        let err = Error::from(ProtocolError::Empty);
        assert_eq!(err.category(), ErrorCategory::Protocol);

        assert_eq!(Error::not_found("a.c").category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_only_channel_faults_are_fatal() {
        assert!(Error::from(ChannelError::Closed).is_fatal());
        assert!(!Error::from(ProtocolError::Empty).is_fatal());
        assert!(!Error::not_found("x").is_fatal());
        assert!(!Error::Timeout.is_fatal());
    }

    #[test]
    fn test_backend_failure_is_contained() {
        let err = Error::backend(Backend::Pdf, Error::from(ChannelError::Closed));
        assert!(!err.is_fatal());
        assert_eq!(err.category(), ErrorCategory::Backend);
        assert!(err.to_string().starts_with("pdf backend"));
    }

    #[test]
    fn test_sink_failure_counts_as_storage() {
        let err = Error::from(ChannelError::Sink {
            declared: 1,
            source: std::io::Error::other("full"),
        });
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("root must not be empty");
        assert_eq!(err.category(), ErrorCategory::Config);
    }
}
