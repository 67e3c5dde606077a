//! Sync error handling
//!
//! Typed errors for the push pipeline. Remote lookups report "no rows" as
//! `RemoteError::NotFound`, which callers turn into `None` instead of a
//! failure.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the remote store and session service
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The lookup matched no rows
    #[error("no matching row")]
    NotFound,

    /// No session, or the session was rejected
    #[error("not authenticated: {0}")]
    Unauthorized(String),

    /// The server answered with an error payload
    #[error("{message} (status {status})")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The request never got a usable answer
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The answer could not be understood
    #[error("unexpected response: {0}")]
    Decode(String),

    /// A request URL could not be built from the configured project URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors that abort a sync run or a tombstone update
#[derive(Error, Debug)]
pub enum SyncError {
    /// Required setting missing; raised before any network access
    #[error("{0}")]
    Configuration(String),

    /// Sign-in failed or no user could be resolved
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Frontmatter could not be parsed or rewritten
    #[error("Invalid metadata in '{path}': {details}")]
    Metadata { path: PathBuf, details: String },

    /// Local file access failed
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A remote read or write failed
    #[error("Remote {operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },
}

impl SyncError {
    /// Wrap a remote failure with the operation that raised it
    pub fn remote(operation: &'static str, source: RemoteError) -> Self {
        match source {
            RemoteError::Unauthorized(message) => SyncError::Authentication(message),
            source => SyncError::Remote { operation, source },
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure happened before anything left the machine
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            SyncError::Configuration(_) | SyncError::Metadata { .. } | SyncError::Io { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SyncError::Authentication(_) => {
                Some("Check the email and password with `vellum config show`, or run `vellum logout` and try again.")
            }
            SyncError::Metadata { .. } => {
                Some("Fix the YAML frontmatter at the top of the document and push again.")
            }
            SyncError::Remote {
                source: RemoteError::Transport(_),
                ..
            } => Some("Check that supabase_url is reachable and try again."),
            _ => None,
        }
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
