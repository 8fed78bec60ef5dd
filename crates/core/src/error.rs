//! Error types for the kgagent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! A knowledge-graph miss is not an error: a query result without a
//! relation map is a normal control-flow branch (see [`crate::graph`]).

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all kgagent operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Backend errors (completion, search, graph) ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Eviction ---
    /// The summary request issued during eviction failed. The context
    /// window is left exactly as it was before the attempt.
    #[error("Summarization failed, context left unchanged: {0}")]
    Summarization(#[source] BackendError),

    // --- Durable stores ---
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    // --- Serialization ---
    /// A store could not be rendered into the prompt.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failure of an external collaborator call.
///
/// Never retried by the core; retry policy belongs to the client that
/// produced the error.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response from backend: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Whether a client may reasonably try the same request again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_)
        ) || matches!(self, Self::ApiError { status_code, .. } if *status_code >= 500)
    }
}

/// Failure loading or persisting one of the durable journals.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record in {path} at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

impl PersistenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
