//! Error types for showroom-store.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise talking to the content store, the rebuild hook
/// or the upload sink.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never produced a response (DNS, TLS, timeout, reset).
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The write carried a stale or missing version token.
    #[error("version conflict on {path}: {message}")]
    Conflict { path: String, message: String },

    /// Any other non-2xx response, with the service's own message when it sent one.
    #[error("{endpoint} returned {status}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// A 2xx response whose body did not have the expected shape.
    #[error("unexpected response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    /// Local filesystem failure (local store only).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rejected before any request was made.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Stored content is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// The reason a service gave, falling back to the full error text.
    pub fn reason(&self) -> String {
        match self {
            StoreError::Conflict { message, .. } | StoreError::Api { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`StoreError::Transport`].
pub(crate) fn transport(endpoint: impl Into<String>) -> impl FnOnce(reqwest::Error) -> StoreError {
    let endpoint = endpoint.into();
    move |source| StoreError::Transport { endpoint, source }
}
