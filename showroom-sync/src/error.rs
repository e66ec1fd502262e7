//! Error types for showroom-sync.

use thiserror::Error;

use showroom_store::StoreError;

/// Errors from the parts of the sync layer that do not report through a
/// [`PublishAttempt`](showroom_core::PublishAttempt).
#[derive(Debug, Error)]
pub enum SyncError {
    /// Input rejected before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// An error from the content store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
