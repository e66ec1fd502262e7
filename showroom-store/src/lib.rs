//! # showroom-store
//!
//! Clients for the remote services a publish touches:
//!
//! - [`ContentStore`] — versioned JSON/image blobs ([`GitHubStore`], [`LocalStore`])
//! - [`RebuildTrigger`] — fire-and-forget static rebuild webhook
//! - [`UploadSink`] — unsigned image uploads to the CDN
//!
//! Every write to a [`ContentStore`] must carry the version token of the blob
//! it replaces; the store rejects stale tokens with [`StoreError::Conflict`].

pub mod error;
pub mod github;
pub mod local;
pub mod rebuild;
pub mod upload;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use showroom_core::{CommitRecord, ContentBlob, ContentPath, Credentials, StoreSettings, VersionToken};

pub use error::StoreError;
pub use github::GitHubStore;
pub use local::LocalStore;
pub use rebuild::RebuildTrigger;
pub use upload::{UploadSink, UploadedImage};

/// Raw bytes of a stored file plus the token needed to replace it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub version: VersionToken,
    pub bytes: Vec<u8>,
}

impl StoredFile {
    /// Parse the file as a JSON content blob.
    pub fn into_blob(self, path: &ContentPath) -> Result<ContentBlob, StoreError> {
        let body: Value = serde_json::from_slice(&self.bytes)?;
        Ok(ContentBlob::new(path.clone(), body, self.version))
    }
}

/// A single write. `version` is `None` only when creating a new file.
#[derive(Debug, Clone, Copy)]
pub struct PutRequest<'a> {
    pub path: &'a ContentPath,
    pub message: &'a str,
    pub bytes: &'a [u8],
    pub version: Option<&'a VersionToken>,
}

/// A versioned blob store with optimistic concurrency.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Current bytes and version of `path`, or `None` if it does not exist.
    async fn fetch(&self, path: &ContentPath) -> Result<Option<StoredFile>, StoreError>;

    /// Current version of `path` without its bytes, or `None` if it does not exist.
    async fn version(&self, path: &ContentPath) -> Result<Option<VersionToken>, StoreError> {
        Ok(self.fetch(path).await?.map(|file| file.version))
    }

    /// Replace (or create) `path`. Returns the new version token.
    async fn put(&self, request: PutRequest<'_>) -> Result<VersionToken, StoreError>;

    /// Newest-first history entries authored at or after `since`, at most `limit`.
    async fn recent_commits(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CommitRecord>, StoreError>;
}

/// Build the store described by `settings`.
///
/// GitHub stores need credentials; a missing token fails here, before any
/// network call.
pub fn open_store(
    settings: &StoreSettings,
    credentials: Option<&Credentials>,
) -> Result<Arc<dyn ContentStore>, StoreError> {
    match settings {
        StoreSettings::Github {
            api_url,
            owner,
            repo,
            branch,
        } => {
            let credentials = credentials.ok_or_else(|| {
                StoreError::Validation("a store token is required for GitHub".to_string())
            })?;
            Ok(Arc::new(GitHubStore::new(
                api_url,
                owner,
                repo,
                branch,
                credentials,
            )?))
        }
        StoreSettings::Local { root } => Ok(Arc::new(LocalStore::new(root.clone()))),
    }
}
