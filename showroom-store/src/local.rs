//! Content store over a local directory.
//!
//! Blobs are plain files under `root`; the version token is the SHA-256 hex
//! digest of the file bytes. Writes use the same atomic `.tmp` + rename
//! pattern as the config file and append a [`CommitRecord`] to
//! `<root>/.showroom-history.json`.
//!
//! Token checks and writes happen under one lock, so a stale token is always
//! rejected within a process.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use showroom_core::{CommitRecord, ContentPath, VersionToken};

use crate::error::{io_err, StoreError};
use crate::{ContentStore, PutRequest, StoredFile};

/// History file name, relative to the store root.
pub const HISTORY_FILE: &str = ".showroom-history.json";

/// Records kept in the history file; older ones are dropped on append.
pub const HISTORY_CAP: usize = 100;

#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute file path for `path`; rejects absolute paths and `..`.
    pub fn file_path(&self, path: &ContentPath) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path.as_str());
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.as_str().is_empty() || escapes {
            return Err(StoreError::Validation(format!(
                "path '{path}' must be relative to the store root"
            )));
        }
        Ok(self.root.join(relative))
    }

    fn history_path(&self) -> PathBuf {
        self.root.join(HISTORY_FILE)
    }

    fn read_file(&self, path: &ContentPath) -> Result<Option<StoredFile>, StoreError> {
        let file = self.file_path(path)?;
        match std::fs::read(&file) {
            Ok(bytes) => Ok(Some(StoredFile {
                version: version_of(&bytes),
                bytes,
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(&file, err)),
        }
    }

    fn load_history(&self) -> Result<Vec<CommitRecord>, StoreError> {
        let path = self.history_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(io_err(&path, err)),
        }
    }

    fn append_history(&self, record: CommitRecord) -> Result<(), StoreError> {
        let mut history = self.load_history()?;
        history.push(record);
        if history.len() > HISTORY_CAP {
            history.drain(..history.len() - HISTORY_CAP);
        }
        let json = serde_json::to_vec_pretty(&history)?;
        atomic_write(&self.history_path(), &json)
    }

    fn put_locked(&self, request: PutRequest<'_>) -> Result<VersionToken, StoreError> {
        let current = self.read_file(request.path)?;
        match (&current, request.version) {
            (None, None) => {}
            (Some(file), Some(token)) if &file.version == token => {}
            (Some(_), None) => {
                return Err(conflict(request.path, "file already exists; a version token is required"));
            }
            (None, Some(_)) => {
                return Err(conflict(request.path, "file no longer exists"));
            }
            (Some(_), Some(_)) => {
                return Err(conflict(request.path, "version token does not match"));
            }
        }

        let file = self.file_path(request.path)?;
        atomic_write(&file, request.bytes)?;
        self.append_history(CommitRecord {
            author_timestamp: Utc::now(),
            message: request.message.to_owned(),
        })?;

        tracing::debug!(path = %request.path, "wrote local content");
        Ok(version_of(request.bytes))
    }
}

#[async_trait]
impl ContentStore for LocalStore {
    async fn fetch(&self, path: &ContentPath) -> Result<Option<StoredFile>, StoreError> {
        self.read_file(path)
    }

    async fn put(&self, request: PutRequest<'_>) -> Result<VersionToken, StoreError> {
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.put_locked(request)
    }

    async fn recent_commits(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CommitRecord>, StoreError> {
        let mut records: Vec<CommitRecord> = self
            .load_history()?
            .into_iter()
            .filter(|record| record.author_timestamp >= since)
            .collect();
        records.sort_by(|a, b| b.author_timestamp.cmp(&a.author_timestamp));
        records.truncate(limit);
        Ok(records)
    }
}

/// SHA-256 hex digest used as the version token.
pub fn version_of(bytes: &[u8]) -> VersionToken {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    VersionToken::from(hex::encode(hasher.finalize()))
}

fn conflict(path: &ContentPath, message: &str) -> StoreError {
    StoreError::Conflict {
        path: path.to_string(),
        message: message.to_owned(),
    }
}

/// Write to `<path>.showroom.tmp` then rename over `path`.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = PathBuf::from(format!("{}.showroom.tmp", path.display()));
    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put<'a>(path: &'a ContentPath, bytes: &'a [u8], version: Option<&'a VersionToken>) -> PutRequest<'a> {
        PutRequest {
            path,
            message: "test write",
            bytes,
            version,
        }
    }

    #[tokio::test]
    async fn missing_file_fetches_as_none() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        let fetched = store.fetch(&"src/data/content.json".into()).await.unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn create_then_replace_with_current_token() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        let path = ContentPath::from("src/data/content.json");

        let v1 = store.put(put(&path, b"{\"a\":1}", None)).await.unwrap();
        let fetched = store.fetch(&path).await.unwrap().expect("file");
        assert_eq!(fetched.version, v1);

        let v2 = store.put(put(&path, b"{\"a\":2}", Some(&v1))).await.unwrap();
        assert_ne!(v1, v2);
        assert_eq!(std::fs::read(root.path().join("src/data/content.json")).unwrap(), b"{\"a\":2}");
    }

    #[tokio::test]
    async fn stale_token_is_a_conflict_and_leaves_file_untouched() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        let path = ContentPath::from("c.json");

        let v1 = store.put(put(&path, b"one", None)).await.unwrap();
        store.put(put(&path, b"two", Some(&v1))).await.unwrap();

        let err = store.put(put(&path, b"three", Some(&v1))).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(std::fs::read(root.path().join("c.json")).unwrap(), b"two");
    }

    #[tokio::test]
    async fn create_without_token_over_existing_file_conflicts() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        let path = ContentPath::from("c.json");
        store.put(put(&path, b"one", None)).await.unwrap();
        let err = store.put(put(&path, b"two", None)).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn writes_are_recorded_in_history() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        let before = Utc::now() - chrono::Duration::seconds(1);
        store.put(put(&"a.json".into(), b"{}", None)).await.unwrap();
        store.put(put(&"b.json".into(), b"{}", None)).await.unwrap();

        let commits = store.recent_commits(before, 5).await.unwrap();
        assert_eq!(commits.len(), 2);
        assert!(commits[0].author_timestamp >= commits[1].author_timestamp);

        let none = store
            .recent_commits(Utc::now() + chrono::Duration::seconds(60), 5)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn history_keeps_only_the_newest_records() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        let path = ContentPath::from("c.json");
        let mut version = None;
        for n in 0..HISTORY_CAP + 5 {
            let message = format!("write {n}");
            let request = PutRequest {
                message: &message,
                ..put(&path, b"{}", version.as_ref())
            };
            version = Some(store.put(request).await.unwrap());
        }

        let history = store.load_history().unwrap();
        assert_eq!(history.len(), HISTORY_CAP);
        assert_eq!(history[0].message, "write 5");
        assert_eq!(
            history.last().unwrap().message,
            format!("write {}", HISTORY_CAP + 4)
        );
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let store = LocalStore::new("/srv/site");
        assert!(store.file_path(&"../etc/passwd".into()).is_err());
        assert!(store.file_path(&"/etc/passwd".into()).is_err());
        assert!(store.file_path(&"public/images/a.png".into()).is_ok());
    }

    #[tokio::test]
    async fn tmp_file_cleaned_up_after_write() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());
        store.put(put(&"c.json".into(), b"{}", None)).await.unwrap();
        assert!(!root.path().join("c.json.showroom.tmp").exists());
    }
}
