//! Single read-modify-write publish of one content document.
//!
//! ```text
//! Connecting → FoundExisting | CreatingNew → [Cooldown] → Encoding → Writing
//!            → Succeeded → [RebuildRequested | RebuildFailed] → Propagating
//! ```
//!
//! Any store error ends the flow with `Failed`. Errors never escape
//! [`Publisher::publish`]; they end up in the returned [`PublishAttempt`].
//! A stale version token is reported like any other failure and is not
//! retried.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::SecondsFormat;
use serde_json::Value;

use showroom_core::config::DEFAULT_AUTHOR;
use showroom_core::{
    ContentArea, ContentPath, Credentials, CropMap, PublishAttempt, PublishOutcome, PublishStep,
    SiteConfig, VersionToken,
};
use showroom_store::{open_store, ContentStore, PutRequest, RebuildTrigger, StoreError};

use crate::merge::{self, Stamp};
use crate::window::ConflictWindow;
use crate::SyncError;

/// How long a rebuild usually takes to go live.
pub const PROPAGATION_SECS: u64 = 120;

/// What to publish.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub area: ContentArea,
    pub payload: Value,
    pub crops: CropMap,
    /// Commit message; a default naming the area is used when absent.
    pub message: Option<String>,
}

impl PublishRequest {
    pub fn new(area: ContentArea, payload: Value) -> Self {
        Self {
            area,
            payload,
            crops: CropMap::new(),
            message: None,
        }
    }

    pub fn with_crops(mut self, crops: CropMap) -> Self {
        self.crops = crops;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// Run the conflict-window cooldown before writing.
    pub wait_for_window: bool,
    /// Fire the rebuild hook after a successful write.
    pub trigger_rebuild: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            wait_for_window: true,
            trigger_rebuild: true,
        }
    }
}

/// Receives every step as it happens.
pub trait ProgressSink: Send {
    fn step(&mut self, step: &PublishStep);
}

impl<F> ProgressSink for F
where
    F: FnMut(&PublishStep) + Send,
{
    fn step(&mut self, step: &PublishStep) {
        self(step)
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn step(&mut self, _step: &PublishStep) {}
}

/// Publishes content documents to one store.
///
/// Clones share the in-flight set, so a second publish to a path that is
/// still being written is rejected no matter which clone it comes through.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ContentStore>,
    window: ConflictWindow,
    rebuild: Option<RebuildTrigger>,
    author: String,
    in_flight: Arc<Mutex<HashSet<ContentPath>>>,
}

impl Publisher {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            window: ConflictWindow::default(),
            rebuild: None,
            author: DEFAULT_AUTHOR.to_string(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Publisher for the store, window, hook and author in `config`.
    ///
    /// `credentials` must be present for stores that need a token.
    pub fn from_config(
        config: &SiteConfig,
        credentials: Option<&Credentials>,
    ) -> Result<Self, SyncError> {
        let store = open_store(&config.store, credentials)?;
        let rebuild = match config.rebuild_hook.as_deref() {
            Some(url) => Some(RebuildTrigger::new(url)?),
            None => None,
        };
        Ok(Self::new(store)
            .with_window(ConflictWindow::new(&config.window))
            .with_rebuild(rebuild)
            .with_author(config.author.as_str()))
    }

    pub fn with_window(mut self, window: ConflictWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_rebuild(mut self, rebuild: Option<RebuildTrigger>) -> Self {
        self.rebuild = rebuild;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn window(&self) -> &ConflictWindow {
        &self.window
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Publish one document. See the module docs for the step sequence.
    pub async fn publish(
        &self,
        request: PublishRequest,
        options: &PublishOptions,
        progress: &mut dyn ProgressSink,
    ) -> PublishAttempt {
        let path = request.area.path.clone();
        let mut attempt = PublishAttempt::new(path.clone(), request.payload.clone());

        if let Err(err) = merge::validate_payload(&request.payload)
            .and_then(|()| merge::validate_crops(&request.crops))
        {
            emit(&mut attempt, progress, PublishStep::Failed {
                reason: err.to_string(),
            });
            return attempt;
        }

        let Some(_claim) = InFlight::claim(&self.in_flight, &path) else {
            tracing::warn!("publish to {} rejected: already in progress", path);
            emit(&mut attempt, progress, PublishStep::Rejected { path });
            return attempt;
        };

        tracing::info!("publishing {} ({})", request.area.name, path);
        emit(&mut attempt, progress, PublishStep::Connecting);
        let current = match self.store.fetch(&path).await {
            Ok(Some(file)) => {
                emit(&mut attempt, progress, PublishStep::FoundExisting {
                    version: file.version.clone(),
                });
                Some(file.version)
            }
            Ok(None) => {
                emit(&mut attempt, progress, PublishStep::CreatingNew);
                None
            }
            Err(err) => return fail(attempt, progress, &err),
        };

        if options.wait_for_window {
            let wait_secs = self.window.cooldown().as_secs();
            self.window
                .wait_for_clear_window(self.store.as_ref(), |activity| {
                    emit(&mut attempt, progress, PublishStep::Cooldown {
                        recent: activity.message().unwrap_or_default().to_string(),
                        wait_secs,
                    });
                })
                .await;
        }

        emit(&mut attempt, progress, PublishStep::Encoding);
        let stamp = Stamp::now(self.author.as_str());
        let merged = merge::prepare(&request.payload, &request.crops, request.area.crops, &stamp);
        let bytes = match encode(&merged) {
            Ok(bytes) => bytes,
            Err(err) => {
                emit(&mut attempt, progress, PublishStep::Failed {
                    reason: format!("could not encode content: {err}"),
                });
                return attempt;
            }
        };

        emit(&mut attempt, progress, PublishStep::Writing);
        let message = commit_message(request.message.as_deref(), &request.area, &stamp);
        let written = self
            .store
            .put(PutRequest {
                path: &path,
                message: &message,
                bytes: &bytes,
                version: current.as_ref(),
            })
            .await;
        let version = match written {
            Ok(version) => version,
            Err(err) => return fail(attempt, progress, &err),
        };

        tracing::info!("published {} as {}", path, version.short());
        attempt.outcome = PublishOutcome::Succeeded;
        attempt.version = Some(version.clone());
        emit(&mut attempt, progress, PublishStep::Succeeded { version });

        if options.trigger_rebuild {
            if let Some(rebuild) = &self.rebuild {
                match rebuild.trigger().await {
                    Ok(()) => emit(&mut attempt, progress, PublishStep::RebuildRequested),
                    Err(err) => {
                        tracing::warn!("rebuild trigger failed: {}", err);
                        emit(&mut attempt, progress, PublishStep::RebuildFailed {
                            reason: err.reason(),
                        });
                    }
                }
            }
        }

        emit(&mut attempt, progress, PublishStep::Propagating {
            expected_secs: PROPAGATION_SECS,
        });
        attempt
    }

    /// Write raw bytes (an image) to `path`, creating or replacing it.
    ///
    /// Looks up the current token first, so a replace carries it. The old
    /// bytes are never downloaded.
    pub async fn write_file(
        &self,
        path: &ContentPath,
        bytes: &[u8],
        message: &str,
    ) -> Result<VersionToken, StoreError> {
        let current = self.store.version(path).await?;
        self.store
            .put(PutRequest {
                path,
                message,
                bytes,
                version: current.as_ref(),
            })
            .await
    }
}

/// Removes its path from the in-flight set on drop.
struct InFlight {
    paths: Arc<Mutex<HashSet<ContentPath>>>,
    path: ContentPath,
}

impl InFlight {
    fn claim(paths: &Arc<Mutex<HashSet<ContentPath>>>, path: &ContentPath) -> Option<Self> {
        let inserted = lock(paths).insert(path.clone());
        inserted.then(|| Self {
            paths: Arc::clone(paths),
            path: path.clone(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.paths).remove(&self.path);
    }
}

fn lock(paths: &Mutex<HashSet<ContentPath>>) -> std::sync::MutexGuard<'_, HashSet<ContentPath>> {
    match paths.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn emit(attempt: &mut PublishAttempt, progress: &mut dyn ProgressSink, step: PublishStep) {
    tracing::debug!("{}: {}", attempt.target_path, step);
    progress.step(&step);
    attempt.record(step);
}

fn fail(
    mut attempt: PublishAttempt,
    progress: &mut dyn ProgressSink,
    err: &StoreError,
) -> PublishAttempt {
    tracing::warn!("publish to {} failed: {}", attempt.target_path, err);
    let reason = match err.reason() {
        reason if reason.trim().is_empty() => "unknown error".to_string(),
        reason => reason,
    };
    emit(&mut attempt, progress, PublishStep::Failed { reason });
    attempt
}

/// Pretty JSON with a trailing newline, the way the site repository keeps it.
fn encode(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn commit_message(message: Option<&str>, area: &ContentArea, stamp: &Stamp) -> String {
    let summary = match message.map(str::trim) {
        Some(message) if !message.is_empty() => message.to_string(),
        _ => format!("Update {} content", area.name),
    };
    format!(
        "{summary} ({} by {})",
        stamp.at.to_rfc3339_opts(SecondsFormat::Secs, true),
        stamp.by
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use showroom_core::{CommitRecord, CropLayout, CropSettings};
    use showroom_store::{LocalStore, StoredFile};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    fn area(path: &str, crops: CropLayout) -> ContentArea {
        ContentArea {
            name: "site".to_string(),
            path: ContentPath::from(path),
            crops,
        }
    }

    fn no_wait() -> PublishOptions {
        PublishOptions {
            wait_for_window: false,
            trigger_rebuild: false,
        }
    }

    fn stored_json(root: &TempDir, path: &str) -> Value {
        let bytes = std::fs::read(root.path().join(path)).expect("stored file");
        serde_json::from_slice(&bytes).expect("stored json")
    }

    /// Local store where a third party writes right after every fetch.
    struct RacingStore {
        inner: LocalStore,
    }

    #[async_trait]
    impl ContentStore for RacingStore {
        async fn fetch(&self, path: &ContentPath) -> Result<Option<StoredFile>, StoreError> {
            let seen = self.inner.fetch(path).await?;
            self.inner
                .put(PutRequest {
                    path,
                    message: "someone else",
                    bytes: b"{\"other\":true}\n",
                    version: seen.as_ref().map(|f| &f.version),
                })
                .await?;
            Ok(seen)
        }

        async fn put(&self, request: PutRequest<'_>) -> Result<VersionToken, StoreError> {
            self.inner.put(request).await
        }

        async fn recent_commits(
            &self,
            since: DateTime<Utc>,
            limit: usize,
        ) -> Result<Vec<CommitRecord>, StoreError> {
            self.inner.recent_commits(since, limit).await
        }
    }

    /// Local store whose fetch parks until released.
    struct GatedStore {
        inner: LocalStore,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ContentStore for GatedStore {
        async fn fetch(&self, path: &ContentPath) -> Result<Option<StoredFile>, StoreError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.fetch(path).await
        }

        async fn put(&self, request: PutRequest<'_>) -> Result<VersionToken, StoreError> {
            self.inner.put(request).await
        }

        async fn recent_commits(
            &self,
            since: DateTime<Utc>,
            limit: usize,
        ) -> Result<Vec<CommitRecord>, StoreError> {
            self.inner.recent_commits(since, limit).await
        }
    }

    #[tokio::test]
    async fn round_trip_stores_payload_plus_stamp() {
        let root = TempDir::new().unwrap();
        let publisher = Publisher::new(Arc::new(LocalStore::new(root.path())));
        let payload = json!({"hero": {"title": "Spring sale"}, "gallery": []});

        let attempt = publisher
            .publish(
                PublishRequest::new(area("src/data/content.json", CropLayout::Gallery), payload.clone()),
                &no_wait(),
                &mut NoProgress,
            )
            .await;

        assert!(attempt.succeeded(), "{}", attempt.status_message);
        let stored = stored_json(&root, "src/data/content.json");
        assert_eq!(merge::strip_stamp(&stored), payload);
        assert_eq!(stored["updatedBy"], "Carrie");
        assert_eq!(
            attempt.steps.first(),
            Some(&PublishStep::Connecting),
            "steps: {:?}",
            attempt.steps
        );
        assert!(matches!(attempt.steps[1], PublishStep::CreatingNew));
        assert!(matches!(
            attempt.steps.last(),
            Some(PublishStep::Propagating { expected_secs: 120 })
        ));
    }

    #[tokio::test]
    async fn replace_uses_fetched_token() {
        let root = TempDir::new().unwrap();
        let publisher = Publisher::new(Arc::new(LocalStore::new(root.path())));
        let target = area("c.json", CropLayout::Gallery);

        let first = publisher
            .publish(PublishRequest::new(target.clone(), json!({"v": 1})), &no_wait(), &mut NoProgress)
            .await;
        let second = publisher
            .publish(PublishRequest::new(target, json!({"v": 2})), &no_wait(), &mut NoProgress)
            .await;

        assert!(second.succeeded(), "{}", second.status_message);
        assert_eq!(
            second.steps[1],
            PublishStep::FoundExisting {
                version: first.version.clone().expect("first version")
            }
        );
        assert_eq!(stored_json(&root, "c.json")["v"], 2);
    }

    #[tokio::test]
    async fn stale_token_fails_without_overwriting() {
        let root = TempDir::new().unwrap();
        let store = RacingStore {
            inner: LocalStore::new(root.path()),
        };
        let publisher = Publisher::new(Arc::new(store));

        let attempt = publisher
            .publish(
                PublishRequest::new(area("c.json", CropLayout::Gallery), json!({"mine": true})),
                &no_wait(),
                &mut NoProgress,
            )
            .await;

        assert!(attempt.failed());
        assert!(attempt.version.is_none());
        assert!(matches!(attempt.steps.last(), Some(PublishStep::Failed { .. })));
        assert!(attempt.status_message.starts_with("Publish failed"));
        assert_eq!(stored_json(&root, "c.json"), json!({"other": true}));
    }

    #[tokio::test]
    async fn progress_sink_sees_every_step() {
        let root = TempDir::new().unwrap();
        let publisher = Publisher::new(Arc::new(LocalStore::new(root.path())));
        let mut seen = Vec::new();

        let attempt = publisher
            .publish(
                PublishRequest::new(area("c.json", CropLayout::Gallery), json!({"a": 1})),
                &no_wait(),
                &mut |step: &PublishStep| seen.push(step.clone()),
            )
            .await;

        assert_eq!(seen, attempt.steps);
        assert_eq!(attempt.status_message, seen.last().unwrap().to_string());
    }

    #[tokio::test]
    async fn per_item_crops_are_written() {
        let root = TempDir::new().unwrap();
        let publisher = Publisher::new(Arc::new(LocalStore::new(root.path())));
        let crops: CropMap = [(
            "/desk.jpg".to_string(),
            CropSettings {
                scale: 1.4,
                x: 30.0,
                y: 70.0,
            },
        )]
        .into_iter()
        .collect();
        let payload = json!({"products": {"new": [{"id": 1, "name": "Desk", "image": "/desk.jpg"}]}});

        let attempt = publisher
            .publish(
                PublishRequest::new(area("src/data/products.json", CropLayout::PerItem), payload)
                    .with_crops(crops),
                &no_wait(),
                &mut NoProgress,
            )
            .await;

        assert!(attempt.succeeded());
        let stored = stored_json(&root, "src/data/products.json");
        assert_eq!(stored["products"]["new"][0]["imageCrop"]["scale"], 1.4);
    }

    #[tokio::test]
    async fn invalid_input_fails_before_any_store_call() {
        let root = TempDir::new().unwrap();
        let publisher = Publisher::new(Arc::new(LocalStore::new(root.path())));

        let attempt = publisher
            .publish(
                PublishRequest::new(area("c.json", CropLayout::Gallery), json!({})),
                &no_wait(),
                &mut NoProgress,
            )
            .await;

        assert!(attempt.failed());
        assert_eq!(attempt.steps.len(), 1);
        assert!(!root.path().join("c.json").exists());
    }

    #[tokio::test]
    async fn second_publish_to_same_path_is_rejected() {
        let root = TempDir::new().unwrap();
        let store = Arc::new(GatedStore {
            inner: LocalStore::new(root.path()),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let publisher = Publisher::new(store.clone());
        let target = area("c.json", CropLayout::Gallery);

        let first = {
            let publisher = publisher.clone();
            let target = target.clone();
            tokio::spawn(async move {
                publisher
                    .publish(PublishRequest::new(target, json!({"n": 1})), &no_wait(), &mut NoProgress)
                    .await
            })
        };
        store.entered.notified().await;

        let second = publisher
            .publish(PublishRequest::new(target.clone(), json!({"n": 2})), &no_wait(), &mut NoProgress)
            .await;
        assert!(second.failed());
        assert_eq!(
            second.steps,
            vec![PublishStep::Rejected {
                path: ContentPath::from("c.json")
            }]
        );

        store.release.notify_one();
        let first = first.await.expect("join");
        assert!(first.succeeded(), "{}", first.status_message);
        assert_eq!(stored_json(&root, "c.json")["n"], 1);

        // Path is free again once the first publish finished.
        store.release.notify_one();
        let third = publisher
            .publish(PublishRequest::new(target, json!({"n": 3})), &no_wait(), &mut NoProgress)
            .await;
        assert!(third.succeeded(), "{}", third.status_message);
    }

    #[tokio::test(start_paused = true)]
    async fn recent_write_triggers_cooldown_step() {
        let root = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(root.path()));
        store
            .put(PutRequest {
                path: &ContentPath::from("other.json"),
                message: "another editor",
                bytes: b"{}",
                version: None,
            })
            .await
            .unwrap();
        let publisher = Publisher::new(store);

        let started = tokio::time::Instant::now();
        let attempt = publisher
            .publish(
                PublishRequest::new(area("c.json", CropLayout::Gallery), json!({"a": 1})),
                &PublishOptions {
                    wait_for_window: true,
                    trigger_rebuild: false,
                },
                &mut NoProgress,
            )
            .await;

        assert!(attempt.succeeded());
        assert!(started.elapsed() >= std::time::Duration::from_secs(35));
        let cooldown = attempt
            .steps
            .iter()
            .position(|s| matches!(s, PublishStep::Cooldown { wait_secs: 35, .. }))
            .expect("cooldown step");
        let encoding = attempt
            .steps
            .iter()
            .position(|s| *s == PublishStep::Encoding)
            .expect("encoding step");
        assert!(cooldown < encoding);
    }

    #[test]
    fn from_config_reads_author_and_requires_token_for_github() {
        let root = TempDir::new().unwrap();
        let mut config = SiteConfig::new(showroom_core::StoreSettings::Local {
            root: root.path().to_path_buf(),
        });
        config.author = "Dana".to_string();
        let publisher = Publisher::from_config(&config, None).expect("local publisher");
        assert_eq!(publisher.author(), "Dana");

        let github = SiteConfig::new(showroom_core::StoreSettings::Github {
            api_url: "https://api.github.com".to_string(),
            owner: "acme".to_string(),
            repo: "site".to_string(),
            branch: "main".to_string(),
        });
        assert!(Publisher::from_config(&github, None).is_err());
        assert!(Publisher::from_config(&github, Some(&Credentials::new("t0k3n"))).is_ok());
    }

    #[test]
    fn commit_message_carries_timestamp() {
        let stamp = Stamp {
            at: DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            by: "Carrie".to_string(),
        };
        let target = area("c.json", CropLayout::Gallery);
        assert_eq!(
            commit_message(None, &target, &stamp),
            "Update site content (2026-03-01T10:00:00Z by Carrie)"
        );
        assert_eq!(
            commit_message(Some("New sofas"), &target, &stamp),
            "New sofas (2026-03-01T10:00:00Z by Carrie)"
        );
    }
}
