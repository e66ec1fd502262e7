//! Session publish: pending images first, then the content document.
//!
//! Each image is its own store write. Written images leave the staging area
//! right away; failed ones stay for a manual retry. Once every image is
//! written the snapshot is fully drained, leaving only images staged while
//! the session publish was running. If any image failed the document is not
//! published, and images that did land are not rolled back.

use serde::Serialize;
use tokio::sync::Mutex;

use showroom_core::{ContentPath, PublishAttempt, PublishStep, VersionToken};

use crate::publisher::{ProgressSink, PublishOptions, PublishRequest, Publisher};
use crate::staging::PendingImages;

/// Result of writing one staged image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageWrite {
    Written {
        name: String,
        path: ContentPath,
        version: VersionToken,
    },
    Failed {
        name: String,
        reason: String,
    },
}

impl ImageWrite {
    pub fn name(&self) -> &str {
        match self {
            ImageWrite::Written { name, .. } | ImageWrite::Failed { name, .. } => name,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, ImageWrite::Written { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionPublishResult {
    /// The session-level wait, when recent activity held back the images.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<PublishStep>,
    pub images: Vec<ImageWrite>,
    /// `None` when an image failed and the document was never attempted.
    pub attempt: Option<PublishAttempt>,
}

impl SessionPublishResult {
    pub fn succeeded(&self) -> bool {
        self.images.iter().all(ImageWrite::is_written)
            && self.attempt.as_ref().is_some_and(PublishAttempt::succeeded)
    }

    pub fn failed_images(&self) -> impl Iterator<Item = &ImageWrite> {
        self.images.iter().filter(|image| !image.is_written())
    }
}

/// Write every pending image under `images_dir`, then publish `request`.
///
/// The staging lock is only held while reading or updating entries, never
/// across a store call, so images staged meanwhile are kept for next time.
pub async fn publish_session(
    publisher: &Publisher,
    staging: &Mutex<PendingImages>,
    images_dir: &ContentPath,
    request: PublishRequest,
    options: &PublishOptions,
    progress: &mut dyn ProgressSink,
) -> SessionPublishResult {
    let pending = staging.lock().await.list();
    if !pending.is_empty() {
        tracing::info!("writing {} pending image(s)", pending.len());
    }

    // One window check covers the session; the image commits made below must
    // not hold back the document write.
    let mut document_options = *options;
    let mut cooldown = None;
    if options.wait_for_window && !pending.is_empty() {
        let window = publisher.window();
        let wait_secs = window.cooldown().as_secs();
        window
            .wait_for_clear_window(publisher.store().as_ref(), |activity| {
                let step = PublishStep::Cooldown {
                    recent: activity.message().unwrap_or_default().to_string(),
                    wait_secs,
                };
                progress.step(&step);
                cooldown = Some(step);
            })
            .await;
        document_options.wait_for_window = false;
    }

    let mut images = Vec::with_capacity(pending.len());
    for image in &pending {
        let path = images_dir.join(&image.name);
        let message = format!("Upload image {}", image.name);
        match publisher.write_file(&path, &image.content, &message).await {
            Ok(version) => {
                let mut staged = staging.lock().await;
                // Keep an entry that was re-staged with new content meanwhile.
                if staged.get(&image.name) == Some(image.content.as_slice()) {
                    staged.remove(&image.name);
                }
                images.push(ImageWrite::Written {
                    name: image.name.clone(),
                    path,
                    version,
                });
            }
            Err(err) => {
                tracing::warn!("image {} failed: {}", image.name, err);
                images.push(ImageWrite::Failed {
                    name: image.name.clone(),
                    reason: err.reason(),
                });
            }
        }
    }

    let all_written = images.iter().all(ImageWrite::is_written);
    if !all_written {
        tracing::warn!(
            "skipping publish of {}: {} image(s) failed",
            request.area.path,
            images.iter().filter(|i| !i.is_written()).count()
        );
        return SessionPublishResult {
            cooldown,
            images,
            attempt: None,
        };
    }

    let attempt = publisher.publish(request, &document_options, progress).await;
    SessionPublishResult {
        cooldown,
        images,
        attempt: Some(attempt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use showroom_core::{CommitRecord, ContentArea, CropLayout};
    use showroom_store::{ContentStore, LocalStore, PutRequest, StoreError, StoredFile};
    use tempfile::TempDir;

    use crate::publisher::NoProgress;

    /// Local store that refuses writes to one path.
    struct FlakyStore {
        inner: LocalStore,
        refuse: ContentPath,
    }

    #[async_trait]
    impl ContentStore for FlakyStore {
        async fn fetch(&self, path: &ContentPath) -> Result<Option<StoredFile>, StoreError> {
            self.inner.fetch(path).await
        }

        async fn put(&self, request: PutRequest<'_>) -> Result<VersionToken, StoreError> {
            if request.path == &self.refuse {
                return Err(StoreError::Api {
                    endpoint: format!("PUT contents/{}", request.path),
                    status: 500,
                    message: "Server Error".to_string(),
                });
            }
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

    fn request() -> PublishRequest {
        PublishRequest::new(
            ContentArea {
                name: "site".to_string(),
                path: ContentPath::from("src/data/content.json"),
                crops: CropLayout::Gallery,
            },
            json!({"gallery": ["/images/a.png"]}),
        )
    }

    fn options() -> PublishOptions {
        PublishOptions {
            wait_for_window: false,
            trigger_rebuild: false,
        }
    }

    fn staged(entries: &[(&str, &[u8])]) -> Mutex<PendingImages> {
        let mut staging = PendingImages::new();
        for (name, content) in entries {
            staging.add(name, content.to_vec()).unwrap();
        }
        Mutex::new(staging)
    }

    #[tokio::test]
    async fn images_then_document_drains_staging() {
        let root = TempDir::new().unwrap();
        let publisher = Publisher::new(Arc::new(LocalStore::new(root.path())));
        let staging = staged(&[("a.png", &b"AAA"[..]), ("b.png", &b"BBB"[..])]);

        let result = publish_session(
            &publisher,
            &staging,
            &ContentPath::from("public/images"),
            request(),
            &options(),
            &mut NoProgress,
        )
        .await;

        assert!(result.succeeded());
        assert_eq!(result.images.len(), 2);
        assert_eq!(std::fs::read(root.path().join("public/images/a.png")).unwrap(), b"AAA");
        assert!(root.path().join("src/data/content.json").exists());
        assert!(!staging.lock().await.has_pending());
    }

    #[tokio::test]
    async fn failed_image_stays_pending_and_skips_document() {
        let root = TempDir::new().unwrap();
        let store = FlakyStore {
            inner: LocalStore::new(root.path()),
            refuse: ContentPath::from("public/images/b.png"),
        };
        let publisher = Publisher::new(Arc::new(store));
        let staging = staged(&[("a.png", &b"AAA"[..]), ("b.png", &b"BBB"[..])]);

        let result = publish_session(
            &publisher,
            &staging,
            &ContentPath::from("public/images"),
            request(),
            &options(),
            &mut NoProgress,
        )
        .await;

        assert!(!result.succeeded());
        assert!(result.attempt.is_none());
        let failed: Vec<&str> = result.failed_images().map(ImageWrite::name).collect();
        assert_eq!(failed, vec!["b.png"]);

        // a.png landed and is no longer pending; b.png waits for a retry.
        assert!(root.path().join("public/images/a.png").exists());
        assert!(!root.path().join("src/data/content.json").exists());
        let staging = staging.lock().await;
        assert_eq!(staging.len(), 1);
        assert!(staging.get("b.png").is_some());
    }

    #[tokio::test]
    async fn no_pending_images_publishes_document_only() {
        let root = TempDir::new().unwrap();
        let publisher = Publisher::new(Arc::new(LocalStore::new(root.path())));
        let staging = Mutex::new(PendingImages::new());

        let result = publish_session(
            &publisher,
            &staging,
            &ContentPath::from("public/images"),
            request(),
            &options(),
            &mut NoProgress,
        )
        .await;

        assert!(result.images.is_empty());
        assert!(result.succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn session_waits_once_before_images() {
        let root = TempDir::new().unwrap();
        let publisher = Publisher::new(Arc::new(LocalStore::new(root.path())));
        let staging = staged(&[("a.png", &b"AAA"[..])]);
        let wait = PublishOptions {
            wait_for_window: true,
            trigger_rebuild: false,
        };

        let started = tokio::time::Instant::now();
        let mut cooldowns = 0;
        let result = publish_session(
            &publisher,
            &staging,
            &ContentPath::from("public/images"),
            request(),
            &wait,
            &mut |step: &PublishStep| {
                if matches!(step, PublishStep::Cooldown { .. }) {
                    cooldowns += 1;
                }
            },
        )
        .await;

        assert!(result.succeeded());
        assert_eq!(cooldowns, 0, "fresh store has no recent activity");
        assert!(started.elapsed() < std::time::Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn session_cooldown_is_kept_in_the_result() {
        let root = TempDir::new().unwrap();
        let publisher = Publisher::new(Arc::new(LocalStore::new(root.path())));
        publisher
            .write_file(&ContentPath::from("README.md"), b"hello", "someone else")
            .await
            .unwrap();
        let staging = staged(&[("a.png", &b"AAA"[..])]);
        let wait = PublishOptions {
            wait_for_window: true,
            trigger_rebuild: false,
        };

        let result = publish_session(
            &publisher,
            &staging,
            &ContentPath::from("public/images"),
            request(),
            &wait,
            &mut NoProgress,
        )
        .await;

        assert!(result.succeeded());
        assert!(matches!(
            result.cooldown,
            Some(PublishStep::Cooldown { wait_secs, .. }) if wait_secs == publisher.window().cooldown().as_secs()
        ));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["cooldown"]["step"], "cooldown");
    }

    #[tokio::test]
    async fn no_wait_leaves_cooldown_out_of_the_json() {
        let root = TempDir::new().unwrap();
        let publisher = Publisher::new(Arc::new(LocalStore::new(root.path())));
        let staging = staged(&[("a.png", &b"AAA"[..])]);

        let result = publish_session(
            &publisher,
            &staging,
            &ContentPath::from("public/images"),
            request(),
            &options(),
            &mut NoProgress,
        )
        .await;

        assert!(result.cooldown.is_none());
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("cooldown").is_none());
    }

    #[tokio::test]
    async fn replacing_an_existing_image_carries_its_token() {
        let root = TempDir::new().unwrap();
        let publisher = Publisher::new(Arc::new(LocalStore::new(root.path())));
        let dir = ContentPath::from("public/images");

        let first = staged(&[("a.png", &b"old"[..])]);
        publish_session(&publisher, &first, &dir, request(), &options(), &mut NoProgress).await;
        let second = staged(&[("a.png", &b"new"[..])]);
        let result =
            publish_session(&publisher, &second, &dir, request(), &options(), &mut NoProgress).await;

        assert!(result.succeeded());
        assert_eq!(std::fs::read(root.path().join("public/images/a.png")).unwrap(), b"new");
    }
}
