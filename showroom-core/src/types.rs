//! Domain types for editable site content.
//!
//! Content lives in a remote versioned store as one JSON document per
//! content area. Everything here is serializable via serde so the daemon can
//! hand it back over its socket unchanged.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Store-relative path of a content document or image (e.g. `src/data/products.json`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentPath(pub String);

impl ContentPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a file name onto a directory-like path.
    pub fn join(&self, name: &str) -> ContentPath {
        let dir = self.0.trim_end_matches('/');
        if dir.is_empty() {
            ContentPath(name.to_owned())
        } else {
            ContentPath(format!("{dir}/{name}"))
        }
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ContentPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContentPath {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque version identifier assigned by the store on every write.
///
/// A write must present the token of the blob it replaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(pub String);

impl VersionToken {
    /// First seven characters, for status lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(7) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for VersionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VersionToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Crops
// ---------------------------------------------------------------------------

/// Per-image crop: a zoom factor plus an object-position in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropSettings {
    pub scale: f64,
    pub x: f64,
    pub y: f64,
}

impl Default for CropSettings {
    fn default() -> Self {
        Self {
            scale: 1.0,
            x: 50.0,
            y: 50.0,
        }
    }
}

impl CropSettings {
    /// Check that the crop can be applied: positive scale, positions within `0..=100`.
    pub fn validate(&self) -> Result<(), String> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(format!("scale must be positive, got {}", self.scale));
        }
        for (axis, value) in [("x", self.x), ("y", self.y)] {
            if !(0.0..=100.0).contains(&value) {
                return Err(format!("{axis} must be within 0..=100, got {value}"));
            }
        }
        Ok(())
    }
}

/// Crops keyed by image identifier (the image path as referenced in content).
pub type CropMap = BTreeMap<String, CropSettings>;

/// Where crop settings are attached inside a content document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CropLayout {
    /// Root-level `galleryCrops` side-map keyed by image path.
    #[default]
    Gallery,
    /// `imageCrop` on every nested object whose `image` field matches.
    PerItem,
}

impl fmt::Display for CropLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CropLayout::Gallery => write!(f, "gallery"),
            CropLayout::PerItem => write!(f, "per-item"),
        }
    }
}

// ---------------------------------------------------------------------------
// Content areas and blobs
// ---------------------------------------------------------------------------

/// One editable JSON document, e.g. the products catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentArea {
    pub name: String,
    pub path: ContentPath,
    #[serde(default)]
    pub crops: CropLayout,
}

/// A JSON document as currently held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlob {
    pub path: ContentPath,
    pub body: Value,
    pub version: VersionToken,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

impl ContentBlob {
    /// Build a blob, lifting the `lastUpdated` / `updatedBy` stamp out of the body.
    pub fn new(path: ContentPath, body: Value, version: VersionToken) -> Self {
        let last_updated_at = body
            .get("lastUpdated")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let updated_by = body
            .get("updatedBy")
            .and_then(Value::as_str)
            .map(str::to_owned);
        Self {
            path,
            body,
            version,
            last_updated_at,
            updated_by,
        }
    }
}

/// One entry of the store's write history. Observed, never retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub author_timestamp: DateTime<Utc>,
    pub message: String,
}

impl CommitRecord {
    /// Age relative to `now`; a timestamp in the future counts as zero.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        let age = now.signed_duration_since(self.author_timestamp);
        if age < chrono::Duration::zero() {
            chrono::Duration::zero()
        } else {
            age
        }
    }
}

// ---------------------------------------------------------------------------
// Publish attempts
// ---------------------------------------------------------------------------

/// Lifecycle state of a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PublishOutcome {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

/// Progress of a publish, in the order the publisher emits them.
///
/// `Connecting → FoundExisting | CreatingNew → [Cooldown] → Encoding → Writing
/// → Succeeded → [RebuildRequested | RebuildFailed] → Propagating`, or
/// `Failed` from any point. `Rejected` is emitted alone when the path is busy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PublishStep {
    Connecting,
    FoundExisting { version: VersionToken },
    CreatingNew,
    Cooldown { recent: String, wait_secs: u64 },
    Encoding,
    Writing,
    Succeeded { version: VersionToken },
    RebuildRequested,
    RebuildFailed { reason: String },
    Propagating { expected_secs: u64 },
    Rejected { path: ContentPath },
    Failed { reason: String },
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStep::Connecting => write!(f, "Connecting to content store..."),
            PublishStep::FoundExisting { version } => {
                write!(f, "Found existing content (version {})", version.short())
            }
            PublishStep::CreatingNew => write!(f, "No existing content found, creating new file"),
            PublishStep::Cooldown { recent, wait_secs } => write!(
                f,
                "Another publish happened {recent}; waiting {wait_secs}s for its rebuild to start"
            ),
            PublishStep::Encoding => write!(f, "Encoding content..."),
            PublishStep::Writing => write!(f, "Saving to content store..."),
            PublishStep::Succeeded { version } => {
                write!(f, "Published (version {})", version.short())
            }
            PublishStep::RebuildRequested => write!(f, "Site rebuild requested"),
            PublishStep::RebuildFailed { reason } => {
                write!(f, "Rebuild trigger failed ({reason}); content was still published")
            }
            PublishStep::Propagating { expected_secs } => write!(
                f,
                "Changes will be live in about {} minute(s)",
                (expected_secs + 59) / 60
            ),
            PublishStep::Rejected { path } => {
                write!(f, "A publish to {path} is already in progress")
            }
            PublishStep::Failed { reason } => write!(f, "Publish failed: {reason}"),
        }
    }
}

/// One user-initiated publish. Created per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishAttempt {
    pub target_path: ContentPath,
    pub payload: Value,
    pub started_at: DateTime<Utc>,
    pub outcome: PublishOutcome,
    /// Text of the most recent step; what a status banner shows.
    pub status_message: String,
    pub steps: Vec<PublishStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionToken>,
}

impl PublishAttempt {
    pub fn new(target_path: ContentPath, payload: Value) -> Self {
        Self {
            target_path,
            payload,
            started_at: Utc::now(),
            outcome: PublishOutcome::Pending,
            status_message: String::new(),
            steps: Vec::new(),
            version: None,
        }
    }

    /// Append a step and make it the current status message.
    pub fn record(&mut self, step: PublishStep) {
        self.status_message = step.to_string();
        if let PublishStep::Failed { .. } | PublishStep::Rejected { .. } = step {
            self.outcome = PublishOutcome::Failed;
        }
        self.steps.push(step);
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == PublishOutcome::Succeeded
    }

    pub fn failed(&self) -> bool {
        self.outcome == PublishOutcome::Failed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
