//! # showroom-sync
//!
//! Publish orchestration for site content.
//!
//! Call [`Publisher::publish`] to write one content document with its crops
//! merged in, or [`pipeline::publish_session`] to write the session's pending
//! images first and then the document. [`ConflictWindow`] adds the
//! best-effort cooldown in front of each write.

pub mod diff;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod publisher;
pub mod staging;
pub mod window;

pub use diff::{diff_content, ContentDiff};
pub use error::SyncError;
pub use merge::Stamp;
pub use pipeline::{publish_session, ImageWrite, SessionPublishResult};
pub use publisher::{NoProgress, ProgressSink, PublishOptions, PublishRequest, Publisher};
pub use staging::{PendingImage, PendingImages};
pub use window::{ConflictWindow, RecentActivity};
