//! Showroom core library — content domain types, site configuration, errors.
//!
//! - [`types`] — newtypes, content blobs, commit records, publish attempts
//! - [`config`] — load / save / init of `~/.showroom/config.yaml`
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Credentials, SiteConfig, StoreSettings, UploadSettings, WindowSettings};
pub use error::ConfigError;
pub use types::{
    CommitRecord, ContentArea, ContentBlob, ContentPath, CropLayout, CropMap, CropSettings,
    PublishAttempt, PublishOutcome, PublishStep, VersionToken,
};
