//! Subcommand implementations and the helpers they share.

pub mod daemon;
pub mod diff;
pub mod images;
pub mod init;
pub mod publish;
pub mod status;
pub mod upload;
pub mod window;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use showroom_core::{config, Credentials, SiteConfig};
use showroom_sync::Publisher;

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Loaded config plus the token when its store needs one.
pub(crate) struct Workspace {
    pub config: SiteConfig,
    pub credentials: Option<Credentials>,
}

impl Workspace {
    pub fn open() -> Result<Self> {
        let home = home()?;
        let config = config::load_at(&home).context("failed to load showroom config")?;
        let credentials = if config.store.requires_token() {
            Some(Credentials::from_env()?)
        } else {
            None
        };
        Ok(Self {
            config,
            credentials,
        })
    }

    pub fn publisher(&self) -> Result<Publisher> {
        Publisher::from_config(&self.config, self.credentials.as_ref())
            .context("failed to open content store")
    }
}

/// Single-threaded runtime for one command's worth of store calls.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).with_context(|| format!("cannot read '{}'", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("'{}' is not valid JSON", path.display()))
}

/// Absolute form of a user-supplied path, for handing to the daemon.
pub(crate) fn absolute(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("cannot resolve path '{}'", path.display()))
}
