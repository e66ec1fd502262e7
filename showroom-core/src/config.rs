//! Site configuration persisted as YAML.
//!
//! # Storage layout
//!
//! ```text
//! ~/.showroom/
//!   config.yaml   (mode 0600, created by `showroom init`)
//!   run/          (daemon socket)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! The store token is never written here; see [`Credentials::from_env`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ContentArea, ContentPath, CropLayout};

/// Environment variable holding the bearer token for the content store.
pub const TOKEN_ENV: &str = "SHOWROOM_STORE_TOKEN";

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_AUTHOR: &str = "Carrie";
pub const DEFAULT_IMAGES_DIR: &str = "public/images";

// ---------------------------------------------------------------------------
// 1. Types
// ---------------------------------------------------------------------------

/// Which content store backs the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreSettings {
    /// A GitHub repository addressed through the contents API.
    Github {
        #[serde(default = "default_api_url")]
        api_url: String,
        owner: String,
        repo: String,
        #[serde(default = "default_branch")]
        branch: String,
    },
    /// A directory on disk (working checkout or preview folder).
    Local { root: PathBuf },
}

impl StoreSettings {
    pub fn requires_token(&self) -> bool {
        matches!(self, StoreSettings::Github { .. })
    }
}

/// Conflict-window timings, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSettings {
    #[serde(default = "default_lookback")]
    pub lookback_secs: u64,
    #[serde(default = "default_threshold")]
    pub threshold_secs: u64,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            lookback_secs: default_lookback(),
            threshold_secs: default_threshold(),
            cooldown_secs: default_cooldown(),
        }
    }
}

/// Unsigned-upload endpoint for the image CDN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSettings {
    pub endpoint: String,
    pub preset: String,
}

/// Root of `~/.showroom/config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub store: StoreSettings,
    #[serde(default = "default_areas")]
    pub areas: Vec<ContentArea>,
    #[serde(default = "default_images_dir")]
    pub images_dir: ContentPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebuild_hook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadSettings>,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default)]
    pub window: WindowSettings,
}

impl SiteConfig {
    /// A config with the default areas for `store`.
    pub fn new(store: StoreSettings) -> Self {
        Self {
            store,
            areas: default_areas(),
            images_dir: default_images_dir(),
            rebuild_hook: None,
            upload: None,
            author: default_author(),
            window: WindowSettings::default(),
        }
    }

    /// Look up a content area by name.
    pub fn area(&self, name: &str) -> Result<&ContentArea, ConfigError> {
        self.areas
            .iter()
            .find(|area| area.name == name)
            .ok_or_else(|| ConfigError::UnknownArea(name.to_owned()))
    }
}

/// Bearer token for the content store, read from the environment.
#[derive(Clone)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Read [`TOKEN_ENV`]; unset or blank is [`ConfigError::MissingToken`].
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => Ok(Self::new(token.trim())),
            _ => Err(ConfigError::MissingToken { var: TOKEN_ENV }),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("token", &"<redacted>").finish()
    }
}

// ---------------------------------------------------------------------------
// 2. Paths
// ---------------------------------------------------------------------------

/// The user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

/// `<home>/.showroom/`
pub fn showroom_root(home: &Path) -> PathBuf {
    home.join(".showroom")
}

/// `<home>/.showroom/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    showroom_root(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.showroom/config.yaml`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<SiteConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<SiteConfig, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &SiteConfig) -> Result<(), ConfigError> {
    let dir = showroom_root(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &SiteConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 5. Init
// ---------------------------------------------------------------------------

/// Create the config for `store` with default areas.
///
/// Idempotent: if a config already exists, loads and returns it unchanged.
pub fn init_at(home: &Path, store: StoreSettings) -> Result<SiteConfig, ConfigError> {
    if config_path_at(home).exists() {
        return load_at(home);
    }
    let config = SiteConfig::new(store);
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(store: StoreSettings) -> Result<SiteConfig, ConfigError> {
    init_at(&home()?, store)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn default_api_url() -> String {
    DEFAULT_API_URL.to_owned()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_owned()
}

fn default_author() -> String {
    DEFAULT_AUTHOR.to_owned()
}

fn default_images_dir() -> ContentPath {
    ContentPath::from(DEFAULT_IMAGES_DIR)
}

fn default_lookback() -> u64 {
    120
}

fn default_threshold() -> u64 {
    30
}

fn default_cooldown() -> u64 {
    35
}

fn default_areas() -> Vec<ContentArea> {
    vec![
        ContentArea {
            name: "products".to_owned(),
            path: ContentPath::from("src/data/products.json"),
            crops: CropLayout::PerItem,
        },
        ContentArea {
            name: "site".to_owned(),
            path: ContentPath::from("src/data/content.json"),
            crops: CropLayout::Gallery,
        },
    ]
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
