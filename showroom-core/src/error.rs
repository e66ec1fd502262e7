//! Error types for showroom-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from site configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, disk full, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the file path and serde_yaml line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so `~/.showroom/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}; run `showroom init` first")]
    ConfigNotFound { path: PathBuf },

    /// No content area with this name is configured.
    #[error("unknown content area '{0}'")]
    UnknownArea(String),

    /// The store token environment variable is unset or empty.
    #[error("missing store token: set ${var}")]
    MissingToken { var: &'static str },
}
