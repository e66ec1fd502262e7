//! `showroom init (--owner <o> --repo <r> | --local <dir>)`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use showroom_core::config::{self, config_path_at, DEFAULT_API_URL, DEFAULT_BRANCH, TOKEN_ENV};
use showroom_core::StoreSettings;

/// Create the site config. An existing config is left untouched.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// GitHub account that owns the site repository.
    #[arg(long, required_unless_present = "local", requires = "repo")]
    pub owner: Option<String>,

    /// Site repository name.
    #[arg(long, requires = "owner")]
    pub repo: Option<String>,

    /// Branch the site builds from.
    #[arg(long, default_value = DEFAULT_BRANCH)]
    pub branch: String,

    /// Contents API base URL (GitHub Enterprise or a test server).
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Publish into a local directory instead of GitHub.
    #[arg(long, value_name = "DIR", conflicts_with_all = ["owner", "repo"])]
    pub local: Option<PathBuf>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let path = config_path_at(&home);
        if path.exists() {
            let config = config::load_at(&home).context("failed to load showroom config")?;
            println!("Config already exists at {}; left unchanged", path.display());
            println!("  Areas: {}", area_names(&config.areas));
            return Ok(());
        }

        let store = match (self.local, self.owner, self.repo) {
            (Some(dir), _, _) => {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("cannot create '{}'", dir.display()))?;
                StoreSettings::Local {
                    root: super::absolute(&dir)?,
                }
            }
            (None, Some(owner), Some(repo)) => StoreSettings::Github {
                api_url: self.api_url,
                owner,
                repo,
                branch: self.branch,
            },
            _ => anyhow::bail!("either --local or both --owner and --repo are required"),
        };

        let config = config::init_at(&home, store).context("failed to initialize showroom")?;
        println!("✓ Created {}", path.display());
        println!("  Areas: {}", area_names(&config.areas));
        if config.store.requires_token() {
            println!("  Set ${TOKEN_ENV} before publishing.");
        }
        Ok(())
    }
}

fn area_names(areas: &[showroom_core::ContentArea]) -> String {
    areas
        .iter()
        .map(|area| area.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
