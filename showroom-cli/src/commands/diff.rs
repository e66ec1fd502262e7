//! `showroom diff <area> <file>` — what publishing `file` would change.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use showroom_core::CropMap;
use showroom_sync::diff_content;

use super::Workspace;

/// Arguments for `showroom diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Content area name (see `showroom status`).
    pub area: String,

    /// Local JSON document to compare.
    pub file: PathBuf,

    /// JSON map of image path to `{scale, x, y}` crop settings, merged in
    /// the same way `showroom publish --crops` does.
    #[arg(long, value_name = "FILE")]
    pub crops: Option<PathBuf>,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let workspace = Workspace::open()?;
        let area = workspace.config.area(&self.area)?.clone();
        let local: Value = super::read_json(&self.file)?;
        let crops: CropMap = match &self.crops {
            Some(path) => super::read_json(path)?,
            None => CropMap::new(),
        };
        let publisher = workspace.publisher()?;

        let result = super::runtime()?
            .block_on(diff_content(publisher.store().as_ref(), &area, &local, &crops))
            .with_context(|| format!("diff failed for '{}'", self.area))?;

        match result.unified_diff {
            None => println!("No differences for '{}'.", result.path),
            Some(diff) => {
                print!("{diff}");
                if !diff.ends_with('\n') {
                    println!();
                }
            }
        }
        Ok(())
    }
}
