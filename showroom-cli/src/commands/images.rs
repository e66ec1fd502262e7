//! `showroom images` — the daemon's pending-image staging area.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Deserialize;
use tabled::{settings::Style, Table, Tabled};

use showroom_daemon::{request_clear, request_pending, request_stage, request_unstage};

#[derive(Subcommand, Debug)]
pub enum ImagesCommand {
    /// Stage an image to be written with the next publish.
    Stage(StageArgs),
    /// Drop one staged image.
    Unstage {
        /// Staged image name.
        name: String,
    },
    /// List staged images.
    List,
    /// Drop every staged image.
    Clear,
}

#[derive(Args, Debug)]
pub struct StageArgs {
    /// Image file to stage.
    pub file: PathBuf,

    /// Name to store the image under; defaults to the file name.
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PendingList {
    images: Vec<PendingRow>,
}

#[derive(Debug, Deserialize, Tabled)]
struct PendingRow {
    #[tabled(rename = "name")]
    name: String,
    #[serde(rename = "bytes")]
    #[tabled(rename = "bytes")]
    size: usize,
}

pub fn run(command: ImagesCommand) -> Result<()> {
    let home = super::home()?;

    match command {
        ImagesCommand::Stage(args) => {
            let file = super::absolute(&args.file)?;
            let staged = request_stage(&home, &file, args.name.as_deref())
                .context("failed to stage image")?;
            let name = staged
                .get("staged")
                .and_then(|n| n.as_str())
                .unwrap_or_default();
            let pending = staged.get("pending").and_then(|p| p.as_u64()).unwrap_or(0);
            println!("✓ Staged {name} ({pending} pending)");
        }
        ImagesCommand::Unstage { name } => {
            let removed = request_unstage(&home, &name).context("failed to unstage image")?;
            if removed.get("removed").and_then(|r| r.as_bool()) == Some(true) {
                println!("✓ Unstaged {name}");
            } else {
                println!("{name} was not staged");
            }
        }
        ImagesCommand::List => {
            let pending: PendingList = serde_json::from_value(
                request_pending(&home).context("failed to list staged images")?,
            )
            .context("unexpected pending-images response from daemon")?;
            if pending.images.is_empty() {
                println!("No staged images.");
            } else {
                let mut table = Table::new(pending.images);
                table.with(Style::rounded());
                println!("{table}");
            }
        }
        ImagesCommand::Clear => {
            let cleared = request_clear(&home).context("failed to clear staged images")?;
            let count = cleared.get("cleared").and_then(|c| c.as_u64()).unwrap_or(0);
            println!("✓ Cleared {count} staged image(s)");
        }
    }
    Ok(())
}
