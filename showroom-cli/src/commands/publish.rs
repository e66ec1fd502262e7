//! `showroom publish <area> <file>` — write a content document to the store.
//!
//! With the daemon running, the publish goes through its session so staged
//! images are written first. Otherwise the document is published directly.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use serde_json::Value;

use showroom_core::{CropMap, PublishAttempt, PublishStep};
use showroom_daemon::{request_publish, DaemonError};
use showroom_sync::{PublishOptions, PublishRequest};

use super::Workspace;

/// Arguments for `showroom publish`.
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Content area name (see `showroom status`).
    pub area: String,

    /// JSON document to publish.
    pub file: PathBuf,

    /// JSON map of image path to `{scale, x, y}` crop settings.
    #[arg(long, value_name = "FILE")]
    pub crops: Option<PathBuf>,

    /// Skip the conflict-window check and cooldown.
    #[arg(long)]
    pub no_wait: bool,

    /// Do not fire the rebuild hook after writing.
    #[arg(long)]
    pub no_rebuild: bool,
}

impl PublishArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let file = super::absolute(&self.file)?;
        let crops = self.crops.as_deref().map(super::absolute).transpose()?;

        match request_publish(
            &home,
            &self.area,
            &file,
            crops.as_deref(),
            self.no_wait,
            self.no_rebuild,
        ) {
            Ok(summary) => print_daemon_summary(summary),
            Err(DaemonError::DaemonNotRunning { .. }) => self.publish_direct(&file, crops.as_deref()),
            Err(err) => Err(err).context("publish through daemon failed"),
        }
    }

    fn publish_direct(&self, file: &Path, crops: Option<&Path>) -> Result<()> {
        let workspace = Workspace::open()?;
        let area = workspace.config.area(&self.area)?.clone();
        let payload: Value = super::read_json(file)?;
        let crops: CropMap = match crops {
            Some(path) => super::read_json(path)?,
            None => CropMap::new(),
        };
        let publisher = workspace.publisher()?;
        let options = PublishOptions {
            wait_for_window: !self.no_wait,
            trigger_rebuild: !self.no_rebuild,
        };

        let request = PublishRequest::new(area, payload).with_crops(crops);
        let attempt = super::runtime()?.block_on(publisher.publish(
            request,
            &options,
            &mut |step: &PublishStep| print_step(step),
        ));
        finish(&attempt)
    }
}

#[derive(Debug, Deserialize)]
struct DaemonPublish {
    #[serde(default)]
    cooldown: Option<PublishStep>,
    #[serde(default)]
    images: Vec<DaemonImage>,
    attempt: Option<PublishAttempt>,
}

#[derive(Debug, Deserialize)]
struct DaemonImage {
    name: String,
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

fn print_daemon_summary(summary: Value) -> Result<()> {
    let summary: DaemonPublish =
        serde_json::from_value(summary).context("unexpected publish response from daemon")?;

    if let Some(step) = &summary.cooldown {
        print_step(step);
    }
    for image in &summary.images {
        match image.reason.as_deref() {
            None => println!("{} Image {} saved", "✓".green(), image.name),
            Some(reason) => println!("{} Image {} {}: {reason}", "✗".red(), image.name, image.status),
        }
    }

    match summary.attempt {
        Some(attempt) => {
            for step in &attempt.steps {
                print_step(step);
            }
            finish(&attempt)
        }
        None => anyhow::bail!(
            "{} image(s) failed; content was not published. Failed images stay staged for retry.",
            summary.images.iter().filter(|i| i.reason.is_some()).count()
        ),
    }
}

fn print_step(step: &PublishStep) {
    match step {
        PublishStep::Succeeded { .. } => println!("{} {step}", "✓".green().bold()),
        PublishStep::Failed { .. } | PublishStep::Rejected { .. } => {
            println!("{} {step}", "✗".red().bold())
        }
        PublishStep::Cooldown { .. } | PublishStep::RebuildFailed { .. } => {
            println!("{} {step}", "!".yellow().bold())
        }
        _ => println!("  {step}"),
    }
}

fn finish(attempt: &PublishAttempt) -> Result<()> {
    if attempt.succeeded() {
        Ok(())
    } else {
        anyhow::bail!("{}", attempt.status_message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn daemon_summary_keeps_the_session_cooldown() {
        let summary: DaemonPublish = serde_json::from_value(json!({
            "area": "site",
            "succeeded": false,
            "duration_ms": 30012,
            "cooldown": {"step": "cooldown", "recent": "12 seconds ago", "wait_secs": 30},
            "images": [{"name": "a.png", "status": "failed", "reason": "store down"}],
        }))
        .unwrap();

        assert!(matches!(
            summary.cooldown,
            Some(PublishStep::Cooldown { wait_secs: 30, .. })
        ));
        assert_eq!(summary.images.len(), 1);
        assert!(summary.attempt.is_none());
    }

    #[test]
    fn daemon_summary_without_cooldown() {
        let summary: DaemonPublish =
            serde_json::from_value(json!({"area": "site", "images": []})).unwrap();
        assert!(summary.cooldown.is_none());
    }
}
