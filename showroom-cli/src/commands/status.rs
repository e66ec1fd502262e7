//! `showroom status` — what the store currently holds for every area.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use showroom_core::StoreSettings;
use showroom_sync::{Publisher, RecentActivity};

use super::Workspace;

/// Arguments for `showroom status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let workspace = Workspace::open()?;
        let publisher = workspace.publisher()?;

        let report = super::runtime()?.block_on(build_report(&workspace, &publisher))?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(report);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    store: String,
    recent_publish: Option<String>,
    threshold_secs: u64,
    areas: Vec<AreaStatus>,
}

#[derive(Debug, Serialize)]
struct AreaStatus {
    area: String,
    path: String,
    crops: String,
    /// `None` when the document does not exist yet.
    version: Option<String>,
    last_updated: Option<DateTime<Utc>>,
    updated_by: Option<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "area")]
    area: String,
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "crops")]
    crops: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "last updated")]
    last_updated: String,
    #[tabled(rename = "by")]
    updated_by: String,
}

async fn build_report(workspace: &Workspace, publisher: &Publisher) -> Result<StatusReport> {
    let store = publisher.store();
    let mut areas = Vec::new();
    for area in &workspace.config.areas {
        let stored = store
            .fetch(&area.path)
            .await
            .with_context(|| format!("failed to fetch '{}'", area.path))?;
        let blob = stored
            .map(|file| file.into_blob(&area.path))
            .transpose()
            .with_context(|| format!("'{}' in the store is not valid JSON", area.path))?;

        areas.push(AreaStatus {
            area: area.name.clone(),
            path: area.path.to_string(),
            crops: area.crops.to_string(),
            version: blob.as_ref().map(|b| b.version.short().to_string()),
            last_updated: blob.as_ref().and_then(|b| b.last_updated_at),
            updated_by: blob.and_then(|b| b.updated_by),
        });
    }

    let recent = publisher
        .window()
        .check_recent_activity(store.as_ref())
        .await;

    Ok(StatusReport {
        store: describe_store(&workspace.config.store),
        recent_publish: match recent {
            RecentActivity::Recent { message, .. } => Some(message),
            RecentActivity::Clear => None,
        },
        threshold_secs: workspace.config.window.threshold_secs,
        areas,
    })
}

fn describe_store(store: &StoreSettings) -> String {
    match store {
        StoreSettings::Github {
            owner,
            repo,
            branch,
            ..
        } => format!("github:{owner}/{repo}@{branch}"),
        StoreSettings::Local { root } => format!("local:{}", root.display()),
    }
}

fn print_table(report: StatusReport) {
    println!(
        "Showroom v{} | {} | {} areas",
        env!("CARGO_PKG_VERSION"),
        report.store,
        report.areas.len(),
    );

    let rows: Vec<StatusTableRow> = report
        .areas
        .into_iter()
        .map(|row| StatusTableRow {
            area: row.area,
            path: row.path,
            crops: row.crops,
            version: row
                .version
                .unwrap_or_else(|| "missing".to_string()),
            last_updated: row
                .last_updated
                .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".to_string()),
            updated_by: row.updated_by.unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    match report.recent_publish {
        Some(ago) => println!(
            "{} Another publish happened {ago}; a new publish will wait for its rebuild.",
            "■".yellow().bold()
        ),
        None => println!(
            "{} No publishes in the last {} seconds.",
            "■".green().bold(),
            report.threshold_secs
        ),
    }
}
