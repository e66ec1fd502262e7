//! `showroom window` — is it safe to publish right now?

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use showroom_sync::RecentActivity;

use super::Workspace;

#[derive(Args, Debug)]
pub struct WindowArgs {}

impl WindowArgs {
    pub fn run(self) -> Result<()> {
        let workspace = Workspace::open()?;
        let publisher = workspace.publisher()?;
        let window = publisher.window();

        let activity = super::runtime()?
            .block_on(window.check_recent_activity(publisher.store().as_ref()));
        match activity {
            RecentActivity::Recent { message, .. } => println!(
                "{} Another publish happened {message}. Publishing now waits {}s first.",
                "■".yellow().bold(),
                window.cooldown().as_secs()
            ),
            RecentActivity::Clear => {
                println!("{} No recent publishes; clear to publish.", "■".green().bold())
            }
        }
        Ok(())
    }
}
