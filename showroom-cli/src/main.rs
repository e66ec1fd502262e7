//! Showroom — publish site content to a versioned content store.
//!
//! # Usage
//!
//! ```text
//! showroom init (--owner <o> --repo <r> [--branch main] [--api-url URL] | --local DIR)
//! showroom status [--json]
//! showroom window
//! showroom diff <area> <file>
//! showroom publish <area> <file> [--crops FILE] [--no-wait] [--no-rebuild]
//! showroom upload <image>
//! showroom images stage <file> [--name NAME] | unstage <name> | list | clear
//! showroom daemon start|stop|status
//! ```
//!
//! The store token is read from `SHOWROOM_STORE_TOKEN`; it is never written
//! to the config file.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, diff::DiffArgs, images::ImagesCommand, init::InitArgs,
    publish::PublishArgs, status::StatusArgs, upload::UploadArgs, window::WindowArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "showroom",
    version,
    about = "Edit and publish showroom site content",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create ~/.showroom/config.yaml for a content store.
    Init(InitArgs),

    /// Show the stored version of every content area.
    Status(StatusArgs),

    /// Check whether another publish happened in the last 30 seconds.
    Window(WindowArgs),

    /// Show a unified diff between a local file and the stored content.
    Diff(DiffArgs),

    /// Publish a content file, with pending images when the daemon runs.
    Publish(PublishArgs),

    /// Upload an image to the CDN upload endpoint.
    Upload(UploadArgs),

    /// Stage images in the running daemon for the next publish.
    Images {
        #[command(subcommand)]
        command: ImagesCommand,
    },

    /// Manage the session daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Window(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Publish(args) => args.run(),
        Commands::Upload(args) => args.run(),
        Commands::Images { command } => commands::images::run(command),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
