use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "haulbox")]
#[command(about = "Media acquisition with tracked, resumable jobs", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides HAULBOX_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a single item
    Download(DownloadArgs),
    /// Download the items of a playlist
    Playlist(PlaylistArgs),
    /// Download several items concurrently
    Batch(BatchArgs),
    /// Show recorded jobs
    Jobs(JobsArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    pub url: String,

    /// Destination directory (local path or mounted share)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Credential profile to authenticate with
    #[arg(long)]
    pub profile: Option<String>,

    /// Name for the downloaded file instead of the engine's title-based one
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct PlaylistArgs {
    pub url: String,

    /// Destination directory (local path or mounted share)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Credential profile to authenticate with
    #[arg(long)]
    pub profile: Option<String>,

    /// Download at most this many items (0 = all)
    #[arg(long)]
    pub max_items: Option<u32>,

    /// Ignore the configured default item cap
    #[arg(long)]
    pub no_max: bool,
}

#[derive(clap::Args, Debug)]
pub struct BatchArgs {
    #[arg(required = true)]
    pub urls: Vec<String>,

    #[arg(short, long)]
    pub output: PathBuf,

    #[arg(long)]
    pub profile: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct JobsArgs {
    /// Show a single job
    #[arg(long)]
    pub id: Option<Uuid>,

    /// Include the transition history (requires --id)
    #[arg(long, requires = "id")]
    pub events: bool,
}
