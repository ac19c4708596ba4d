//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Fetch many URLs concurrently with one aggregate progress bar.
#[derive(Debug, Parser)]
#[command(name = "netq")]
#[command(about = "Concurrent HTTP transfers with aggregate progress")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download one or more URLs
    Fetch(FetchArgs),
}

#[derive(Debug, Clone, Args)]
pub struct FetchArgs {
    /// URLs to download
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Directory the downloads are written to
    #[arg(short, long = "output-dir", env = "NETQ_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Probe sizes with HEAD requests before downloading
    #[arg(long, env = "NETQ_ACCURATE_PROGRESS")]
    pub accurate_progress: bool,

    /// Keep going when a download fails
    #[arg(long)]
    pub no_cancel_on_failure: bool,

    /// Maximum concurrent requests (0 = unlimited)
    #[arg(short = 'j', long, env = "NETQ_MAX_CONCURRENT", default_value_t = 0)]
    pub max_concurrent: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "NETQ_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}
