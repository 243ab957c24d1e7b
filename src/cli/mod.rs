//! CLI module for vidpipe.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// vidpipe - resumable download, transcription and summarization of videos
///
/// Reads a list of URLs and takes each through download, transcription and
/// summary, checkpointing every stage so interrupted batches resume.
#[derive(Parser, Debug)]
#[command(name = "vidpipe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process every URL in a list file
    Run {
        /// File with one URL per line (# comments allowed)
        urls_file: String,

        /// Maximum number of URLs processed at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Attempts per strategy before falling back
        #[arg(long)]
        max_retries: Option<u32>,

        /// Base retry delay in seconds
        #[arg(long)]
        retry_delay: Option<u64>,

        /// Write the batch report as JSON to this file
        #[arg(short, long)]
        report: Option<String>,

        /// Keep checkpoints in memory only for this run
        #[arg(long)]
        no_checkpoint: bool,
    },

    /// Show checkpoint state for one URL, or for everything
    Status {
        /// URL to inspect
        url: Option<String>,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
