use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod error;
pub mod handler;
pub mod output;

/// setube - convert YouTube links and playlists through a conversion service
#[derive(Parser, Debug)]
#[command(name = "setube")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Override config directory path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (TRACE level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a link to the saved list and resolve it
    Add {
        url: String,
    },

    /// List saved links
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a saved link
    Remove {
        /// Entry ID (UUID)
        id: String,
    },

    /// Keep only the first saved link
    Clear,

    /// Show metadata for a link without saving it
    Info {
        url: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert the given links, or every saved link when none are given
    Convert {
        urls: Vec<String>,

        /// Output format (mp3, wav, m4a, mp4)
        #[arg(long, short)]
        format: Option<String>,

        /// Directory to save the result in
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Convert every item of a playlist
    Playlist {
        url: String,

        /// Output format (mp3, wav, m4a, mp4)
        #[arg(long, short)]
        format: Option<String>,

        /// Directory to save the result in
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a settings.toml with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the settings.toml path
    Path,
}
