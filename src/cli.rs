use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the `una` tool.
///
/// Global options pick the configuration file, credentials and timeout; the
/// subcommand names the operation and the remote URL.
#[derive(Parser, Debug)]
#[clap(
    name = "una",
    about = "Stat, browse, download and remove remote files over HTTP(S), FTP(S), SFTP and S3"
)]
pub struct Args {
    /// Verbose logging
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration YAML file
    #[clap(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Protocol to use instead of the URL scheme (e.g. sftp)
    #[clap(long, global = true)]
    pub protocol: Option<String>,

    /// Credential profile from the configuration file
    #[clap(long, global = true)]
    pub profile: Option<String>,

    /// Connection timeout in seconds (default: from config, else 30)
    #[clap(long, global = true)]
    pub timeout: Option<u64>,

    /// Print results as JSON
    #[clap(long, global = true)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Show size and modification time of a remote file
    Stat {
        /// Remote URL, e.g. sftp://user@host/path/file
        url: String,
    },

    /// List the entries of a remote directory or bucket
    Browse {
        /// Remote URL of the directory
        url: String,
    },

    /// Download a remote file
    Download {
        /// Remote URL of the file
        url: String,

        /// Local output path (default: the remote file name in the current directory)
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a remote file or empty directory
    Remove {
        /// Remote URL of the file or directory
        url: String,
    },
}

impl Commands {
    pub fn url(&self) -> &str {
        match self {
            Commands::Stat { url }
            | Commands::Browse { url }
            | Commands::Download { url, .. }
            | Commands::Remove { url } => url,
        }
    }
}
