use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "zfsdriver")]
#[command(version, about = "Manage copy-on-write container layers on ZFS", long_about = None)]
#[command(after_help = "EXAMPLES:
    zfsdriver --root /var/lib/docker create abc
    zfsdriver --root /var/lib/docker create def --parent abc
    zfsdriver --root /var/lib/docker get def
    zfsdriver status
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./zfsdriver.toml when present)
    #[arg(short, long, value_name = "FILE", global = true, env = "ZFSDRIVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory to manage; overrides driver.root
    #[arg(short, long, value_name = "PATH", global = true)]
    pub root: Option<PathBuf>,

    /// Print Prometheus metrics after the command
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Show the bound root dataset
    Status {
        /// Print as a JSON object
        #[arg(long)]
        json: bool,
    },
    /// Create a layer, optionally as a copy-on-write child of PARENT
    Create {
        id: String,
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Destroy a layer and everything depending on it
    Remove { id: String },
    /// Mount a layer if needed and print its path
    Get { id: String },
    /// Exit with status 0 if the layer exists, 1 otherwise
    Exists { id: String },
    /// Print missing, unmounted or mounted
    State { id: String },
    /// Unmount every layer
    Cleanup,
    /// Check whether the kernel supports ZFS
    Probe,
    /// Print the effective configuration as TOML
    Config,
}
