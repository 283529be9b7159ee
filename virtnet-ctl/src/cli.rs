//! Command-line argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// virtnetctl - inspect and repair VM network state on a node
#[derive(Parser, Debug)]
#[command(name = "virtnetctl")]
#[command(about = "Inspect and repair VM network state on a node")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, env = "VIRTNET_CONFIG")]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Root of the persistent network cache
    #[arg(long, env = "VIRTNET_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the configuration state of networks
    State {
        /// VM UID
        #[arg(long)]
        uid: String,
        /// Network names
        #[arg(required = true)]
        networks: Vec<String>,
    },

    /// Reset a network to pending so the next setup configures it again
    Reset {
        /// VM UID
        #[arg(long)]
        uid: String,
        /// Network name
        network: String,
    },

    /// Run one status reconciliation and print the interfaces as JSON
    Status {
        /// VM instance as JSON
        #[arg(long)]
        vmi: PathBuf,
        /// Domain as JSON
        #[arg(long)]
        domain: Option<PathBuf>,
    },

    /// Delete all cached network state of a VM
    Teardown {
        /// VM UID
        #[arg(long)]
        uid: String,
    },
}
