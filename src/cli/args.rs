//! CLI argument definitions using clap
//!
//! Commands:
//! - mastership replay --config <path>
//! - mastership check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Mastership coordinator - per-resource master election for a node cluster
#[derive(Parser, Debug)]
#[command(name = "mastership")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply JSON-lines mastership operations from stdin to an in-process cluster
    Replay {
        /// Path to configuration file
        #[arg(long, default_value = "./mastership.json")]
        config: PathBuf,
    },

    /// Validate a configuration file and exit
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./mastership.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
