//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - config: print the effective configuration
//! - delays: preview the backoff schedule
//! - scan: test a log gate against a log file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Retrigger - automatic retries for failed CI builds
#[derive(Parser, Debug)]
#[command(name = "retrigger")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective configuration as YAML
    Config,

    /// Preview the delay before each retry
    Delays {
        /// Number of retries to show
        #[arg(short = 'n', long, default_value_t = 5)]
        attempts: u32,
    },

    /// Test a log gate against a log file
    Scan {
        /// Log file to scan
        log: PathBuf,

        /// Pattern to look for (defaults to request.pattern)
        #[arg(short, long)]
        pattern: Option<String>,

        /// Scan timeout in milliseconds (defaults to scan.timeout-ms)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
}
