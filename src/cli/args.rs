//! CLI argument definitions using clap
//!
//! Commands:
//! - hostmaster serve --config <path>
//! - hostmaster check-config --config <path>
//! - hostmaster token --config <path> <username>
//! - hostmaster sweep --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hostmaster - master server for multi-tenant hosting automation
#[derive(Parser, Debug)]
#[command(name = "hostmaster")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the seed and serve the administrative API
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./hostmaster.json")]
        config: PathBuf,
    },

    /// Validate configuration and seed, then exit
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./hostmaster.json")]
        config: PathBuf,
    },

    /// Issue a bearer token for a principal
    Token {
        /// Path to configuration file
        #[arg(long, default_value = "./hostmaster.json")]
        config: PathBuf,

        /// Principal username (operator or administrator)
        username: String,
    },

    /// Run one reconciliation sweep over the seed and print what it reclaims
    Sweep {
        /// Path to configuration file
        #[arg(long, default_value = "./hostmaster.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
