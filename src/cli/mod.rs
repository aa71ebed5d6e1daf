//! CLI module for hostmaster
//!
//! Provides command-line interface for:
//! - serve: Load the seed and serve the administrative API
//! - check-config: Validate configuration and seed
//! - token: Issue a bearer token
//! - sweep: One reconciliation sweep over the seed

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, run, run_command, serve, sweep, token, Config, DaemonEndpoint};
pub use errors::{CliError, CliErrorCode, CliResult};
