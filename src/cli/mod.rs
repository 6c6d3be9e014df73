//! CLI module for restbase
//!
//! Provides command-line interface for:
//! - serve: Load configuration and run the HTTP server
//! - hash-password: Produce a stored password hash
//! - issue-token: Mint an access token with the configured secret

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{hash_password_command, issue_token, parse_claims, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
