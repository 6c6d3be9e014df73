//! CLI argument definitions using clap
//!
//! Commands:
//! - restbase serve [--config <path>]
//! - restbase hash-password <password>
//! - restbase issue-token <identity> [--claim k=v]... [--config <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// restbase - CRUD resources over HTTP with a uniform response envelope
#[derive(Parser, Debug)]
#[command(name = "restbase")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server
    Serve {
        /// Path to a JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the Argon2 hash of a password
    HashPassword {
        password: String,
    },

    /// Print an access token for an identity
    IssueToken {
        identity: String,

        /// Extra claim as key=value; repeatable
        #[arg(long = "claim", value_name = "KEY=VALUE")]
        claims: Vec<String>,

        /// Path to a JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["restbase", "serve", "--config", "app.json"]).unwrap();
        match cli.command {
            Command::Serve { config } => assert_eq!(config, Some(PathBuf::from("app.json"))),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_issue_token_claims() {
        let cli = Cli::try_parse_from([
            "restbase",
            "issue-token",
            "u-1",
            "--claim",
            "role=admin",
            "--claim",
            "tenant=7",
        ])
        .unwrap();
        match cli.command {
            Command::IssueToken { identity, claims, config } => {
                assert_eq!(identity, "u-1");
                assert_eq!(claims, vec!["role=admin", "tenant=7"]);
                assert!(config.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_hash_password_requires_argument() {
        assert!(Cli::try_parse_from(["restbase", "hash-password"]).is_err());
    }
}
