//! CLI command implementations

use std::path::Path;

use serde_json::{Map, Value};
use tracing::info;

use crate::auth::{hash_password, JwtManager, PasswordPolicy};
use crate::config::AppConfig;
use crate::http_server::{AppState, HttpServer};
use crate::logging;

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config } => serve(config.as_deref()),
        Command::HashPassword { password } => {
            println!("{}", hash_password_command(&password)?);
            Ok(())
        }
        Command::IssueToken {
            identity,
            claims,
            config,
        } => {
            println!("{}", issue_token(&identity, &claims, config.as_deref())?);
            Ok(())
        }
    }
}

/// Load configuration, install logging and serve until interrupted
pub fn serve(config_path: Option<&Path>) -> CliResult<()> {
    let config = AppConfig::load(config_path)?;
    logging::init(&config);

    let server = HttpServer::new(AppState::in_memory(config))?;
    info!(addr = %server.socket_addr(), "Starting restbase");

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::serve_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        server
            .start()
            .await
            .map_err(|e| CliError::serve_failed(format!("HTTP server failed: {}", e)))
    })
}

/// Hash `password` after checking it against the default policy
pub fn hash_password_command(password: &str) -> CliResult<String> {
    PasswordPolicy::default().validate(password)?;
    Ok(hash_password(password)?)
}

/// Sign a token for `identity` with the configured secret and TTL
pub fn issue_token(identity: &str, claims: &[String], config_path: Option<&Path>) -> CliResult<String> {
    if identity.trim().is_empty() {
        return Err(CliError::usage("identity must not be empty"));
    }
    let config = AppConfig::load(config_path)?;
    let extra = parse_claims(claims)?;
    let jwt = JwtManager::new(config.jwt.to_jwt_config());
    Ok(jwt.issue(identity, extra)?)
}

/// Parse `key=value` pairs; values that parse as JSON keep their type
pub fn parse_claims(claims: &[String]) -> CliResult<Map<String, Value>> {
    let mut map = Map::new();
    for claim in claims {
        let (key, raw) = claim
            .split_once('=')
            .ok_or_else(|| CliError::usage(format!("claim '{}' is not KEY=VALUE", claim)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::usage(format!("claim '{}' has an empty key", claim)));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(map)
}
