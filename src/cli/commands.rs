//! CLI command implementations
//!
//! Every command loads and validates the configuration first; nothing is
//! started when validation fails.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::access::PermissionPolicy;
use crate::auth::{TokenConfig, TokenManager};
use crate::http_server::HttpServerConfig;
use crate::master::Master;
use crate::observability::{Event, Logger};
use crate::store::RowId;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Address of one host daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonEndpoint {
    /// Host row id
    pub host: RowId,
    /// `ip:port` of the daemon's JSON-lines listener
    pub address: String,
}

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpServerConfig,

    /// JSON seed of initial rows; an empty store when absent
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    /// HS256 secret for bearer tokens (required)
    pub token_secret: String,

    #[serde(default = "default_token_issuer")]
    pub token_issuer: String,

    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,

    /// Caller-visible timeout of daemon calls
    #[serde(default = "default_daemon_timeout_ms")]
    pub daemon_timeout_ms: u64,

    /// Period of the reconciliation sweep; 0 disables it
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    #[serde(default)]
    pub daemons: Vec<DaemonEndpoint>,

    /// Action name → permission name, applied over the built-in policy
    #[serde(default)]
    pub sensitive_actions: HashMap<String, String>,
}

fn default_token_issuer() -> String {
    "hostmaster".to_string()
}
fn default_token_ttl_minutes() -> i64 {
    60
}
fn default_daemon_timeout_ms() -> u64 {
    30_000
}
fn default_reconcile_interval_secs() -> u64 {
    300
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Configuration with defaults and the given secret, for embedding and tests
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            http: HttpServerConfig::default(),
            seed_file: None,
            token_secret: secret.into(),
            token_issuer: default_token_issuer(),
            token_ttl_minutes: default_token_ttl_minutes(),
            daemon_timeout_ms: default_daemon_timeout_ms(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            daemons: Vec::new(),
            sensitive_actions: HashMap::new(),
        }
    }

    pub fn validate(&self) -> CliResult<()> {
        if self.token_secret.trim().is_empty() {
            return Err(CliError::config_error("token_secret must not be empty"));
        }
        if self.token_ttl_minutes <= 0 {
            return Err(CliError::config_error("token_ttl_minutes must be > 0"));
        }
        if self.daemon_timeout_ms == 0 {
            return Err(CliError::config_error("daemon_timeout_ms must be > 0"));
        }

        let mut hosts = BTreeSet::new();
        for daemon in &self.daemons {
            if !hosts.insert(daemon.host) {
                return Err(CliError::config_error(format!(
                    "host #{} has more than one daemon",
                    daemon.host
                )));
            }
            if daemon.address.trim().is_empty() {
                return Err(CliError::config_error(format!(
                    "daemon address for host #{} is empty",
                    daemon.host
                )));
            }
        }

        self.permission_policy()?;
        Ok(())
    }

    /// The sensitive-action policy with overrides applied
    pub fn permission_policy(&self) -> CliResult<PermissionPolicy> {
        PermissionPolicy::with_overrides(&self.sensitive_actions)
            .map_err(|e| CliError::config_error(format!("sensitive_actions: {}", e)))
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            secret: self.token_secret.clone(),
            ttl: Duration::minutes(self.token_ttl_minutes),
            issuer: self.token_issuer.clone(),
        }
    }

    pub fn daemon_addresses(&self) -> HashMap<RowId, String> {
        self.daemons
            .iter()
            .map(|d| (d.host, d.address.clone()))
            .collect()
    }
}

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
    let result = match cmd {
        Command::Serve { config } => serve(&config),
        Command::CheckConfig { config } => check_config(&config),
        Command::Token { config, username } => token(&config, &username),
        Command::Sweep { config } => sweep(&config),
    };

    if let Err(e) = &result {
        Logger::event(Event::BootFailed, &[("code", e.code_str()), ("reason", e.message())]);
    }
    result
}

fn load(config_path: &Path) -> CliResult<Config> {
    let path = config_path.display().to_string();
    Logger::event(Event::BootStart, &[("config", &path)]);

    let config = Config::load(config_path)?;
    let daemons = config.daemons.len().to_string();
    Logger::event(Event::ConfigLoaded, &[("config", &path), ("daemons", &daemons)]);
    Ok(config)
}

/// Build the master and serve until the HTTP listener fails
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = load(config_path)?;
    let master = Master::build(&config)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        master
            .serve()
            .await
            .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
    })
}

/// Validate configuration and seed without serving
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = load(config_path)?;
    let master = Master::build(&config)?;

    write_response(&json!({
        "http": config.http.socket_addr(),
        "daemons": config.daemons.len(),
        "next_row_id": master.store().next_id(),
    }))
}

/// Issue a bearer token for `username`
///
/// The username must name a principal in the seed; a token for an unknown
/// principal would be rejected on every request anyway.
pub fn token(config_path: &Path, username: &str) -> CliResult<()> {
    let config = load(config_path)?;
    let master = Master::build(&config)?;

    if let Err(e) = master.manager().principal(username) {
        write_error(e.code(), &e.to_string())?;
        return Err(CliError::token_failed(e.to_string()));
    }

    let tokens = TokenManager::new(config.token_config());
    let token = tokens
        .issue(username)
        .map_err(|e| CliError::token_failed(e.to_string()))?;
    write_response(&json!({ "username": username, "token": token }))
}

/// Report what a reconciliation sweep reclaims from the seed
pub fn sweep(config_path: &Path) -> CliResult<()> {
    let config = load(config_path)?;
    let master = Master::build(&config)?;
    let report = master.manager().reconcile()?;
    write_response(&report)
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use tempfile::TempDir;

    fn write_config(temp_dir: &TempDir, config: serde_json::Value) -> PathBuf {
        let config_path = temp_dir.path().join("hostmaster.json");
        fs::write(&config_path, config.to_string()).unwrap();
        config_path
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, json!({"token_secret": "s3cret-value"}));

        let config = Config::load(&path).unwrap();
        assert_eq!(config.daemon_timeout_ms, 30_000);
        assert_eq!(config.reconcile_interval_secs, 300);
        assert_eq!(config.token_issuer, "hostmaster");
        assert!(config.seed_file.is_none());
        assert_eq!(config.http, HttpServerConfig::default());
    }

    #[test]
    fn test_missing_secret_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, json!({"token_secret": "  "}));
        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_duplicate_daemon_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            json!({
                "token_secret": "s3cret-value",
                "daemons": [
                    {"host": 3, "address": "10.0.0.3:4584"},
                    {"host": 3, "address": "10.0.0.4:4584"}
                ]
            }),
        );
        let err = Config::load(&path).unwrap_err();
        assert!(err.message().contains("host #3"));
    }

    #[test]
    fn test_unknown_sensitive_action_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            json!({
                "token_secret": "s3cret-value",
                "sensitive_actions": {"launch_rockets": "bank_accounting"}
            }),
        );
        let err = Config::load(&path).unwrap_err();
        assert!(err.message().contains("launch_rockets"));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = Config::load(&temp_dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_sweep_over_seed() {
        let temp_dir = TempDir::new().unwrap();
        let seed_path = temp_dir.path().join("seed.json");
        fs::write(
            &seed_path,
            json!({"tables": {
                "hosts": [{"id": 1, "name": "web1"}],
                "ip_addresses": [{"id": 2, "host": 1, "address": "10.0.0.9"}]
            }})
            .to_string(),
        )
        .unwrap();
        let path = write_config(
            &temp_dir,
            json!({"token_secret": "s3cret-value", "seed_file": seed_path}),
        );

        sweep(&path).unwrap();
    }

    #[test]
    fn test_token_for_unknown_principal_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, json!({"token_secret": "s3cret-value"}));
        let err = token(&path, "nobody").unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::TokenFailed);
    }
}
