#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::error::{GastownError, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = ".gastown/config.toml";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://.gastown/gastown.db";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: String,
    pub api_token: Option<String>,
    pub scheduler: SchedulerSettings,
    pub sandbox: SandboxCommands,
    pub git: GitCommands,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            api_token: None,
            scheduler: SchedulerSettings::default(),
            sandbox: SandboxCommands::default(),
            git: GitCommands::default(),
        }
    }
}

/// Timer and liveness policy shared by every rig actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSettings {
    /// Delay used when a mutation arms the timer for "soon".
    pub arm_delay_ms: u64,
    /// Re-arm interval while the rig has live agents or queued work.
    pub active_interval_ms: u64,
    /// Re-arm interval for a quiescent rig.
    pub idle_interval_ms: u64,
    /// Agents silent for longer than this are declared dead.
    pub heartbeat_timeout_ms: u64,
    /// Upper bound on one sandbox or git call.
    pub external_call_timeout_ms: u64,
    /// Dispatch attempts after which the witness files an escalation.
    pub stuck_dispatch_threshold: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            arm_delay_ms: 5_000,
            active_interval_ms: 30_000,
            idle_interval_ms: 300_000,
            heartbeat_timeout_ms: 300_000,
            external_call_timeout_ms: 30_000,
            stuck_dispatch_threshold: 5,
        }
    }
}

impl SchedulerSettings {
    #[must_use]
    pub const fn arm_delay(&self) -> Duration {
        Duration::from_millis(self.arm_delay_ms)
    }

    #[must_use]
    pub const fn active_interval(&self) -> Duration {
        Duration::from_millis(self.active_interval_ms)
    }

    #[must_use]
    pub const fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    #[must_use]
    pub const fn external_call_timeout(&self) -> Duration {
        Duration::from_millis(self.external_call_timeout_ms)
    }

    #[must_use]
    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.heartbeat_timeout_ms).unwrap_or(i64::MAX))
    }

    /// # Errors
    /// Returns `ConfigError` for zero intervals or an active interval longer than the idle one.
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("arm_delay_ms", self.arm_delay_ms),
            ("active_interval_ms", self.active_interval_ms),
            ("idle_interval_ms", self.idle_interval_ms),
            ("heartbeat_timeout_ms", self.heartbeat_timeout_ms),
            ("external_call_timeout_ms", self.external_call_timeout_ms),
        ];
        if let Some((name, _)) = named.iter().find(|(_, value)| *value == 0) {
            return Err(GastownError::ConfigError(format!(
                "scheduler.{name} must be greater than zero"
            )));
        }
        if self.active_interval_ms > self.idle_interval_ms {
            return Err(GastownError::ConfigError(
                "scheduler.active_interval_ms must not exceed scheduler.idle_interval_ms"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Argv templates for the sandbox collaborator. Empty means no execution target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxCommands {
    pub start_cmd: String,
    pub stop_cmd: String,
    pub message_cmd: String,
    pub status_cmd: String,
    pub stream_ticket_cmd: String,
}

/// Argv templates for the git-hosting collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitCommands {
    pub merge_cmd: String,
    pub push_cmd: String,
}

impl Default for GitCommands {
    fn default() -> Self {
        Self {
            merge_cmd: String::new(),
            push_cmd: "git push {git_url} {branch}".to_string(),
        }
    }
}

/// Load configuration from `path` (or the default location), then apply env overrides.
///
/// # Errors
/// Returns `ConfigError` when the file is unreadable, malformed or fails validation.
pub async fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config_path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let file_config = read_config_file(&config_path).await?;
    let config = apply_env_overrides(file_config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

async fn read_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| GastownError::ConfigError(format!("Failed to read config: {e}")))?;
    parse_config_content(&content)
}

/// # Errors
/// Returns `ConfigError` when the TOML is malformed or has unknown keys.
pub fn parse_config_content(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content)
        .map_err(|e| GastownError::ConfigError(format!("Failed to parse config: {e}")))?;
    config.database_url = expand_env_vars(&config.database_url);
    Ok(config)
}

pub fn apply_env_overrides<F>(mut config: Config, env_lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| {
        env_lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(url) = non_empty("GASTOWN_DATABASE_URL").or_else(|| non_empty("DATABASE_URL")) {
        config.database_url = url;
    }
    if let Some(addr) = non_empty("GASTOWN_LISTEN_ADDR") {
        config.listen_addr = addr;
    }
    if let Some(token) = non_empty("GASTOWN_API_TOKEN") {
        config.api_token = Some(token);
    }
    config
}

impl Config {
    /// # Errors
    /// Returns `ConfigError` for an unparsable listen address or bad scheduler settings.
    pub fn validate(&self) -> Result<()> {
        self.listen_socket_addr()?;
        self.scheduler.validate()
    }

    /// # Errors
    /// Returns `ConfigError` when `listen_addr` is not a socket address.
    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            GastownError::ConfigError(format!("Invalid listen_addr '{}': {e}", self.listen_addr))
        })
    }
}

fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_part = &result[start + 2..start + end];
        let (var_name, default) = var_part.split_once(":-").unwrap_or((var_part, ""));
        let value = std::env::var(var_name).unwrap_or_else(|_| default.to_string());
        result.replace_range(start..=(start + end), &value);
    }
    result
}

/// Database URL with any password replaced, safe for logs.
#[must_use]
pub fn mask_database_url(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("********"));
            }
            parsed.to_string()
        }
        Err(_) => "<invalid-database-url>".to_string(),
    }
}
