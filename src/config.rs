//! Configuration management for askrelay.
//!
//! Loads settings from `~/.config/askrelay/config.toml` with environment
//! overrides. A missing file is not an error; defaults apply.

use crate::error::ConfigError;
use crate::registry::{ModelRegistry, ModelSpec};
use crate::roles::RoleStore;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_ASK_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_STATUS_TIMEOUT_SECS: u64 = 10;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub app: AppConfig,
    /// Model table; empty means the built-in registry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_ask_timeout")]
    pub ask_timeout_secs: u64,
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: u64,
}

/// Static role assignment. Ids may be written as strings or integers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AccessConfig {
    #[serde(default, deserialize_with = "deserialize_ids")]
    pub admins: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_ids")]
    pub premium: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub admin_chat: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_verbosity")]
    pub log_verbosity: LogVerbosity,
    /// Prefix replies from the default model with its display name too.
    #[serde(default = "default_true")]
    pub reply_header: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogVerbosity {
    Minimal,
    #[default]
    Compact,
    Verbose,
}

// Default value functions
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { DEFAULT_PORT }
fn default_base_url() -> String { crate::upstream::UpstreamClient::DEFAULT_BASE_URL.to_string() }
fn default_ask_timeout() -> u64 { DEFAULT_ASK_TIMEOUT_SECS }
fn default_status_timeout() -> u64 { DEFAULT_STATUS_TIMEOUT_SECS }
fn default_verbosity() -> LogVerbosity { LogVerbosity::Compact }
fn default_true() -> bool { true }

fn deserialize_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Int(i64),
        Str(String),
    }

    let ids = Vec::<Id>::deserialize(deserializer)?;
    Ok(ids
        .into_iter()
        .map(|id| match id {
            Id::Int(n) => n.to_string(),
            Id::Str(s) => s.trim().to_string(),
        })
        .collect())
}

fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ask_timeout_secs: default_ask_timeout(),
            status_timeout_secs: default_status_timeout(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_verbosity: default_verbosity(),
            reply_header: default_true(),
        }
    }
}

impl UpstreamConfig {
    pub fn ask_timeout(&self) -> Duration {
        Duration::from_secs(self.ask_timeout_secs.max(1))
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs.max(1))
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("askrelay")
            .join("config.toml")
    }

    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from a specific path.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("ASKRELAY_UPSTREAM_URL") {
            self.upstream.base_url = url;
        }
        if let Ok(val) = std::env::var("ASKRELAY_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("ASKRELAY_ASK_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.upstream.ask_timeout_secs = secs;
            }
        }
        if let Ok(ids) = std::env::var("ASKRELAY_ADMIN_IDS") {
            self.access.admins = parse_id_list(&ids);
        }
        if let Ok(ids) = std::env::var("ASKRELAY_PREMIUM_IDS") {
            self.access.premium = parse_id_list(&ids);
        }
        if let Ok(url) = std::env::var("ASKRELAY_ADMIN_WEBHOOK") {
            self.notify.webhook_url = Some(url);
        }
        if let Ok(chat) = std::env::var("ASKRELAY_ADMIN_CHAT") {
            self.notify.admin_chat = Some(chat);
        }
        self
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Model table declared in config, or the built-in one.
    pub fn registry(&self) -> Result<ModelRegistry, ConfigError> {
        if self.models.is_empty() {
            Ok(ModelRegistry::builtin())
        } else {
            ModelRegistry::from_specs(self.models.clone())
        }
    }

    pub fn role_store(&self) -> RoleStore {
        RoleStore::new(self.access.admins.iter().cloned(), self.access.premium.iter().cloned())
    }
}
