//! Configuration management for the schedule bot

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::Severity;
use crate::transport::telegram::DEFAULT_API_URL;
use crate::transport::ChatId;

/// Environment variable holding the bot token
pub const BOT_TOKEN_ENV: &str = "BOT_TOKEN";
/// Environment variable holding the operator log chat id
pub const LOG_CHAT_ID_ENV: &str = "TELEGRAM_LOG_CHAT_ID";
/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "SCHEDULE_BOT_CONFIG";

/// Settings of the log forwarding pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryConfig {
    /// Chat that receives log messages (0 disables chat delivery)
    #[serde(default)]
    pub chat_id: ChatId,

    /// Minimum severity forwarded to the chat (default: warning)
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,

    /// Number of recent log lines attached to warnings and errors
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Maximum characters per text message
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Pause between two outbound messages in milliseconds
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// Backoff step after a failed send, multiplied by the attempt number
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_secs: u64,

    /// Upper bound for the backoff
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_secs: u64,

    /// Send attempts per message before it is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Extra seconds added to a flood-control wait
    #[serde(default = "default_flood_padding")]
    pub flood_padding_secs: u64,

    /// Fixed wait between attempts of a manual notification
    #[serde(default = "default_notify_retry_delay")]
    pub notify_retry_delay_secs: u64,

    /// HTTP timeout of a single Bot API request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Bot API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_min_severity() -> Severity {
    Severity::Warning
}

fn default_buffer_capacity() -> usize {
    50
}

fn default_max_message_length() -> usize {
    4000 // Telegram caps messages at 4096
}

fn default_rate_limit_ms() -> u64 {
    1500
}

fn default_retry_base_delay() -> u64 {
    21
}

fn default_retry_max_delay() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_flood_padding() -> u64 {
    2
}

fn default_notify_retry_delay() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            chat_id: 0,
            min_severity: default_min_severity(),
            buffer_capacity: default_buffer_capacity(),
            max_message_length: default_max_message_length(),
            rate_limit_ms: default_rate_limit_ms(),
            retry_base_delay_secs: default_retry_base_delay(),
            retry_max_delay_secs: default_retry_max_delay(),
            max_retries: default_max_retries(),
            flood_padding_secs: default_flood_padding(),
            notify_retry_delay_secs: default_notify_retry_delay(),
            request_timeout_secs: default_request_timeout(),
            api_url: default_api_url(),
        }
    }
}

impl DeliveryConfig {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Telegram bot token
    #[serde(default)]
    pub bot_token: String,

    /// Console filter directive when RUST_LOG is not set (default: "info")
    #[serde(default = "default_console_filter")]
    pub console_filter: String,

    /// Directory for local log files (default: ~/.schedule-bot/logs)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Local log files older than this are removed at startup (default: 7)
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u64,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

fn default_console_filter() -> String {
    "info".to_string()
}

fn default_log_retention_days() -> u64 {
    7
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            console_filter: default_console_filter(),
            log_dir: None,
            log_retention_days: default_log_retention_days(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file (if any) and the environment
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&config_file_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from file, or return default if not found
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Override file values with environment variables
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(token) = lookup(BOT_TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            self.bot_token = token.trim().to_string();
        }
        if let Some(chat_id) = lookup(LOG_CHAT_ID_ENV).filter(|c| !c.trim().is_empty()) {
            self.delivery.chat_id = chat_id
                .trim()
                .parse()
                .with_context(|| format!("{} must be a numeric chat id", LOG_CHAT_ID_ENV))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Chat delivery needs both a token and a target chat
    pub fn chat_delivery_enabled(&self) -> bool {
        !self.bot_token.is_empty() && self.delivery.chat_id != 0
    }

    /// Resolved directory for local log files
    pub fn logs_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(logs_dir)
    }
}

/// Get the base configuration directory (~/.schedule-bot)
/// Falls back to ./.schedule-bot if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| {
        tracing::warn!("Could not determine home directory, using current directory for config");
        PathBuf::from(".schedule-bot")
    })
}

/// Try to get the base configuration directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".schedule-bot"))
}

/// Get the path to the config file, honouring SCHEDULE_BOT_CONFIG
pub fn config_file_path() -> PathBuf {
    match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => config_dir().join("config.toml"),
    }
}

/// Get the path to the default logs directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}
