use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use drill_types::UserId;

/// Environment variable holding the Telegram bot token.
pub const ENV_BOT_TOKEN: &str = "TELEGRAM_API_TOKEN";
/// Environment variable holding the administrator's user id.
pub const ENV_ADMIN_ID: &str = "BOT_ADMIN_ID";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value in environment variable {0}")]
    InvalidEnv(&'static str),
}

/// Telegram connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
}

/// Where the state snapshot lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file. Defaults to `~/.drill/drill.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Check-in behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksConfig {
    /// Hour of day used by the "daily" and "weekly" schedule shortcuts.
    #[serde(default = "default_daily_hour")]
    pub daily_hour: u32,
    /// Largest score range the add-goal dialog accepts.
    #[serde(default = "default_max_score_range")]
    pub max_score_range: u32,
    /// Open check-in prompts older than this are discarded at startup.
    /// Absent means prompts never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_ttl_days: Option<u32>,
}

fn default_daily_hour() -> u32 {
    11
}

fn default_max_score_range() -> u32 {
    60
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            daily_hour: default_daily_hour(),
            max_score_range: default_max_score_range(),
            token_ttl_days: None,
        }
    }
}

/// Top-level drill configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrillConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// User seeded as authorized administrator on first start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<UserId>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub checks: ChecksConfig,
    /// Seconds between periodic state saves.
    #[serde(default = "default_autosave_secs")]
    pub autosave_secs: u64,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

fn default_autosave_secs() -> u64 {
    60
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            admin_id: None,
            storage: StorageConfig::default(),
            checks: ChecksConfig::default(),
            autosave_secs: default_autosave_secs(),
            log_filter: None,
        }
    }
}

impl DrillConfig {
    /// Override file settings from environment variables.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_BOT_TOKEN).filter(|t| !t.trim().is_empty()) {
            self.telegram.bot_token = Some(token.trim().to_string());
        }
        if let Some(id) = lookup(ENV_ADMIN_ID) {
            let id = id
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv(ENV_ADMIN_ID))?;
            self.admin_id = Some(id);
        }
        Ok(())
    }

    pub fn bot_token(&self) -> Result<&str, ConfigError> {
        self.telegram
            .bot_token
            .as_deref()
            .ok_or(ConfigError::Missing("telegram.bot_token"))
    }

    pub fn admin_id(&self) -> Result<UserId, ConfigError> {
        self.admin_id.ok_or(ConfigError::Missing("admin_id"))
    }

    /// Resolved database path.
    pub fn storage_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("drill.db")),
        }
    }
}

/// Resolve the drill config directory (~/.drill/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".drill"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.drill/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, then apply environment overrides.
pub fn load_config() -> Result<DrillConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    let mut config = load_config_from(&path)?;
    config.apply_env_from(|key| std::env::var(key).ok())?;
    Ok(config)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<DrillConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(DrillConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: DrillConfig = json5::from_str(&content)?;
    Ok(config)
}

/// Ensure the config directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}
