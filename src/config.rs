//! Configuration loading and management for briefbot.
//!
//! Settings come from `briefbot.toml` (current directory or
//! `~/.config/briefbot/`), with every section falling back to defaults when
//! absent. Credentials are only ever read from the environment; a local `.env`
//! is loaded before startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("missing required credential: {0} is not set")]
    MissingCredential(&'static str),
}

/// Summarizer (LLM) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model identifier (e.g., "gemini-2.0-flash")
    #[serde(default = "default_model")]
    pub model: String,
    /// System persona prepended to every prompt
    #[serde(default = "default_persona")]
    pub persona: String,
}

/// Credentials, loaded from the environment only (never from the config file)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(skip)]
    pub telegram_token: Option<String>,
    #[serde(skip)]
    pub gemini_key: Option<String>,
}

/// Free-tier policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Summaries a non-premium user gets per UTC day
    #[serde(default = "default_free_per_day")]
    pub free_per_day: u64,
}

/// Premium purchase policy; provider credentials are environment only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Days of premium granted per completed payment
    #[serde(default = "default_grant_days")]
    pub grant_days: i64,
    /// Price of one grant, in USD
    #[serde(default = "default_price_usd")]
    pub price_usd: f64,
    #[serde(skip)]
    pub api_base: Option<String>,
    #[serde(skip)]
    pub shop_id: Option<String>,
    #[serde(skip)]
    pub api_key: Option<String>,
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base path for data storage
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_persona() -> String {
    "You are a careful assistant that writes faithful, readable summaries.".to_string()
}

fn default_free_per_day() -> u64 {
    5
}

fn default_grant_days() -> i64 {
    30
}

fn default_price_usd() -> f64 {
    5.0
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            persona: default_persona(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_per_day: default_free_per_day(),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            grant_days: default_grant_days(),
            price_usd: default_price_usd(),
            api_base: None,
            shop_id: None,
            api_key: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    /// when no config file exists (the bot is fully configurable through the
    /// environment).
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                let mut config = Config::default();
                apply_env(&mut config);
                Ok(config)
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        apply_env(&mut config);
        Ok(config)
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        // Check current directory first
        let local_config = PathBuf::from("briefbot.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        // Check home directory
        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config").join("briefbot").join("briefbot.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// Fail fast when a credential the bot cannot run without is missing.
    /// Payment credentials are deliberately not checked here; their absence
    /// only disables the purchase commands.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.telegram_token.is_none() {
            return Err(ConfigError::MissingCredential("TELEGRAM_BOT_TOKEN"));
        }
        if self.api.gemini_key.is_none() {
            return Err(ConfigError::MissingCredential("GEMINI_API_KEY"));
        }
        Ok(())
    }

    pub fn telegram_token(&self) -> Result<&str, ConfigError> {
        self.api
            .telegram_token
            .as_deref()
            .ok_or(ConfigError::MissingCredential("TELEGRAM_BOT_TOKEN"))
    }

    pub fn gemini_key(&self) -> Result<&str, ConfigError> {
        self.api
            .gemini_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential("GEMINI_API_KEY"))
    }
}

fn apply_env(config: &mut Config) {
    if let Some(token) = env_nonempty("TELEGRAM_BOT_TOKEN") {
        config.api.telegram_token = Some(token);
    }
    if let Some(key) = env_nonempty("GEMINI_API_KEY") {
        config.api.gemini_key = Some(key);
    }
    if let Some(base) = env_nonempty("PAYMENT_API_BASE") {
        config.payment.api_base = Some(base);
    }
    if let Some(shop_id) = env_nonempty("PAYMENT_SHOP_ID") {
        config.payment.shop_id = Some(shop_id);
    }
    if let Some(key) = env_nonempty("PAYMENT_API_KEY") {
        config.payment.api_key = Some(key);
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Err(_) => None,
    }
}
