//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PRICEWATCH_*)
//! 2. TOML config file (if PRICEWATCH_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PRICEWATCH_*)
/// 2. TOML config file (if PRICEWATCH_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the aggregation and tracking API.
    ///
    /// Set via PRICEWATCH_API_BASE environment variable.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Origin of the web dashboard whose tabs and cookies carry the session.
    ///
    /// Set via PRICEWATCH_FRONTEND_URL environment variable.
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    /// Path to the SQLite storage database.
    ///
    /// Set via PRICEWATCH_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Scrapes run upstream on every request, so this is generous.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Image reference used when a source reports none.
    #[serde(default = "default_placeholder_image")]
    pub placeholder_image: String,

    /// Base interval of the content agent's session poll.
    #[serde(default = "default_content_poll_ms")]
    pub content_poll_ms: u64,

    /// Interval of the popup's discovery loop.
    #[serde(default = "default_popup_poll_ms")]
    pub popup_poll_ms: u64,

    /// Multiplier applied to the poll interval after an idle cycle.
    ///
    /// `1.0` keeps the interval fixed.
    #[serde(default = "default_backoff_factor")]
    pub poll_backoff_factor: f64,

    /// Ceiling for a backed-off poll interval.
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,

    /// Delay between a frontend tab finishing its load and the background
    /// asking it for a token.
    #[serde(default = "default_background_sync_delay_ms")]
    pub background_sync_delay_ms: u64,

    /// Period of the background's sync from open frontend tabs. `0` disables it.
    #[serde(default = "default_background_sync_interval_ms")]
    pub background_sync_interval_ms: u64,

    /// Attempts made to find a token before the tracked-items view gives up.
    #[serde(default = "default_token_retry_attempts")]
    pub token_retry_attempts: u32,

    /// Pause between those attempts.
    #[serde(default = "default_token_retry_delay_ms")]
    pub token_retry_delay_ms: u64,
}

fn default_api_base() -> String {
    "http://localhost:5000/api".into()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./pricewatch.sqlite")
}

fn default_user_agent() -> String {
    "pricewatch/0.1".into()
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_placeholder_image() -> String {
    "/modern-tech-product.png".into()
}

fn default_content_poll_ms() -> u64 {
    1_000
}

fn default_popup_poll_ms() -> u64 {
    3_000
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_poll_max_ms() -> u64 {
    30_000
}

fn default_background_sync_delay_ms() -> u64 {
    1_000
}

fn default_background_sync_interval_ms() -> u64 {
    30_000
}

fn default_token_retry_attempts() -> u32 {
    3
}

fn default_token_retry_delay_ms() -> u64 {
    500
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            frontend_url: default_frontend_url(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            placeholder_image: default_placeholder_image(),
            content_poll_ms: default_content_poll_ms(),
            popup_poll_ms: default_popup_poll_ms(),
            poll_backoff_factor: default_backoff_factor(),
            poll_max_ms: default_poll_max_ms(),
            background_sync_delay_ms: default_background_sync_delay_ms(),
            background_sync_interval_ms: default_background_sync_interval_ms(),
            token_retry_attempts: default_token_retry_attempts(),
            token_retry_delay_ms: default_token_retry_delay_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn content_poll_interval(&self) -> Duration {
        Duration::from_millis(self.content_poll_ms)
    }

    pub fn popup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.popup_poll_ms)
    }

    pub fn poll_max_interval(&self) -> Duration {
        Duration::from_millis(self.poll_max_ms)
    }

    pub fn background_sync_delay(&self) -> Duration {
        Duration::from_millis(self.background_sync_delay_ms)
    }

    /// None when periodic background sync is disabled.
    pub fn background_sync_interval(&self) -> Option<Duration> {
        (self.background_sync_interval_ms > 0).then(|| Duration::from_millis(self.background_sync_interval_ms))
    }

    pub fn token_retry_delay(&self) -> Duration {
        Duration::from_millis(self.token_retry_delay_ms)
    }

    /// The frontend origin as a parsed URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `frontend_url` does not parse.
    pub fn frontend_origin(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.frontend_url)
            .map_err(|e| ConfigError::Invalid { field: "frontend_url".into(), reason: e.to_string() })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PRICEWATCH_`
    /// 2. TOML file from `PRICEWATCH_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PRICEWATCH_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PRICEWATCH_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
