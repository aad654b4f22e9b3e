//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;
use url::Url;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid { field: field.into(), reason: e.to_string() })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid { field: field.into(), reason: format!("unsupported scheme `{other}`") }),
    }
}

const MAX_POLL_MS: u64 = 3_600_000;

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `api_base` or `frontend_url` is not an absolute http(s) URL
    /// - a poll interval is zero, the backoff factor is below 1.0,
    ///   or `poll_max_ms` is below `content_poll_ms` or above one hour
    /// - `token_retry_attempts` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        check_http_url("api_base", &self.api_base)?;
        check_http_url("frontend_url", &self.frontend_url)?;

        if self.content_poll_ms == 0 {
            return Err(invalid("content_poll_ms", "must be greater than 0"));
        }
        if self.popup_poll_ms == 0 {
            return Err(invalid("popup_poll_ms", "must be greater than 0"));
        }
        if !self.poll_backoff_factor.is_finite() || self.poll_backoff_factor < 1.0 {
            return Err(invalid("poll_backoff_factor", "must be a finite number >= 1.0"));
        }
        if self.poll_max_ms < self.content_poll_ms {
            return Err(invalid("poll_max_ms", "must not be below content_poll_ms"));
        }
        if self.poll_max_ms > MAX_POLL_MS {
            return Err(invalid("poll_max_ms", "must not exceed 1 hour (3600000ms)"));
        }

        if self.token_retry_attempts == 0 {
            return Err(invalid("token_retry_attempts", "must be at least 1"));
        }

        if self.background_sync_interval_ms > 0 && self.background_sync_interval_ms < 1_000 {
            tracing::warn!(
                interval_ms = self.background_sync_interval_ms,
                "background_sync_interval_ms below one second will message every frontend tab constantly"
            );
        }

        Ok(())
    }
}
