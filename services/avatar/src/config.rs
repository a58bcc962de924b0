//! Application Configuration Module
//!
//! Loads the console runtime's settings from environment variables (and a
//! `.env` file when present). Command-line flags override these in `main`.

use sightline_core::backend::AvatarMode;
use sightline_core::config::DEFAULT_GREETING;
use std::env;
use std::path::PathBuf;
use tracing::Level;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000";

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub fallback_image: Option<PathBuf>,
    pub avatar_mode: AvatarMode,
    pub greeting: String,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `SIGHTLINE_BACKEND_URL`: (Optional) Base URL of the API service. Defaults to "http://localhost:3000".
    // *   `FALLBACK_IMAGE`: (Optional) Image analyzed when no camera can be opened.
    // *   `AVATAR_MODE`: (Optional) "full" (xAI chat route) or "custom" (provider-switched route). Defaults to "custom".
    // *   `GREETING`: (Optional) What the avatar says once connected.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend_url =
            lookup("SIGHTLINE_BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let fallback_image = lookup("FALLBACK_IMAGE")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let avatar_mode = match lookup("AVATAR_MODE").map(|m| m.to_lowercase()).as_deref() {
            None | Some("custom") => AvatarMode::Custom,
            Some("full") => AvatarMode::Full,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "AVATAR_MODE",
                    value: other.to_string(),
                });
            }
        };

        let greeting = lookup("GREETING")
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GREETING.to_string());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            backend_url,
            fallback_image,
            avatar_mode,
            greeting,
            log_level,
        })
    }
}
