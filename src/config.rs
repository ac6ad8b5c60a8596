//! Configuration management for the `TripWeaver` engine
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::TripWeaverError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure for the `TripWeaver` engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripWeaverConfig {
    /// Geocoding API configuration
    pub geocoding: GeocodingConfig,
    /// Routing API configuration
    pub routing: RoutingConfig,
    /// Cache configuration
    pub cache: CacheConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Geocoding API configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// Base URL for the geocoding API
    #[serde(default = "default_geocoding_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_seconds: u32,
    /// Maximum number of retries for failed requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Steady-state request budget; external services limit around 1 req/s
    #[serde(default = "default_requests_per_minute")]
    pub max_requests_per_minute: u32,
}

/// Routing API configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Base URL for the routing API
    #[serde(default = "default_routing_base_url")]
    pub base_url: String,
    /// API key for the routing service (optional; routing is skipped without it)
    pub api_key: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_seconds: u32,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory location
    #[serde(default = "default_cache_location")]
    pub location: String,
    /// Geocode entry TTL in days
    #[serde(default = "default_geocode_ttl_days")]
    pub geocode_ttl_days: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_geocoding_base_url() -> String {
    "https://geocoding-api.open-meteo.com/v1".to_string()
}

fn default_routing_base_url() -> String {
    "https://graphhopper.com/api/1".to_string()
}

fn default_api_timeout() -> u32 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_cache_location() -> String {
    "~/.cache/tripweaver".to_string()
}

fn default_geocode_ttl_days() -> u32 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for TripWeaverConfig {
    fn default() -> Self {
        Self {
            geocoding: GeocodingConfig {
                base_url: default_geocoding_base_url(),
                timeout_seconds: default_api_timeout(),
                max_retries: default_max_retries(),
                max_requests_per_minute: default_requests_per_minute(),
            },
            routing: RoutingConfig {
                base_url: default_routing_base_url(),
                api_key: None,
                timeout_seconds: default_api_timeout(),
            },
            cache: CacheConfig {
                location: default_cache_location(),
                geocode_ttl_days: default_geocode_ttl_days(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
        }
    }
}

impl TripWeaverConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // Add environment variable overrides with TRIPWEAVER_ prefix
        builder = builder.add_source(
            Environment::with_prefix("TRIPWEAVER")
                .separator("_")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: TripWeaverConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tripweaver").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.geocoding.base_url.is_empty() {
            self.geocoding.base_url = default_geocoding_base_url();
        }
        if self.geocoding.timeout_seconds == 0 {
            self.geocoding.timeout_seconds = default_api_timeout();
        }
        if self.geocoding.max_requests_per_minute == 0 {
            self.geocoding.max_requests_per_minute = default_requests_per_minute();
        }
        if self.routing.base_url.is_empty() {
            self.routing.base_url = default_routing_base_url();
        }
        if self.routing.timeout_seconds == 0 {
            self.routing.timeout_seconds = default_api_timeout();
        }
        if self.cache.location.is_empty() {
            self.cache.location = default_cache_location();
        }
        if self.cache.geocode_ttl_days == 0 {
            self.cache.geocode_ttl_days = default_geocode_ttl_days();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.geocoding.timeout_seconds > 300 || self.routing.timeout_seconds > 300 {
            return Err(TripWeaverError::config("API timeout cannot exceed 300 seconds").into());
        }

        if self.geocoding.max_retries > 10 {
            return Err(TripWeaverError::config("API max retries cannot exceed 10").into());
        }

        if self.geocoding.max_requests_per_minute > 600 {
            return Err(
                TripWeaverError::config("Geocoding rate limit cannot exceed 600/min").into(),
            );
        }

        if self.cache.geocode_ttl_days > 365 {
            return Err(
                TripWeaverError::config("Geocode cache TTL cannot exceed 365 days").into(),
            );
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(TripWeaverError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(TripWeaverError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for url in [&self.geocoding.base_url, &self.routing.base_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(TripWeaverError::config(
                    "API base URLs must be valid HTTP or HTTPS URLs",
                )
                .into());
            }
        }

        Ok(())
    }

    /// Create configuration directory if it doesn't exist
    pub fn ensure_config_dir() -> Result<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            let tripweaver_config_dir = config_dir.join("tripweaver");
            std::fs::create_dir_all(&tripweaver_config_dir).with_context(|| {
                format!(
                    "Failed to create config directory: {}",
                    tripweaver_config_dir.display()
                )
            })?;
            Ok(tripweaver_config_dir)
        } else {
            Err(TripWeaverError::config("Unable to determine config directory").into())
        }
    }
}
