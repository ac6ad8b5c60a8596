//! Error types and handling for the `TripWeaver` engine

use thiserror::Error;

/// Main error type for the `TripWeaver` engine
#[derive(Error, Debug)]
pub enum TripWeaverError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// API communication errors
    #[error("API error: {message}")]
    Api { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Strict-budget rejection; the one blocking error of the engine
    #[error("Budget limit exceeded: {message}")]
    Budget { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// General application errors
    #[error("Application error: {message}")]
    General { message: String },
}

impl TripWeaverError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Strict-budget rejection with the numbers the user needs to see
    pub fn budget_exceeded(current_total: f64, addition: f64, limit: f64) -> Self {
        Self::Budget {
            message: format!(
                "adding {addition:.0} to the current total of {current_total:.0} would exceed the trip budget of {limit:.0}"
            ),
        }
    }

    /// Create a new general error
    pub fn general<S: Into<String>>(message: S) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            TripWeaverError::Config { .. } => {
                "Configuration error. Please check your config file and API keys.".to_string()
            }
            TripWeaverError::Api { .. } => {
                "Unable to connect to external services. Please check your internet connection."
                    .to_string()
            }
            TripWeaverError::Validation { message } => {
                format!("Invalid input: {message}")
            }
            TripWeaverError::Cache { .. } => {
                "Cache operation failed. You may need to clear your cache.".to_string()
            }
            TripWeaverError::Budget { message } => {
                format!("Budget limit exceeded: {message}")
            }
            TripWeaverError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
            TripWeaverError::General { message } => message.clone(),
        }
    }
}
