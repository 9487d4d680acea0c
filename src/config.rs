use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::HeaderValue;

/// Server configuration from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub data_file: PathBuf,
    /// Include internal error detail in 500 responses.
    pub development: bool,
    /// Single allowed CORS origin. `None` allows any origin.
    pub cors_origin: Option<HeaderValue>,
}

impl Config {
    /// Load configuration from environment variables.
    /// DATA_FILE defaults to "markers.json", LISTEN_ADDR to "0.0.0.0:3001".
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3001".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("LISTEN_ADDR", "must be a valid socket address"))?;

        let data_file = std::env::var("DATA_FILE")
            .unwrap_or_else(|_| "markers.json".to_string())
            .into();

        let development = std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("development"))
            .unwrap_or(false);

        let cors_origin = match std::env::var("CORS_ORIGIN") {
            Ok(s) if !s.trim().is_empty() => Some(
                HeaderValue::from_str(s.trim())
                    .map_err(|_| ConfigError::Invalid("CORS_ORIGIN", "must be a valid origin"))?,
            ),
            _ => None,
        };

        Ok(Config {
            listen_addr,
            data_file,
            development,
            cors_origin,
        })
    }

    /// Create a test configuration.
    pub fn for_testing(data_file: impl Into<PathBuf>) -> Self {
        Config {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            data_file: data_file.into(),
            development: true,
            cors_origin: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}
