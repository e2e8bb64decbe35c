//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use mentorpulse_core::CreditPolicy;
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` runs the server on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub log_level: Level,
    pub cors_origin: String,
    pub auth_token_ttl_days: i64,
    pub credit_policy: CreditPolicy,
    pub meeting_base_url: String,
    /// Pushes a WebSocket connection may have waiting before new ones are dropped.
    pub ws_outbox_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            database_max_connections: 5,
            log_level: Level::INFO,
            cors_origin: "http://localhost:3000".to_string(),
            auth_token_ttl_days: 30,
            credit_policy: CreditPolicy::default(),
            meeting_base_url: "https://meet.jit.si".to_string(),
            ws_outbox_capacity: 256,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Self::default();

        // --- Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", defaults.bind_address)?;
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let database_max_connections =
            parse_var("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- HTTP and Auth Settings ---
        let cors_origin = std::env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin);
        let auth_token_ttl_days = parse_var("AUTH_TOKEN_TTL_DAYS", defaults.auth_token_ttl_days)?;
        if auth_token_ttl_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "AUTH_TOKEN_TTL_DAYS".to_string(),
                "must be at least one day".to_string(),
            ));
        }

        // --- Session Lifecycle Settings ---
        let credit_policy = parse_var("SKILL_CREDIT_POLICY", defaults.credit_policy)?;
        let meeting_base_url =
            std::env::var("MEETING_BASE_URL").unwrap_or(defaults.meeting_base_url);

        // --- Real-time Settings ---
        let ws_outbox_capacity = parse_var("WS_OUTBOX_CAPACITY", defaults.ws_outbox_capacity)?;
        if ws_outbox_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "WS_OUTBOX_CAPACITY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            database_max_connections,
            log_level,
            cors_origin,
            auth_token_ttl_days,
            credit_policy,
            meeting_base_url,
            ws_outbox_capacity,
        })
    }
}

/// Reads `name` and parses it, falling back to `default` when it is unset.
fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
