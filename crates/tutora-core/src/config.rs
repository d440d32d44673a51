//! Application configuration
//!
//! Loaded with the `config` crate from built-in defaults, optional
//! `config/default` and `config/{RUN_MODE}` files, then `TUTORA__*`
//! environment variables.

use crate::error::AppError;
use crate::models::SessionType;
use crate::AppResult;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub stars: StarsConfig,
    #[serde(default)]
    pub video: VideoConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Comma-separated origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_timeout() -> u64 {
    30
}

fn default_cors_origins() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply embedded migrations at startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

/// Authentication configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret
    pub jwt_secret: String,

    /// JWT token expiration in minutes
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_minutes: i64,
}

fn default_jwt_expiration() -> i64 {
    1440 // 24 hours
}

/// Booking and series rules
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulingConfig {
    /// IANA zone used to turn a booking's date + wall-clock time into instants
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Capacity of a group series created by accepting a booking
    #[serde(default = "default_group_capacity")]
    pub default_group_capacity: i32,

    /// Minimum length of a decline reason
    #[serde(default = "default_min_decline_reason")]
    pub min_decline_reason_len: usize,
}

fn default_timezone() -> String {
    "Africa/Algiers".to_string()
}

fn default_group_capacity() -> i32 {
    10
}

fn default_min_decline_reason() -> usize {
    10
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            default_group_capacity: default_group_capacity(),
            min_decline_reason_len: default_min_decline_reason(),
        }
    }
}

impl SchedulingConfig {
    /// Resolve the configured zone
    pub fn tz(&self) -> AppResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| AppError::Config(format!("invalid timezone '{}': {}", self.timezone, e)))
    }
}

/// Flat star price table (DZD per accepted enrollment)
#[derive(Debug, Deserialize, Clone)]
pub struct StarsConfig {
    #[serde(default = "default_group_cost")]
    pub group_cost: Decimal,

    #[serde(default = "default_individual_cost")]
    pub individual_cost: Decimal,
}

fn default_group_cost() -> Decimal {
    Decimal::from(50)
}

fn default_individual_cost() -> Decimal {
    Decimal::from(100)
}

impl Default for StarsConfig {
    fn default() -> Self {
        Self {
            group_cost: default_group_cost(),
            individual_cost: default_individual_cost(),
        }
    }
}

impl StarsConfig {
    /// Cost of one star for a session type
    pub fn cost_for(&self, session_type: SessionType) -> Decimal {
        match session_type {
            SessionType::Group => self.group_cost,
            SessionType::Individual => self.individual_cost,
        }
    }
}

/// Video room provider
#[derive(Debug, Deserialize, Clone)]
pub struct VideoConfig {
    /// When false, joins are answered by an in-process provider
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_video_timeout")]
    pub timeout_ms: u64,
}

fn default_video_timeout() -> u64 {
    5000
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            api_key: String::new(),
            timeout_ms: default_video_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("server.timeout_secs", 30)?
            .set_default("server.cors_origins", "http://localhost:3000")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.run_migrations", true)?
            .set_default("auth.jwt_expiration_minutes", 1440)?
            .set_default("scheduling.timezone", "Africa/Algiers")?
            .set_default("scheduling.default_group_capacity", 10)?
            .set_default("scheduling.min_decline_reason_len", 10)?
            .set_default("stars.group_cost", 50)?
            .set_default("stars.individual_cost", 100)?
            .set_default("video.enabled", false)?
            .set_default("video.timeout_ms", 5000)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with TUTORA_ prefix
            .add_source(
                Environment::with_prefix("TUTORA")
                    .separator("__")
                    .try_parsing(true),
            )
            // Support legacy environment variables
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("TUTORA").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Reject settings that would only fail later at request time
    pub fn validate(&self) -> AppResult<()> {
        self.scheduling.tz()?;
        if self.scheduling.default_group_capacity < 1 {
            return Err(AppError::Config(
                "scheduling.default_group_capacity must be at least 1".to_string(),
            ));
        }
        if self.stars.group_cost <= Decimal::ZERO || self.stars.individual_cost <= Decimal::ZERO {
            return Err(AppError::Config("star costs must be positive".to_string()));
        }
        if self.auth.jwt_secret.len() < 16 {
            return Err(AppError::Config(
                "auth.jwt_secret must be at least 16 characters".to_string(),
            ));
        }
        Ok(())
    }
}
