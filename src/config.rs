//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::payments::circuit_breaker::CircuitBreakerConfig;
use crate::payments::client::RetryPolicy;
use crate::payments::providers::stripe::StripeConfig;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreBackend,
    /// Present only when `store` is `Postgres`.
    pub database: Option<DatabaseConfig>,
    pub gateway: GatewayConfig,
    pub resilience: ResilienceConfig,
    pub webhook: WebhookConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: u64, // seconds
}

/// Where payments are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64, // seconds
}

/// Which gateway transport to wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    Stripe,
    Mock,
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub kind: GatewayKind,
    /// Present only when `kind` is `Stripe`.
    pub stripe: Option<StripeConfig>,
}

/// Circuit breaker and retry settings shared by all gateway calls
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub failure_threshold: u32,
    pub cooldown: u64, // seconds
    pub half_open_max_requests: u32,
    pub retry_max_attempts: u32,
    pub retry_initial_backoff: u64, // milliseconds
}

/// Webhook signature settings
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub secret: Option<String>,
    pub tolerance: i64, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let store = StoreBackend::from_env()?;
        let database = match store {
            StoreBackend::Postgres => Some(DatabaseConfig::from_env()?),
            StoreBackend::Memory => None,
        };

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            store,
            database,
            gateway: GatewayConfig::from_env()?,
            resilience: ResilienceConfig::from_env()?,
            webhook: WebhookConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        match (&self.store, &self.database) {
            (StoreBackend::Postgres, Some(database)) => database.validate()?,
            (StoreBackend::Postgres, None) => {
                return Err(ConfigError::MissingVariable("DATABASE_URL".to_string()))
            }
            (StoreBackend::Memory, _) => {}
        }
        self.gateway.validate()?;
        self.resilience.validate()?;
        self.webhook.validate()?;
        self.logging.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("SERVER_PORT", "8000")?,
            request_timeout: parse_var("REQUEST_TIMEOUT_SECS", "30")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue(
                "REQUEST_TIMEOUT_SECS cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" => Ok(StoreBackend::Postgres),
            _ => Err(ConfigError::InvalidValue(format!(
                "STORE_BACKEND must be memory or postgres, got {}",
                value
            ))),
        }
    }
}

impl StoreBackend {
    pub fn from_env() -> Result<Self, ConfigError> {
        env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            min_connections: parse_var("DB_MIN_CONNECTIONS", "1")?,
            connection_timeout: parse_var("DB_CONNECTION_TIMEOUT", "30")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl FromStr for GatewayKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(GatewayKind::Stripe),
            "mock" => Ok(GatewayKind::Mock),
            _ => Err(ConfigError::InvalidValue(format!(
                "GATEWAY_KIND must be stripe or mock, got {}",
                value
            ))),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let kind: GatewayKind = env::var("GATEWAY_KIND")
            .unwrap_or_else(|_| "stripe".to_string())
            .parse()?;
        let stripe = match kind {
            GatewayKind::Stripe => Some(StripeConfig::from_env()?),
            GatewayKind::Mock => None,
        };
        Ok(GatewayConfig { kind, stripe })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind != GatewayKind::Stripe {
            return Ok(());
        }
        let stripe = self
            .stripe
            .as_ref()
            .ok_or_else(|| ConfigError::MissingVariable("STRIPE_SECRET_KEY".to_string()))?;

        if stripe.secret_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "STRIPE_SECRET_KEY cannot be empty".to_string(),
            ));
        }

        if !stripe.base_url.starts_with("http://") && !stripe.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "STRIPE_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if stripe.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("STRIPE_TIMEOUT_SECS".to_string()));
        }

        Ok(())
    }
}

impl ResilienceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ResilienceConfig {
            failure_threshold: parse_var("BREAKER_FAILURE_THRESHOLD", "3")?,
            cooldown: parse_var("BREAKER_COOLDOWN_SECS", "10")?,
            half_open_max_requests: parse_var("BREAKER_HALF_OPEN_MAX_REQUESTS", "2")?,
            retry_max_attempts: parse_var("RETRY_MAX_ATTEMPTS", "3")?,
            retry_initial_backoff: parse_var("RETRY_INITIAL_BACKOFF_MS", "100")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.half_open_max_requests == 0 {
            return Err(ConfigError::ValidationFailed(
                "BREAKER_HALF_OPEN_MAX_REQUESTS must be at least 1".to_string(),
            ));
        }

        if self.retry_max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "RETRY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown),
            half_open_max_requests: self.half_open_max_requests,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            initial_backoff: Duration::from_millis(self.retry_initial_backoff),
            ..RetryPolicy::default()
        }
    }
}

impl WebhookConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(WebhookConfig {
            secret: env::var("STRIPE_WEBHOOK_SECRET")
                .ok()
                .filter(|secret| !secret.trim().is_empty()),
            tolerance: parse_var("WEBHOOK_TOLERANCE_SECS", "300")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tolerance <= 0 {
            return Err(ConfigError::InvalidValue(
                "WEBHOOK_TOLERANCE_SECS must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
