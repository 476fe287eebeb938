//! Configuration management for TrustLend
//!
//! Everything comes from environment variables (optionally seeded from `.env`).
//! Production refuses to start without a real gateway and webhook credentials.

use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Credentials the payment gateway presents on webhook callbacks
#[derive(Debug, Clone)]
pub struct WebhookCredentials {
    pub username: String,
    pub password: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// Checkout endpoint of the payment gateway; simulated when unset
    pub payment_gateway_url: Option<String>,

    pub payment_client_id: Option<String>,

    pub payment_client_secret: Option<String>,

    /// Frontend base URL the gateway redirects back to
    pub frontend_url: String,

    /// Webhook credentials; `None` selects the accept-all verifier outside production
    pub webhook_credentials: Option<WebhookCredentials>,

    /// Days past an installment due date before a contract is declared defaulted
    pub default_grace_days: i64,

    /// Interval between delinquency sweeps in seconds
    pub delinquency_sweep_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let port: u16 = parsed_var("PORT", 3001)
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = parsed_var("DB_MAX_CONNECTIONS", 5u32).unwrap_or(5);

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS").ok();

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let payment_gateway_url = env::var("PAYMENT_GATEWAY_URL").ok();
        let payment_client_id = env::var("PAYMENT_CLIENT_ID").ok();
        let payment_client_secret = env::var("PAYMENT_CLIENT_SECRET").ok();

        if environment.is_production() && payment_gateway_url.is_none() {
            return Err(ConfigError::MissingEnvVar("PAYMENT_GATEWAY_URL".to_string()));
        }

        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5174".to_string());

        let webhook_credentials = match (
            env::var("PAYMENT_WEBHOOK_USERNAME").ok(),
            env::var("PAYMENT_WEBHOOK_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) => Some(WebhookCredentials { username, password }),
            _ if environment.is_production() => {
                return Err(ConfigError::MissingEnvVar(
                    "PAYMENT_WEBHOOK_USERNAME/PAYMENT_WEBHOOK_PASSWORD".to_string(),
                ));
            }
            _ => None,
        };

        let default_grace_days: i64 = parsed_var("DEFAULT_GRACE_DAYS", 30)?;
        if default_grace_days < 0 {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_GRACE_DAYS must not be negative".to_string(),
            ));
        }

        let delinquency_sweep_secs = parsed_var("DELINQUENCY_SWEEP_SECS", 3600u64)
            .unwrap_or(3600)
            .max(1);

        Ok(Config {
            database_url,
            environment,
            port,
            db_max_connections,
            cors_allowed_origins,
            log_level,
            payment_gateway_url,
            payment_client_id,
            payment_client_secret,
            frontend_url,
            webhook_credentials,
            default_grace_days,
            delinquency_sweep_secs,
        })
    }

    /// Database URL with the password replaced, for logs
    pub fn database_url_masked(&self) -> String {
        let url = &self.database_url;
        let Some(at) = url.find('@') else {
            return url.clone();
        };
        match url[..at].rfind(':') {
            Some(colon) if url[colon..].starts_with("://") => url.clone(),
            Some(colon) => format!("{}****{}", &url[..=colon], &url[at..]),
            None => url.clone(),
        }
    }
}

/// Read `name` and parse it, falling back to `default` when unset
fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} has an invalid value", name))),
        Err(_) => Ok(default),
    }
}
