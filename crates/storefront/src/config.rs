//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TINTERO_DATABASE_URL` - `PostgreSQL` connection string
//! - `TINTERO_BASE_URL` - Public URL for the storefront
//! - `WEBPAY_COMMERCE_CODE` - Transbank commerce code
//! - `WEBPAY_API_KEY` - Transbank API key secret
//! - `MERCADOPAGO_ACCESS_TOKEN` - MercadoPago access token
//! - `SMTP_HOST` - SMTP server hostname
//! - `SMTP_USERNAME` - SMTP authentication username
//! - `SMTP_PASSWORD` - SMTP authentication password
//! - `SMTP_FROM` - Email sender address
//!
//! ## Optional
//! - `TINTERO_HOST` - Bind address (default: 127.0.0.1)
//! - `TINTERO_PORT` - Listen port (default: 3000)
//! - `TINTERO_CURRENCY` - Catalog currency (default: CLP)
//! - `WEBPAY_API_BASE` - Transbank API base URL (default: integration host)
//! - `MERCADOPAGO_API_BASE` - MercadoPago API base URL
//! - `MERCADOPAGO_WEBHOOK_SECRET` - Shared secret checked on webhook deliveries
//! - `SMTP_PORT` - SMTP port (default: 587)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

use tintero_core::CurrencyCode;

/// Transbank integration environment host. Production deployments must set
/// `WEBPAY_API_BASE` explicitly.
const DEFAULT_WEBPAY_API_BASE: &str = "https://webpay3gint.transbank.cl";
const DEFAULT_MERCADOPAGO_API_BASE: &str = "https://api.mercadopago.com";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Currency the catalog charges in
    pub currency: CurrencyCode,
    /// Transbank Webpay Plus configuration
    pub webpay: WebpayConfig,
    /// MercadoPago configuration
    pub mercadopago: MercadoPagoConfig,
    /// Email configuration
    pub email: EmailConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
}

/// Transbank Webpay Plus configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct WebpayConfig {
    /// API base URL (integration or production host)
    pub api_base: String,
    /// Commerce code assigned by Transbank
    pub commerce_code: String,
    /// API key secret
    pub api_key: SecretString,
}

impl std::fmt::Debug for WebpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebpayConfig")
            .field("api_base", &self.api_base)
            .field("commerce_code", &self.commerce_code)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// MercadoPago configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct MercadoPagoConfig {
    /// API base URL
    pub api_base: String,
    /// Private access token
    pub access_token: SecretString,
    /// Shared secret checked against the `x-webhook-secret` header on
    /// webhook deliveries; unset disables the check
    pub webhook_secret: Option<SecretString>,
}

impl std::fmt::Debug for MercadoPagoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MercadoPagoConfig")
            .field("api_base", &self.api_base)
            .field("access_token", &"[REDACTED]")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail placeholder validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("TINTERO_DATABASE_URL")?;
        let host = get_env_or_default("TINTERO_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("TINTERO_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("TINTERO_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("TINTERO_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("TINTERO_BASE_URL")?;
        let currency = get_env_or_default("TINTERO_CURRENCY", "CLP")
            .parse::<CurrencyCode>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("TINTERO_CURRENCY".to_string(), e.to_string())
            })?;

        let webpay = WebpayConfig::from_env()?;
        let mercadopago = MercadoPagoConfig::from_env()?;
        let email = EmailConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            currency,
            webpay,
            mercadopago,
            email,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl WebpayConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_base: get_env_or_default("WEBPAY_API_BASE", DEFAULT_WEBPAY_API_BASE),
            commerce_code: get_required_env("WEBPAY_COMMERCE_CODE")?,
            api_key: get_validated_secret("WEBPAY_API_KEY")?,
        })
    }
}

impl MercadoPagoConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let webhook_secret = match get_optional_env("MERCADOPAGO_WEBHOOK_SECRET") {
            Some(value) => {
                validate_secret_strength(&value, "MERCADOPAGO_WEBHOOK_SECRET")?;
                Some(SecretString::from(value))
            }
            None => None,
        };

        Ok(Self {
            api_base: get_env_or_default("MERCADOPAGO_API_BASE", DEFAULT_MERCADOPAGO_API_BASE),
            access_token: get_validated_secret("MERCADOPAGO_ACCESS_TOKEN")?,
            webhook_secret,
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let smtp_port = get_env_or_default("SMTP_PORT", "587")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string()))?;

        Ok(Self {
            smtp_host: get_required_env("SMTP_HOST")?,
            smtp_port,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_validated_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("SMTP_FROM")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a secret is not an obvious placeholder.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
