//! Application configuration.
//!
//! Configuration is layered with figment: a YAML file (path from the CLI or
//! `COURTBOOK_CONFIG`) merged with `COURTBOOK_`-prefixed environment
//! variables, where `__` separates nesting levels. Examples:
//!
//! ```bash
//! export COURTBOOK_PORT=8080
//! export COURTBOOK_STORE__POSTGRES__URL="postgres://localhost/courtbook"
//! export COURTBOOK_PAYMENT__STRIPE__API_KEY="sk_live_..."
//! export COURTBOOK_PAYMENT__STRIPE__WEBHOOK_SECRET="whsec_..."
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "COURTBOOK_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// Loaded from YAML and environment variables; every field has a sensible
/// default so a bare `courtbook` starts a development instance against the
/// in-memory store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base URL where the booking UI is reachable (e.g., "https://book.example.com").
    /// Used to build the payment success and cancel redirect URLs.
    pub public_url: String,
    /// Slot and booking persistence backend
    pub store: StoreConfig,
    /// Payment provider configuration (Stripe, or the dummy provider)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentConfig>,
    /// Booking workflow tuning (reservation TTL, cache TTL)
    pub booking: BookingConfig,
    /// Static bearer token protecting the admin endpoints (slot creation,
    /// booking cancellation). Admin endpoints are disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
    /// Origins allowed to call the API from a browser; "*" for any
    pub allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: "http://localhost:8080".to_string(),
            store: StoreConfig::default(),
            payment: None,
            booking: BookingConfig::default(),
            admin_token: None,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Persistence backend configuration.
///
/// The in-memory backend keeps everything in process and loses state on
/// restart; it exists for development and tests. Production deployments use
/// PostgreSQL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process store, no persistence across restarts
    Memory,
    /// External PostgreSQL database
    Postgres {
        /// Database connection URL
        url: String,
        /// Connection pool settings
        #[serde(default)]
        pool: PoolSettings,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory
    }
}

/// Connection pool settings for the PostgreSQL backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 30,
        }
    }
}

/// Payment provider configuration.
///
/// Supports different payment providers via an enum. Credentials should be
/// set via environment variables for security:
/// - `COURTBOOK_PAYMENT__STRIPE__API_KEY` - Stripe secret API key
/// - `COURTBOOK_PAYMENT__STRIPE__WEBHOOK_SECRET` - Webhook signing secret
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentConfig {
    /// Stripe hosted checkout
    Stripe(StripeConfig),
    /// Dummy payment provider for development and testing
    Dummy(DummyConfig),
}

/// Stripe payment configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeConfig {
    /// Stripe API key (secret key starting with sk_)
    pub api_key: String,
    /// Stripe webhook signing secret (starts with whsec_)
    pub webhook_secret: String,
    /// ISO currency code lesson prices are quoted in (default: usd)
    #[serde(default = "StripeConfig::default_currency")]
    pub currency: String,
}

impl StripeConfig {
    fn default_currency() -> String {
        "usd".to_string()
    }
}

/// Dummy payment configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DummyConfig {
    /// Secret used to verify signed webhook deliveries (starts with whsec_)
    pub webhook_secret: String,
}

/// Booking workflow tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookingConfig {
    /// How long a pending reservation holds a slot before lapsing
    #[serde(with = "humantime_serde")]
    pub reservation_ttl: Duration,
    /// How long cached customer booking lists stay fresh
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::from_secs(30 * 60),
            cache_ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("COURTBOOK_").split("__"))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if url::Url::parse(&self.public_url).is_err() {
            return Err(Error::BadRequest {
                message: format!("Config validation: public_url {:?} is not a valid URL", self.public_url),
            });
        }

        // A reservation that lapses faster than a customer can type card
        // details just produces refunds; Stripe also refuses checkout
        // sessions expiring in under 30 minutes.
        if self.booking.reservation_ttl < Duration::from_secs(60) {
            return Err(Error::BadRequest {
                message: format!(
                    "Config validation: booking.reservation_ttl must be at least 1 minute, got {}",
                    humantime::format_duration(self.booking.reservation_ttl)
                ),
            });
        }

        if self.booking.cache_ttl.is_zero() {
            return Err(Error::BadRequest {
                message: "Config validation: booking.cache_ttl cannot be zero".to_string(),
            });
        }

        if self.allowed_origins.is_empty() {
            return Err(Error::BadRequest {
                message: "Config validation: allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        if let Some(token) = &self.admin_token
            && token.len() < 16
        {
            return Err(Error::BadRequest {
                message: "Config validation: admin_token must be at least 16 characters".to_string(),
            });
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args_for(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(matches!(config.store, StoreConfig::Memory));
        assert_eq!(config.booking.reservation_ttl, Duration::from_secs(1800));
    }

    #[test]
    fn test_yaml_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
                port: 9000
                public_url: "https://book.example.com"
                admin_token: "super-secret-admin-token"
                store:
                  type: postgres
                  url: "postgres://localhost/courtbook"
                payment:
                  stripe:
                    api_key: "sk_test_123"
                    webhook_secret: "whsec_123"
                    currency: "eur"
                booking:
                  reservation_ttl: 45m
                  cache_ttl: 2m
                "#,
            )?;

            let config = Config::load(&args_for("test.yaml")).expect("config should load");
            assert_eq!(config.port, 9000);
            assert_eq!(config.public_url, "https://book.example.com");
            assert_eq!(config.booking.reservation_ttl, Duration::from_secs(45 * 60));
            assert!(matches!(config.store, StoreConfig::Postgres { .. }));
            match &config.payment {
                Some(PaymentConfig::Stripe(stripe)) => {
                    assert_eq!(stripe.currency, "eur");
                }
                other => panic!("expected stripe payment config, got {other:?}"),
            }
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "port: 9000")?;
            jail.set_env("COURTBOOK_PORT", "9001");
            jail.set_env("COURTBOOK_BOOKING__RESERVATION_TTL", "10m");

            let config = Config::load(&args_for("test.yaml")).expect("config should load");
            assert_eq!(config.port, 9001);
            assert_eq!(config.booking.reservation_ttl, Duration::from_secs(600));
            Ok(())
        });
    }

    #[test]
    fn test_rejects_short_reservation_ttl() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
                booking:
                  reservation_ttl: 5s
                "#,
            )?;
            assert!(Config::load(&args_for("test.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_rejects_weak_admin_token() {
        let config = Config {
            admin_token: Some("short".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
