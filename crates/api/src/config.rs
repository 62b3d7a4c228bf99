//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use common::Money;
use domain::PricingPolicy;
use payments::SimulationSettings;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// A variable was set but could not be parsed.
#[derive(Debug, Error)]
#[error("invalid value for {key}: {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

/// Shared secret payment providers present on webhook calls.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSecret(String);

impl WebhookSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Compares in constant time.
    pub fn matches(&self, presented: &str) -> bool {
        bool::from(self.0.as_bytes().ct_eq(presented.as_bytes()))
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebhookSecret(***)")
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: Postgres connection string; unset runs on in-memory stores
/// - `TAX_RATE_BPS`, `FREE_SHIPPING_THRESHOLD`, `FLAT_SHIPPING_FEE`: pricing
/// - `PAYMENT_TIMEOUT_MS`, `PAYMENT_APPROVAL_RATE`, `PAYMENT_LATENCY_MS`:
///   provider call bound and simulation tuning
/// - `RESERVATION_TTL_SECS`: age after which a stock hold counts as orphaned
/// - `PAYMENT_WEBHOOK_SECRET`: required on `POST /payments/webhook`; unset
///   refuses every webhook
/// - `SEED_FILE`: JSON file of products, stock and addresses loaded at start-up
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub pricing: PricingPolicy,
    pub payment_timeout: Duration,
    pub simulation: SimulationSettings,
    pub reservation_ttl: Duration,
    pub webhook_secret: Option<WebhookSecret>,
    pub seed_file: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        fn typed<T: FromStr>(
            key: &'static str,
            raw: Option<String>,
            default: T,
        ) -> Result<T, ConfigError> {
            match raw {
                Some(value) => value.trim().parse().map_err(|_| ConfigError { key, value }),
                None => Ok(default),
            }
        }

        let approval_rate: f64 = typed(
            "PAYMENT_APPROVAL_RATE",
            parse("PAYMENT_APPROVAL_RATE"),
            defaults.simulation.approval_rate,
        )?;
        if !(0.0..=1.0).contains(&approval_rate) {
            return Err(ConfigError {
                key: "PAYMENT_APPROVAL_RATE",
                value: approval_rate.to_string(),
            });
        }

        Ok(Self {
            host: parse("HOST").unwrap_or(defaults.host),
            port: typed("PORT", parse("PORT"), defaults.port)?,
            log_level: parse("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: typed("LOG_FORMAT", parse("LOG_FORMAT"), defaults.log_format)?,
            database_url: parse("DATABASE_URL"),
            pricing: PricingPolicy {
                tax_rate_bps: typed(
                    "TAX_RATE_BPS",
                    parse("TAX_RATE_BPS"),
                    defaults.pricing.tax_rate_bps,
                )?,
                free_shipping_threshold: Money::new(typed(
                    "FREE_SHIPPING_THRESHOLD",
                    parse("FREE_SHIPPING_THRESHOLD"),
                    defaults.pricing.free_shipping_threshold.amount(),
                )?),
                flat_shipping_fee: Money::new(typed(
                    "FLAT_SHIPPING_FEE",
                    parse("FLAT_SHIPPING_FEE"),
                    defaults.pricing.flat_shipping_fee.amount(),
                )?),
                ..defaults.pricing
            },
            payment_timeout: Duration::from_millis(typed(
                "PAYMENT_TIMEOUT_MS",
                parse("PAYMENT_TIMEOUT_MS"),
                defaults.payment_timeout.as_millis() as u64,
            )?),
            simulation: SimulationSettings {
                approval_rate,
                latency: Duration::from_millis(typed(
                    "PAYMENT_LATENCY_MS",
                    parse("PAYMENT_LATENCY_MS"),
                    defaults.simulation.latency.as_millis() as u64,
                )?),
            },
            reservation_ttl: Duration::from_secs(typed(
                "RESERVATION_TTL_SECS",
                parse("RESERVATION_TTL_SECS"),
                defaults.reservation_ttl.as_secs(),
            )?),
            webhook_secret: parse("PAYMENT_WEBHOOK_SECRET").map(WebhookSecret::new),
            seed_file: parse("SEED_FILE").map(PathBuf::from),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            pricing: PricingPolicy::default(),
            payment_timeout: payments::DEFAULT_PAYMENT_TIMEOUT,
            simulation: SimulationSettings::default(),
            reservation_ttl: Duration::from_secs(900),
            webhook_secret: None,
            seed_file: None,
        }
    }
}
