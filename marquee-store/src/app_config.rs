use marquee_catalog::{LedgerConfig, PricingConfig};
use marquee_order::RetryPolicy;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    pub payments: PaymentsConfig,
    pub workers: WorkersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u64,
    /// Tighter budget for placing and refunding orders.
    #[serde(default = "default_checkout_rate_limit")]
    pub checkout_rate_limit_per_minute: u64,
}

fn default_rate_limit() -> u64 {
    120
}

fn default_checkout_rate_limit() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub reservation_hold_seconds: u64,
    pub booking_fee_cents: i64,
    pub tax_rate: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_retention")]
    pub reservation_retention_seconds: u64,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_retention() -> u64 {
    24 * 60 * 60
}

impl BusinessRules {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            hold_duration: chrono::Duration::seconds(self.reservation_hold_seconds as i64),
            tombstone_retention: chrono::Duration::seconds(self.reservation_retention_seconds as i64),
        }
    }

    pub fn pricing_config(&self) -> PricingConfig {
        PricingConfig {
            booking_fee_cents: self.booking_fee_cents,
            tax_rate: self.tax_rate,
            currency: self.currency.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub settlement_queue_capacity: usize,
    pub webhook_secret: String,
    pub auto_settle_delay_ms: Option<u64>,
}

impl PaymentsConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkersConfig {
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_event_buffer() -> usize {
    256
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. MARQUEE__SERVER__PORT=9000
            .add_source(config::Environment::with_prefix("MARQUEE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
