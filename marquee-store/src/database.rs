use marquee_core::CoreError;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::app_config::{BusinessRules, DatabaseConfig};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rules stored in the `business_rules` table on top of `defaults`.
    /// Each row's value is expected as `{"value": <number|string>}`.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> =
            sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
                .fetch_all(&self.pool)
                .await?;

        Ok(apply_rule_overrides(defaults, rows))
    }
}

fn apply_rule_overrides(defaults: BusinessRules, rows: Vec<(String, Value)>) -> BusinessRules {
    let mut rules = defaults;

    for (key, value) in rows {
        let Some(v) = value.get("value") else {
            continue;
        };
        match key.as_str() {
            "reservation_hold_seconds" => {
                if let Some(u) = v.as_u64() {
                    rules.reservation_hold_seconds = u;
                }
            }
            "booking_fee_cents" => {
                if let Some(i) = v.as_i64() {
                    rules.booking_fee_cents = i;
                }
            }
            "tax_rate" => {
                if let Some(f) = v.as_f64() {
                    rules.tax_rate = f;
                }
            }
            "currency" => {
                if let Some(s) = v.as_str() {
                    rules.currency = s.to_string();
                }
            }
            _ => {}
        }
    }

    rules
}

/// Map a database failure onto the core error kinds. Unique violations are
/// conflicts, everything else is a storage error.
pub(crate) fn storage_error(e: sqlx::Error) -> CoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => CoreError::Conflict(db.message().to_string()),
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => CoreError::NotFound(db.message().to_string()),
        _ => CoreError::StorageError(e.to_string()),
    }
}

pub(crate) fn to_u32(value: i32, field: &str) -> Result<u32, CoreError> {
    u32::try_from(value).map_err(|_| CoreError::StorageError(format!("negative {} in database: {}", field, value)))
}

pub(crate) fn to_i32(value: u32, field: &str) -> Result<i32, CoreError> {
    i32::try_from(value).map_err(|_| CoreError::ValidationError(format!("{} too large: {}", field, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> BusinessRules {
        BusinessRules {
            reservation_hold_seconds: 900,
            booking_fee_cents: 150,
            tax_rate: 0.0,
            currency: "USD".to_string(),
            reservation_retention_seconds: 86_400,
        }
    }

    #[test]
    fn test_rule_overrides() {
        let rules = apply_rule_overrides(
            defaults(),
            vec![
                ("reservation_hold_seconds".to_string(), json!({"value": 300})),
                ("tax_rate".to_string(), json!({"value": 0.08})),
                ("booking_fee_cents".to_string(), json!({"value": "not a number"})),
                ("unknown_rule".to_string(), json!({"value": 1})),
                ("currency".to_string(), json!({"wrong_shape": "EUR"})),
            ],
        );

        assert_eq!(rules.reservation_hold_seconds, 300);
        assert_eq!(rules.tax_rate, 0.08);
        assert_eq!(rules.booking_fee_cents, 150);
        assert_eq!(rules.currency, "USD");
    }

    #[test]
    fn test_count_conversions() {
        assert_eq!(to_u32(5, "capacity").unwrap(), 5);
        assert!(to_u32(-1, "capacity").is_err());
        assert!(to_i32(u32::MAX, "quantity").is_err());
    }
}
