use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::movie::Showing;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Flat fee added once per order (in cents)
    pub booking_fee_cents: i64,

    /// Sales tax applied to subtotal + fee, e.g. 0.08
    pub tax_rate: f64,

    pub currency: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            booking_fee_cents: 0,
            tax_rate: 0.0,
            currency: "USD".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub showing_id: Uuid,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

/// Price breakdown frozen into an order at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub lines: Vec<QuoteLine>,
    pub subtotal_cents: i64,
    pub booking_fee_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub currency: String,
}

pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Result<Self, PricingError> {
        if config.booking_fee_cents < 0 {
            return Err(PricingError::InvalidConfig("booking fee must not be negative".to_string()));
        }
        if !(0.0..1.0).contains(&config.tax_rate) {
            return Err(PricingError::InvalidConfig(format!("tax rate {} out of range", config.tax_rate)));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Price `quantity` seats for each showing. The booking fee is charged once
    /// per order, tax is rounded half-up to the cent.
    pub fn quote(&self, lines: &[(&Showing, u32)]) -> Result<Quote, PricingError> {
        if lines.is_empty() {
            return Err(PricingError::Empty);
        }

        let mut quoted = Vec::with_capacity(lines.len());
        let mut subtotal: i64 = 0;

        for (showing, quantity) in lines {
            let line_total = showing
                .price_cents
                .checked_mul(i64::from(*quantity))
                .ok_or(PricingError::Overflow)?;
            subtotal = subtotal.checked_add(line_total).ok_or(PricingError::Overflow)?;

            quoted.push(QuoteLine {
                showing_id: showing.id,
                quantity: *quantity,
                unit_price_cents: showing.price_cents,
                line_total_cents: line_total,
            });
        }

        let taxable = subtotal
            .checked_add(self.config.booking_fee_cents)
            .ok_or(PricingError::Overflow)?;
        let tax = (taxable as f64 * self.config.tax_rate).round() as i64;
        let total = taxable.checked_add(tax).ok_or(PricingError::Overflow)?;

        Ok(Quote {
            lines: quoted,
            subtotal_cents: subtotal,
            booking_fee_cents: self.config.booking_fee_cents,
            tax_cents: tax,
            total_cents: total,
            currency: self.config.currency.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Nothing to price")]
    Empty,

    #[error("Price overflow")]
    Overflow,

    #[error("Invalid pricing configuration: {0}")]
    InvalidConfig(String),
}
