use chrono::{DateTime, Utc};
use marquee_catalog::{Quote, Reservation, ReservationId};
use marquee_cart::CartSnapshot;
use marquee_core::{SettlementOutcome, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Failed,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Statuses only move forward: pending_payment → paid | failed, paid → refunded.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::PendingPayment, OrderStatus::Paid)
                | (OrderStatus::PendingPayment, OrderStatus::Failed)
                | (OrderStatus::Paid, OrderStatus::Refunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Failed | OrderStatus::Refunded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(OrderStatus::PendingPayment),
            "paid" => Ok(OrderStatus::Paid),
            "failed" => Ok(OrderStatus::Failed),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

/// Frozen record of a purchase. Only `status`, `status_reason` and
/// `updated_at` change after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub cart_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub subtotal_cents: i64,
    pub booking_fee_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub status_reason: Option<String>,
    /// Deadline of the seat holds backing this order.
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a pending order from the reserved cart and its price quote.
    pub fn from_checkout(snapshot: &CartSnapshot, quote: &Quote, now: DateTime<Utc>) -> Self {
        let lines = snapshot
            .lines
            .iter()
            .map(|line| {
                let unit_price_cents = quote
                    .lines
                    .iter()
                    .find(|q| q.showing_id == line.showing_id)
                    .map(|q| q.unit_price_cents)
                    .unwrap_or_default();
                OrderLine {
                    showing_id: line.showing_id,
                    quantity: line.quantity,
                    unit_price_cents,
                    reservation_id: line.reservation.id,
                }
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            user_id: snapshot.user_id.clone(),
            cart_id: snapshot.cart_id,
            lines,
            subtotal_cents: quote.subtotal_cents,
            booking_fee_cents: quote.booking_fee_cents,
            tax_cents: quote.tax_cents,
            total_cents: quote.total_cents,
            currency: quote.currency.clone(),
            status: OrderStatus::PendingPayment,
            status_reason: None,
            expires_at: snapshot.expires_at().unwrap_or(now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(
        &mut self,
        next: OrderStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.status_reason = reason;
        self.updated_at = now;
        Ok(())
    }

    pub fn seats(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Holds as they were taken at checkout, for re-creating them after a restart.
    pub fn reservations(&self) -> Vec<Reservation> {
        self.lines
            .iter()
            .map(|line| Reservation {
                id: line.reservation_id,
                showing_id: line.showing_id,
                quantity: line.quantity,
                expires_at: self.expires_at,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderLine {
    pub showing_id: Uuid,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub reservation_id: ReservationId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Successful,
    Canceled,
    Refunded,
    ManualReview,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Successful => "successful",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::ManualReview => "manual_review",
        }
    }

    /// A settled payment never changes again on a settlement notice.
    pub fn is_settled(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "successful" => Ok(PaymentStatus::Successful),
            "canceled" => Ok(PaymentStatus::Canceled),
            "refunded" => Ok(PaymentStatus::Refunded),
            "manual_review" => Ok(PaymentStatus::ManualReview),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// The money side of an order. One per order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: String,
    pub transaction_id: Option<TransactionId>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn pending(order: &Order, transaction_id: TransactionId, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            user_id: order.user_id.clone(),
            transaction_id: Some(transaction_id),
            amount_cents: order.total_cents,
            currency: order.currency.clone(),
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// The gateway refused the charge outright; there is no transaction.
    pub fn rejected(order: &Order, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            user_id: order.user_id.clone(),
            transaction_id: None,
            amount_cents: order.total_cents,
            currency: order.currency.clone(),
            status: PaymentStatus::Canceled,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentFilter {
    pub user_id: Option<String>,
    pub status: Option<PaymentStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        self.user_id.as_ref().is_none_or(|u| *u == payment.user_id)
            && self.status.is_none_or(|s| s == payment.status)
            && self.created_from.is_none_or(|from| payment.created_at >= from)
            && self.created_to.is_none_or(|to| payment.created_at <= to)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// Money arrived after the seats had already gone back to the pool.
    LateSuccessAfterRelease,
    /// The provider contradicted an outcome that was already applied.
    ConflictingOutcome,
    UnknownTransaction,
}

impl InconsistencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InconsistencyKind::LateSuccessAfterRelease => "late_success_after_release",
            InconsistencyKind::ConflictingOutcome => "conflicting_outcome",
            InconsistencyKind::UnknownTransaction => "unknown_transaction",
        }
    }
}

impl fmt::Display for InconsistencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InconsistencyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "late_success_after_release" => Ok(InconsistencyKind::LateSuccessAfterRelease),
            "conflicting_outcome" => Ok(InconsistencyKind::ConflictingOutcome),
            "unknown_transaction" => Ok(InconsistencyKind::UnknownTransaction),
            other => Err(format!("unknown inconsistency kind '{}'", other)),
        }
    }
}

/// A settlement notice parked for manual reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedSettlement {
    pub id: Uuid,
    pub transaction_id: TransactionId,
    pub order_id: Option<Uuid>,
    pub kind: InconsistencyKind,
    /// What the provider said about the transaction.
    pub outcome: SettlementOutcome,
    pub detail: String,
    pub flagged_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl FlaggedSettlement {
    pub fn new(
        transaction_id: TransactionId,
        order_id: Option<Uuid>,
        kind: InconsistencyKind,
        outcome: SettlementOutcome,
        detail: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            order_id,
            kind,
            outcome,
            detail: detail.into(),
            flagged_at: now,
            resolved: false,
            resolved_at: None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_monotonic() {
        use OrderStatus::*;
        assert!(PendingPayment.can_transition_to(Paid));
        assert!(PendingPayment.can_transition_to(Failed));
        assert!(Paid.can_transition_to(Refunded));

        assert!(!Paid.can_transition_to(PendingPayment));
        assert!(!Paid.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Paid));
        assert!(!Refunded.can_transition_to(Paid));
        assert!(!PendingPayment.can_transition_to(Refunded));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Successful,
            PaymentStatus::Canceled,
            PaymentStatus::Refunded,
            PaymentStatus::ManualReview,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>(), Ok(status));
        }
        assert!("settled".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_payment_filter() {
        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            transaction_id: None,
            amount_cents: 1000,
            currency: "USD".to_string(),
            status: PaymentStatus::Successful,
            created_at: now,
            updated_at: now,
        };

        assert!(PaymentFilter::default().matches(&payment));
        assert!(PaymentFilter {
            user_id: Some("alice".to_string()),
            status: Some(PaymentStatus::Successful),
            created_from: Some(now - chrono::Duration::hours(1)),
            created_to: Some(now),
        }
        .matches(&payment));
        assert!(!PaymentFilter {
            status: Some(PaymentStatus::Pending),
            ..Default::default()
        }
        .matches(&payment));
        assert!(!PaymentFilter {
            created_from: Some(now + chrono::Duration::seconds(1)),
            ..Default::default()
        }
        .matches(&payment));
    }
}
