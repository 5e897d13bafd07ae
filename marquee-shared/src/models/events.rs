use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPlacedEvent {
    pub order_id: Uuid,
    pub user_id: String,
    pub total_cents: i64,
    pub seats: u32,
    pub expires_at: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPaidEvent {
    pub order_id: Uuid,
    pub user_id: String,
    pub transaction_id: String,
    pub total_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderFailedEvent {
    pub order_id: Uuid,
    pub user_id: String,
    pub reason: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderRefundedEvent {
    pub order_id: Uuid,
    pub user_id: String,
    pub amount_cents: i64,
    pub timestamp: i64,
}

/// Emitted when a settlement notice could not be applied and needs a human.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SettlementFlaggedEvent {
    pub flag_id: Uuid,
    pub order_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub transaction_id: String,
    pub kind: String,
    pub timestamp: i64,
}

/// Envelope broadcast to in-process subscribers (SSE stream, audit log).
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed(OrderPlacedEvent),
    Paid(OrderPaidEvent),
    Failed(OrderFailedEvent),
    Refunded(OrderRefundedEvent),
    SettlementFlagged(SettlementFlaggedEvent),
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "order_placed",
            OrderEvent::Paid(_) => "order_paid",
            OrderEvent::Failed(_) => "order_failed",
            OrderEvent::Refunded(_) => "order_refunded",
            OrderEvent::SettlementFlagged(_) => "settlement_flagged",
        }
    }

    /// Owner of the order the event refers to, if known.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            OrderEvent::Placed(e) => Some(&e.user_id),
            OrderEvent::Paid(e) => Some(&e.user_id),
            OrderEvent::Failed(e) => Some(&e.user_id),
            OrderEvent::Refunded(e) => Some(&e.user_id),
            OrderEvent::SettlementFlagged(e) => e.user_id.as_deref(),
        }
    }

    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            OrderEvent::Placed(e) => Some(e.order_id),
            OrderEvent::Paid(e) => Some(e.order_id),
            OrderEvent::Failed(e) => Some(e.order_id),
            OrderEvent::Refunded(e) => Some(e.order_id),
            OrderEvent::SettlementFlagged(e) => e.order_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_envelope_is_tagged() {
        let event = OrderEvent::Failed(OrderFailedEvent {
            order_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            reason: "declined".to_string(),
            timestamp: 0,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "failed");
        assert_eq!(value["user_id"], "user-1");
        assert_eq!(event.name(), "order_failed");
    }
}
