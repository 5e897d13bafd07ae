use std::sync::Arc;

use marquee_core::{Clock, CoreError, SettlementNotice};
use marquee_shared::models::events::SettlementFlaggedEvent;
use marquee_shared::OrderEvent;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::events::EventPublisher;
use crate::finalizer::{FinalizeError, OrderFinalizer, Settled};
use crate::models::{FlaggedSettlement, InconsistencyKind, OrderStatus};
use crate::repository::PaymentRepository;

/// Bounded hand-off from the webhook receiver to the reconciler.
#[derive(Clone)]
pub struct SettlementQueue {
    sender: mpsc::Sender<SettlementNotice>,
}

impl SettlementQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SettlementNotice>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Wait for room in the queue.
    pub async fn enqueue(&self, notice: SettlementNotice) -> Result<(), QueueError> {
        self.sender.send(notice).await.map_err(|_| QueueError::Closed)
    }

    /// Refuse instead of waiting, so an HTTP handler can answer right away.
    pub fn try_enqueue(&self, notice: SettlementNotice) -> Result<(), QueueError> {
        self.sender.try_send(notice).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Settlement queue is full")]
    Full,
    #[error("Settlement queue is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied(OrderStatus),
    Duplicate,
    Flagged(InconsistencyKind),
}

/// Matches settlement notices to orders.
///
/// Idempotency rides on the payment record: once a payment has left
/// `pending`, a repeated notice for its transaction is a no-op. Notices that
/// cannot be applied end up as flagged settlements for an admin.
pub struct PaymentReconciler {
    finalizer: Arc<OrderFinalizer>,
    payments: Arc<dyn PaymentRepository>,
    events: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl PaymentReconciler {
    pub fn new(
        finalizer: Arc<OrderFinalizer>,
        payments: Arc<dyn PaymentRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events = finalizer.events().clone();
        Self {
            finalizer,
            payments,
            events,
            clock,
        }
    }

    /// Drain the queue until every sender is gone.
    pub async fn run(self: Arc<Self>, mut receiver: mpsc::Receiver<SettlementNotice>) {
        info!("Payment reconciler started");
        while let Some(notice) = receiver.recv().await {
            let transaction_id = notice.transaction_id.clone();
            match self.reconcile(notice).await {
                Ok(outcome) => {
                    info!(transaction_id = %transaction_id, outcome = ?outcome, "Settlement reconciled");
                }
                Err(e) => {
                    error!(transaction_id = %transaction_id, "Settlement could not be reconciled: {}", e);
                }
            }
        }
        info!("Payment reconciler stopped");
    }

    pub async fn reconcile(&self, notice: SettlementNotice) -> Result<ReconcileOutcome, FinalizeError> {
        let order_id = match notice.order_id {
            Some(order_id) => Some(order_id),
            None => self
                .payments
                .get_payment_by_transaction(&notice.transaction_id)
                .await?
                .map(|p| p.order_id),
        };

        let Some(order_id) = order_id else {
            return self
                .flag(
                    &notice,
                    None,
                    InconsistencyKind::UnknownTransaction,
                    "no order for transaction".to_string(),
                )
                .await;
        };

        match self
            .finalizer
            .apply_settlement(order_id, &notice.transaction_id, &notice.outcome)
            .await
        {
            Ok(Settled::Applied(status)) => Ok(ReconcileOutcome::Applied(status)),
            Ok(Settled::Duplicate) => Ok(ReconcileOutcome::Duplicate),
            Err(FinalizeError::InconsistentSettlement { order_id, kind, detail }) => {
                self.flag(&notice, order_id, kind, detail).await
            }
            Err(FinalizeError::OrderNotFound(order_id)) => {
                self.flag(
                    &notice,
                    None,
                    InconsistencyKind::UnknownTransaction,
                    format!("order {} does not exist", order_id),
                )
                .await
            }
            Err(e) => Err(e),
        }
    }

    async fn flag(
        &self,
        notice: &SettlementNotice,
        order_id: Option<Uuid>,
        kind: InconsistencyKind,
        detail: String,
    ) -> Result<ReconcileOutcome, FinalizeError> {
        if self
            .payments
            .find_flag(&notice.transaction_id, kind)
            .await?
            .is_some()
        {
            return Ok(ReconcileOutcome::Duplicate);
        }

        let flag = FlaggedSettlement::new(
            notice.transaction_id.clone(),
            order_id,
            kind,
            notice.outcome.clone(),
            detail,
            self.clock.now(),
        );
        match self.payments.create_flag(&flag).await {
            Ok(()) => {}
            // A redelivery of the same notice got there first.
            Err(CoreError::Conflict(_)) => return Ok(ReconcileOutcome::Duplicate),
            Err(e) => return Err(e.into()),
        }

        let user_id = match order_id {
            Some(id) => self
                .finalizer
                .orders()
                .get_order(id)
                .await
                .ok()
                .map(|o| o.user_id),
            None => None,
        };

        warn!(
            flag_id = %flag.id,
            transaction_id = %notice.transaction_id,
            order_id = ?order_id,
            kind = %kind,
            "Settlement flagged for manual reconciliation: {}",
            flag.detail
        );
        self.events.publish(OrderEvent::SettlementFlagged(SettlementFlaggedEvent {
            flag_id: flag.id,
            order_id,
            user_id,
            transaction_id: notice.transaction_id.to_string(),
            kind: kind.to_string(),
            timestamp: self.clock.now().timestamp(),
        }));
        Ok(ReconcileOutcome::Flagged(kind))
    }

    pub async fn list_flags(&self, include_resolved: bool) -> Result<Vec<FlaggedSettlement>, FinalizeError> {
        Ok(self.payments.list_flags(include_resolved).await?)
    }

    /// Refund a flagged settlement through the gateway and close it.
    pub async fn resolve(&self, flag_id: Uuid) -> Result<(FlaggedSettlement, Option<String>), FinalizeError> {
        let flag = self
            .payments
            .get_flag(flag_id)
            .await?
            .ok_or(FinalizeError::FlagNotFound(flag_id))?;
        let refund_id = self.finalizer.resolve_flag(&flag).await?;
        let resolved = self
            .payments
            .get_flag(flag_id)
            .await?
            .ok_or(FinalizeError::FlagNotFound(flag_id))?;
        Ok((resolved, refund_id))
    }
}
