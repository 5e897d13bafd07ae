use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use marquee_cart::{CartError, CartManager, CartSnapshot};
use marquee_catalog::{
    CatalogRepository, InventoryError, InventoryLedger, PricingEngine, PricingError, Quote,
    Reservation, Showing,
};
use marquee_core::{
    ChargeRequest, Clock, CoreError, GatewayError, KeyedLocks, SettlementOutcome, TransactionId,
};
use marquee_shared::models::events::{
    OrderFailedEvent, OrderPaidEvent, OrderPlacedEvent, OrderRefundedEvent,
};
use marquee_shared::{Masked, OrderEvent};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::events::EventPublisher;
use crate::manager::{OrderManager, OrderManagerError};
use crate::models::{
    FlaggedSettlement, InconsistencyKind, Order, OrderError, OrderStatus, Payment, PaymentStatus,
};
use crate::orchestrator::PaymentOrchestrator;
use crate::repository::{OrderRepository, PaymentRepository};

pub const REASON_DECLINED: &str = "payment_declined";
pub const REASON_UNAVAILABLE: &str = "payment_unavailable";
pub const REASON_TIMEOUT: &str = "reservation_timeout";

/// Who is asking. Admins may act on any order.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub is_admin: bool,
}

impl Actor {
    pub fn can_access(&self, order: &Order) -> bool {
        self.is_admin || self.user_id == order.user_id
    }
}

/// What a settlement notice did to its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Applied(OrderStatus),
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub reheld: usize,
    pub failed: usize,
    /// Carts left mid-checkout with no order behind them, now editable again.
    pub carts_reopened: usize,
    /// Carts left mid-checkout whose order had already been written.
    pub carts_closed: usize,
}

pub struct FinalizerDeps {
    pub carts: Arc<CartManager>,
    pub ledger: Arc<InventoryLedger>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub pricing: PricingEngine,
    pub events: EventPublisher,
    pub clock: Arc<dyn Clock>,
}

/// Turns carts into orders and drives each order through
/// pending_payment → paid | failed → refunded.
///
/// Finalization is serialized per cart, and everything that changes an
/// existing order (settlement, expiry, refund) is serialized per order id.
pub struct OrderFinalizer {
    carts: Arc<CartManager>,
    ledger: Arc<InventoryLedger>,
    catalog: Arc<dyn CatalogRepository>,
    orders: OrderManager,
    payments: Arc<dyn PaymentRepository>,
    orchestrator: Arc<PaymentOrchestrator>,
    pricing: PricingEngine,
    events: EventPublisher,
    clock: Arc<dyn Clock>,
    cart_locks: KeyedLocks<Uuid>,
    order_locks: KeyedLocks<Uuid>,
}

impl OrderFinalizer {
    pub fn new(deps: FinalizerDeps) -> Self {
        Self {
            orders: OrderManager::new(deps.orders, deps.clock.clone()),
            carts: deps.carts,
            ledger: deps.ledger,
            catalog: deps.catalog,
            payments: deps.payments,
            orchestrator: deps.orchestrator,
            pricing: deps.pricing,
            events: deps.events,
            clock: deps.clock,
            cart_locks: KeyedLocks::new(),
            order_locks: KeyedLocks::new(),
        }
    }

    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub async fn get_order(&self, order_id: Uuid, actor: &Actor) -> Result<Order, FinalizeError> {
        let order = self.orders.get_order(order_id).await?;
        if !actor.can_access(&order) {
            // Someone else's order looks the same as a missing one.
            return Err(FinalizeError::OrderNotFound(order_id));
        }
        Ok(order)
    }

    /// Check out the user's cart, persist the order and charge for it.
    ///
    /// On success the order is `pending_payment` until the settlement notice
    /// arrives. A decline or an unreachable gateway fails the order, frees its
    /// seats and is returned as an error.
    pub async fn place_order(
        &self,
        user_id: &str,
        payment_token: Masked<String>,
    ) -> Result<Order, FinalizeError> {
        let cart = self.carts.get(user_id).await?;
        let cart_guard = self.cart_locks.lock(&cart.id).await;

        let snapshot = self.carts.checkout(user_id).await?;
        let order = match self.create_from_snapshot(&snapshot).await {
            Ok(order) => order,
            Err(e) => {
                warn!(cart_id = %snapshot.cart_id, "Order creation failed, reopening cart: {}", e);
                self.carts.cancel_checkout(&snapshot).await;
                return Err(e);
            }
        };

        if let Err(e) = self.carts.complete_checkout(user_id, snapshot.cart_id).await {
            warn!(cart_id = %snapshot.cart_id, "Cart already gone after checkout: {}", e);
        }
        drop(cart_guard);

        self.events.publish(OrderEvent::Placed(OrderPlacedEvent {
            order_id: order.id,
            user_id: order.user_id.clone(),
            total_cents: order.total_cents,
            seats: order.seats(),
            expires_at: order.expires_at.timestamp(),
            timestamp: self.clock.now().timestamp(),
        }));

        let _order_guard = self.order_locks.lock(&order.id).await;
        let request = ChargeRequest {
            idempotency_key: order.id,
            amount_cents: order.total_cents,
            currency: order.currency.clone(),
            token: payment_token,
        };

        match self.orchestrator.charge(&request).await {
            Ok(transaction_id) => {
                let payment = Payment::pending(&order, transaction_id, self.clock.now());
                self.payments.create_payment(&payment).await?;
                info!(
                    order_id = %order.id,
                    transaction_id = ?payment.transaction_id,
                    "Order awaiting settlement"
                );
                Ok(order)
            }
            Err(e) => {
                let reason = match e {
                    GatewayError::Declined(_) => REASON_DECLINED,
                    GatewayError::Unavailable(_) => REASON_UNAVAILABLE,
                };
                let now = self.clock.now();
                let payment = Payment::rejected(&order, now);
                self.payments.create_payment(&payment).await?;
                self.fail_order(&order, reason).await?;
                Err(FinalizeError::Gateway(e))
            }
        }
    }

    async fn create_from_snapshot(&self, snapshot: &CartSnapshot) -> Result<Order, FinalizeError> {
        let mut showings: Vec<Showing> = Vec::with_capacity(snapshot.lines.len());
        for line in &snapshot.lines {
            let showing = self
                .catalog
                .get_showing(line.showing_id)
                .await?
                .ok_or(FinalizeError::ShowingNotFound(line.showing_id))?;
            showings.push(showing);
        }

        let priced: Vec<(&Showing, u32)> = showings
            .iter()
            .zip(&snapshot.lines)
            .map(|(showing, line)| (showing, line.quantity))
            .collect();
        let quote: Quote = self.pricing.quote(&priced)?;

        let order = Order::from_checkout(snapshot, &quote, self.clock.now());
        self.orders.create_order(&order).await?;
        Ok(order)
    }

    /// Apply the provider's verdict on `transaction_id` to an order.
    ///
    /// Re-delivered notices return `Settled::Duplicate`. A notice that cannot
    /// be applied safely, such as money arriving for seats that already went
    /// back on sale, returns `FinalizeError::InconsistentSettlement`, parking
    /// the payment in manual review unless it was already refunded.
    pub async fn apply_settlement(
        &self,
        order_id: Uuid,
        transaction_id: &TransactionId,
        outcome: &SettlementOutcome,
    ) -> Result<Settled, FinalizeError> {
        let _guard = self.order_locks.lock(&order_id).await;
        let order = match self.orders.get_order(order_id).await {
            Ok(order) => order,
            Err(OrderManagerError::Order(OrderError::NotFound(_))) => {
                return Err(FinalizeError::OrderNotFound(order_id))
            }
            Err(e) => return Err(e.into()),
        };

        let mut payment = match self.payments.get_payment_by_order(order_id).await? {
            Some(payment) => payment,
            None => {
                // Charge went through but the payment row never got written.
                let payment = Payment::pending(&order, transaction_id.clone(), self.clock.now());
                self.payments.create_payment(&payment).await?;
                payment
            }
        };

        if payment.transaction_id.as_ref() != Some(transaction_id) {
            return Err(FinalizeError::InconsistentSettlement {
                order_id: Some(order_id),
                kind: InconsistencyKind::UnknownTransaction,
                detail: format!("transaction {} does not belong to order {}", transaction_id, order_id),
            });
        }

        let succeeded = matches!(outcome, SettlementOutcome::Succeeded);
        match (payment.status, succeeded) {
            (PaymentStatus::Successful, true)
            | (PaymentStatus::Canceled, false)
            | (PaymentStatus::ManualReview, _)
            | (PaymentStatus::Refunded, true) => return Ok(Settled::Duplicate),
            (PaymentStatus::Refunded, false) => {
                // The money already went back; keep the payment as it is.
                return Err(FinalizeError::InconsistentSettlement {
                    order_id: Some(order_id),
                    kind: InconsistencyKind::ConflictingOutcome,
                    detail: "decline received for a refunded payment".to_string(),
                });
            }
            (PaymentStatus::Successful, false) => {
                self.park_payment(&mut payment).await?;
                return Err(FinalizeError::InconsistentSettlement {
                    order_id: Some(order_id),
                    kind: InconsistencyKind::ConflictingOutcome,
                    detail: format!("decline received for settled order ({})", order.status),
                });
            }
            (PaymentStatus::Canceled, true) => {
                self.park_payment(&mut payment).await?;
                return Err(FinalizeError::InconsistentSettlement {
                    order_id: Some(order_id),
                    kind: InconsistencyKind::ConflictingOutcome,
                    detail: "success received after the charge was declined".to_string(),
                });
            }
            (PaymentStatus::Pending, _) => {}
        }

        match (order.status, outcome) {
            (OrderStatus::PendingPayment, SettlementOutcome::Succeeded) => {
                self.settle_success(&order, &mut payment).await
            }
            (OrderStatus::PendingPayment, SettlementOutcome::Declined { reason }) => {
                warn!(order_id = %order_id, "Payment declined at settlement: {}", reason);
                self.set_payment_status(&mut payment, PaymentStatus::Canceled).await?;
                self.fail_order(&order, REASON_DECLINED).await?;
                Ok(Settled::Applied(OrderStatus::Failed))
            }
            (OrderStatus::Failed, SettlementOutcome::Succeeded) => {
                self.park_payment(&mut payment).await?;
                Err(FinalizeError::InconsistentSettlement {
                    order_id: Some(order_id),
                    kind: InconsistencyKind::LateSuccessAfterRelease,
                    detail: format!(
                        "payment succeeded after order failed ({})",
                        order.status_reason.as_deref().unwrap_or("unknown")
                    ),
                })
            }
            (OrderStatus::Failed, SettlementOutcome::Declined { .. }) => {
                self.set_payment_status(&mut payment, PaymentStatus::Canceled).await?;
                Ok(Settled::Applied(OrderStatus::Failed))
            }
            (OrderStatus::Paid | OrderStatus::Refunded, _) => Ok(Settled::Duplicate),
        }
    }

    async fn settle_success(&self, order: &Order, payment: &mut Payment) -> Result<Settled, FinalizeError> {
        let reservations = order.reservations();
        let mut committed: Vec<&Reservation> = Vec::with_capacity(reservations.len());

        for reservation in &reservations {
            match self.ledger.commit(reservation.id).await {
                Ok(_) => committed.push(reservation),
                Err(e) => {
                    warn!(
                        order_id = %order.id,
                        reservation_id = %reservation.id,
                        "Cannot commit seats for paid order: {}",
                        e
                    );
                    for done in &committed {
                        if let Err(e) = self.ledger.restore(done.id).await {
                            error!(reservation_id = %done.id, "Rollback of committed seats failed: {}", e);
                        }
                    }
                    self.park_payment(payment).await?;
                    self.fail_order(order, REASON_TIMEOUT).await?;
                    return Err(FinalizeError::InconsistentSettlement {
                        order_id: Some(order.id),
                        kind: InconsistencyKind::LateSuccessAfterRelease,
                        detail: format!("reservation {} unavailable: {}", reservation.id, e),
                    });
                }
            }
        }

        self.set_payment_status(payment, PaymentStatus::Successful).await?;
        let paid = self.orders.mark_paid(order.id).await?;
        self.sync_seats(order).await;

        self.events.publish(OrderEvent::Paid(OrderPaidEvent {
            order_id: paid.id,
            user_id: paid.user_id.clone(),
            transaction_id: payment
                .transaction_id
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_default(),
            total_cents: paid.total_cents,
            timestamp: self.clock.now().timestamp(),
        }));
        Ok(Settled::Applied(OrderStatus::Paid))
    }

    /// Fail every pending order whose seat holds have run out.
    pub async fn expire_overdue(&self) -> Result<usize, FinalizeError> {
        let now = self.clock.now();
        let overdue: Vec<Uuid> = self
            .orders
            .list_pending()
            .await?
            .into_iter()
            .filter(|o| o.expires_at <= now)
            .map(|o| o.id)
            .collect();

        let mut expired = 0;
        for order_id in overdue {
            let _guard = self.order_locks.lock(&order_id).await;
            let order = self.orders.get_order(order_id).await?;
            if order.status != OrderStatus::PendingPayment || order.expires_at > self.clock.now() {
                continue;
            }
            self.fail_order(&order, REASON_TIMEOUT).await?;
            expired += 1;
        }

        if expired > 0 {
            info!("Expired {} unpaid orders", expired);
        }
        Ok(expired)
    }

    /// Refund a paid order and put its seats back on sale.
    ///
    /// A payment that is already refunded but whose order is still paid is
    /// picked up where the earlier attempt stopped, without charging the
    /// gateway a second time.
    pub async fn refund(&self, order_id: Uuid, actor: &Actor) -> Result<Order, FinalizeError> {
        let _guard = self.order_locks.lock(&order_id).await;
        let order = self.orders.get_order(order_id).await?;
        if !actor.can_access(&order) {
            return Err(FinalizeError::Forbidden);
        }
        if !order.status.can_transition_to(OrderStatus::Refunded) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Refunded,
            }
            .into());
        }

        let mut payment = self
            .payments
            .get_payment_by_order(order_id)
            .await?
            .ok_or_else(|| CoreError::InternalError(format!("paid order {} has no payment", order_id)))?;
        match payment.status {
            PaymentStatus::Successful | PaymentStatus::Refunded => {}
            status => return Err(FinalizeError::PaymentNotRefundable { order_id, status }),
        }

        let (refunded, _) = self.refund_paid(&order, &mut payment).await?;
        info!(order_id = %order_id, actor = %actor.user_id, "Order refunded");
        Ok(refunded)
    }

    /// Give the money back for a paid order and return its seats. Caller holds
    /// the order lock.
    async fn refund_paid(
        &self,
        order: &Order,
        payment: &mut Payment,
    ) -> Result<(Order, Option<String>), FinalizeError> {
        self.ensure_seats_returnable(order).await?;

        let refund_id = if payment.status == PaymentStatus::Refunded {
            info!(order_id = %order.id, "Payment already refunded, finishing order refund");
            None
        } else {
            let transaction_id = payment
                .transaction_id
                .clone()
                .ok_or_else(|| CoreError::InternalError(format!("payment {} has no transaction", payment.id)))?;
            Some(self.refund_payment(payment, &transaction_id).await?)
        };

        let refunded = self.orders.mark_refunded(order.id).await?;
        self.return_seats(order).await;
        self.sync_seats(order).await;

        self.events.publish(OrderEvent::Refunded(OrderRefundedEvent {
            order_id: order.id,
            user_id: refunded.user_id.clone(),
            amount_cents: payment.amount_cents,
            timestamp: self.clock.now().timestamp(),
        }));
        Ok((refunded, refund_id))
    }

    async fn refund_payment(
        &self,
        payment: &mut Payment,
        transaction_id: &TransactionId,
    ) -> Result<String, FinalizeError> {
        let refund_id = self
            .orchestrator
            .refund(transaction_id, payment.amount_cents)
            .await?;
        self.set_payment_status(payment, PaymentStatus::Refunded).await?;
        Ok(refund_id)
    }

    /// Fail before any money moves if the ledger could not take the seats back.
    async fn ensure_seats_returnable(&self, order: &Order) -> Result<(), FinalizeError> {
        let mut untracked: BTreeMap<Uuid, u32> = BTreeMap::new();
        for reservation in order.reservations() {
            match self.ledger.state(reservation.id).await {
                Ok(_) => {}
                Err(InventoryError::ReservationNotFound(_)) => {
                    *untracked.entry(reservation.showing_id).or_default() += reservation.quantity;
                }
                Err(e) => return Err(e.into()),
            }
        }

        for (showing_id, quantity) in untracked {
            let availability = self.ledger.availability(showing_id).await?;
            if availability.committed < quantity {
                return Err(FinalizeError::SeatsNotReturnable {
                    showing_id,
                    quantity,
                    committed: availability.committed,
                });
            }
        }
        Ok(())
    }

    async fn return_seats(&self, order: &Order) {
        for reservation in order.reservations() {
            let result = match self.ledger.restore(reservation.id).await {
                Err(InventoryError::ReservationNotFound(_)) => {
                    self.ledger
                        .release_committed_seats(reservation.showing_id, reservation.quantity)
                        .await
                }
                other => other,
            };
            if let Err(e) = result {
                error!(
                    order_id = %order.id,
                    reservation_id = %reservation.id,
                    "Could not return refunded seats: {}",
                    e
                );
            }
        }
    }

    /// Re-create seat holds for orders that were awaiting payment when the
    /// process stopped. Orders whose holds cannot come back are failed.
    ///
    /// Also settles carts the process stopped checking out. Run once at
    /// startup, before any checkout.
    pub async fn recover_pending(&self) -> Result<RecoveryReport, FinalizeError> {
        let mut report = RecoveryReport::default();
        self.recover_carts(&mut report).await?;

        for order in self.orders.list_pending().await? {
            let _guard = self.order_locks.lock(&order.id).await;
            let mut reheld = Vec::new();
            let mut lost = None;

            for reservation in order.reservations() {
                match self.ledger.rehold(&reservation).await {
                    Ok(()) => reheld.push(reservation),
                    Err(e) => {
                        lost = Some(e);
                        break;
                    }
                }
            }

            match lost {
                None => report.reheld += 1,
                Some(e) => {
                    warn!(order_id = %order.id, "Could not restore seat holds: {}", e);
                    for reservation in &reheld {
                        if let Err(e) = self.ledger.release(reservation.id).await {
                            warn!(reservation_id = %reservation.id, "Release of re-held seats failed: {}", e);
                        }
                    }
                    self.fail_order(&order, REASON_TIMEOUT).await?;
                    report.failed += 1;
                }
            }
        }

        info!(
            "Recovered {} pending orders, failed {}",
            report.reheld, report.failed
        );
        Ok(report)
    }

    async fn recover_carts(&self, report: &mut RecoveryReport) -> Result<(), FinalizeError> {
        for cart in self.carts.stale_checkouts().await? {
            let _guard = self.cart_locks.lock(&cart.id).await;
            let placed = self
                .orders
                .list_for_user(&cart.user_id)
                .await?
                .iter()
                .any(|o| o.cart_id == cart.id);

            if placed {
                match self.carts.complete_checkout(&cart.user_id, cart.id).await {
                    Ok(()) | Err(CartError::CartNotFound(_)) => report.carts_closed += 1,
                    Err(e) => return Err(e.into()),
                }
            } else {
                // Holds died with the old process; nothing to release.
                self.carts.reopen(&cart.user_id, cart.id).await?;
                report.carts_reopened += 1;
            }
        }

        if report.carts_reopened + report.carts_closed > 0 {
            info!(
                "Recovered carts stuck in checkout: {} reopened, {} closed",
                report.carts_reopened, report.carts_closed
            );
        }
        Ok(())
    }

    /// Settle a flagged transaction with the customer and close the flag.
    ///
    /// Money parked in manual review goes back; for a paid order that also
    /// refunds the order and returns its seats. A success for a transaction no
    /// payment knows about is refunded at the order's total. Declines need no
    /// refund.
    pub async fn resolve_flag(&self, flag: &FlaggedSettlement) -> Result<Option<String>, FinalizeError> {
        let order_id = match flag.order_id {
            Some(order_id) => Some(order_id),
            None => self
                .payments
                .get_payment_by_transaction(&flag.transaction_id)
                .await?
                .map(|p| p.order_id),
        };
        let _guard = self.order_locks.lock(&order_id.unwrap_or(flag.id)).await;

        let flag = self
            .payments
            .get_flag(flag.id)
            .await?
            .ok_or(FinalizeError::FlagNotFound(flag.id))?;
        if flag.resolved {
            return Err(FinalizeError::AlreadyResolved(flag.id));
        }

        let refund_id = match self.payments.get_payment_by_transaction(&flag.transaction_id).await? {
            Some(mut payment) if payment.status == PaymentStatus::ManualReview => {
                let order = self.orders.get_order(payment.order_id).await?;
                if order.status == OrderStatus::Paid {
                    self.refund_paid(&order, &mut payment).await?.1
                } else {
                    Some(self.refund_payment(&mut payment, &flag.transaction_id).await?)
                }
            }
            Some(_) => None,
            None => match flag.outcome {
                SettlementOutcome::Succeeded => Some(self.refund_untracked(&flag).await?),
                SettlementOutcome::Declined { .. } => None,
            },
        };

        self.payments.resolve_flag(flag.id, self.clock.now()).await?;
        info!(flag_id = %flag.id, refund_id = ?refund_id, "Flagged settlement resolved");
        Ok(refund_id)
    }

    /// Refund money the provider took under a transaction id no payment
    /// recorded, such as a charge that timed out on our side but went through.
    async fn refund_untracked(&self, flag: &FlaggedSettlement) -> Result<String, FinalizeError> {
        let unknown = || FinalizeError::RefundAmountUnknown(flag.transaction_id.clone());
        let order_id = flag.order_id.ok_or_else(unknown)?;
        let order = match self.orders.get_order(order_id).await {
            Ok(order) => order,
            Err(OrderManagerError::Order(OrderError::NotFound(_))) => return Err(unknown()),
            Err(e) => return Err(e.into()),
        };

        let refund_id = self
            .orchestrator
            .refund(&flag.transaction_id, order.total_cents)
            .await?;

        if let Some(mut payment) = self.payments.get_payment_by_order(order_id).await? {
            if payment.transaction_id.is_none() {
                payment.transaction_id = Some(flag.transaction_id.clone());
                self.set_payment_status(&mut payment, PaymentStatus::Refunded).await?;
            }
        }
        Ok(refund_id)
    }

    /// Free the order's holds and mark it failed. Caller holds the order lock.
    async fn fail_order(&self, order: &Order, reason: &str) -> Result<(), FinalizeError> {
        for reservation in order.reservations() {
            match self.ledger.release(reservation.id).await {
                Ok(()) | Err(InventoryError::ReservationNotFound(_)) => {}
                Err(e) => warn!(reservation_id = %reservation.id, "Release failed: {}", e),
            }
        }

        let failed = self.orders.mark_failed(order.id, reason).await?;
        self.events.publish(OrderEvent::Failed(OrderFailedEvent {
            order_id: failed.id,
            user_id: failed.user_id,
            reason: reason.to_string(),
            timestamp: self.clock.now().timestamp(),
        }));
        Ok(())
    }

    async fn park_payment(&self, payment: &mut Payment) -> Result<(), FinalizeError> {
        self.set_payment_status(payment, PaymentStatus::ManualReview).await
    }

    async fn set_payment_status(
        &self,
        payment: &mut Payment,
        status: PaymentStatus,
    ) -> Result<(), FinalizeError> {
        payment.status = status;
        payment.updated_at = self.clock.now();
        self.payments.update_payment(payment).await?;
        Ok(())
    }

    /// Write the ledger's sold-seat counts back to the catalog.
    async fn sync_seats(&self, order: &Order) {
        let showings: BTreeSet<Uuid> = order.lines.iter().map(|l| l.showing_id).collect();
        for showing_id in showings {
            let result = match self.ledger.availability(showing_id).await {
                Ok(availability) => self
                    .catalog
                    .set_seats_reserved(showing_id, availability.committed)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(e) = result {
                warn!(showing_id = %showing_id, "Could not persist sold seats: {}", e);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Showing not found: {0}")]
    ShowingNotFound(Uuid),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Flagged settlement not found: {0}")]
    FlagNotFound(Uuid),

    #[error("Flagged settlement already resolved: {0}")]
    AlreadyResolved(Uuid),

    #[error("Not allowed to act on this order")]
    Forbidden,

    #[error("Payment for order {order_id} cannot be refunded while {status}")]
    PaymentNotRefundable { order_id: Uuid, status: PaymentStatus },

    #[error("Cannot return {quantity} seats to showing {showing_id}, only {committed} sold")]
    SeatsNotReturnable {
        showing_id: Uuid,
        quantity: u32,
        committed: u32,
    },

    #[error("No order to take the refund amount from for transaction {0}")]
    RefundAmountUnknown(TransactionId),

    #[error("Inconsistent settlement ({kind}): {detail}")]
    InconsistentSettlement {
        order_id: Option<Uuid>,
        kind: InconsistencyKind,
        detail: String,
    },

    #[error(transparent)]
    Storage(#[from] CoreError),
}

impl From<OrderManagerError> for FinalizeError {
    fn from(e: OrderManagerError) -> Self {
        match e {
            OrderManagerError::Order(OrderError::NotFound(id)) => FinalizeError::OrderNotFound(id),
            OrderManagerError::Order(e) => FinalizeError::Order(e),
            OrderManagerError::Storage(e) => FinalizeError::Storage(e),
        }
    }
}

impl FinalizeError {
    /// The inventory error behind a checkout failure, if that is what this is.
    pub fn inventory(&self) -> Option<&InventoryError> {
        match self {
            FinalizeError::Inventory(e) | FinalizeError::Cart(CartError::Inventory(e)) => Some(e),
            _ => None,
        }
    }
}
