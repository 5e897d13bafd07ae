use std::sync::Arc;

use chrono::{Duration, Utc};
use marquee_cart::{Cart, CartError, CartManager, CartRepository, CartStatus, InMemoryCartRepository};
use marquee_catalog::{
    CatalogRepository, InMemoryCatalogRepository, InventoryError, InventoryLedger, LedgerConfig,
    Movie, PricingConfig, PricingEngine, Showing,
};
use marquee_core::{GatewayError, ManualClock, SettlementNotice, SettlementOutcome, TransactionId};
use marquee_shared::{Masked, OrderEvent};
use uuid::Uuid;

use crate::events::EventPublisher;
use crate::finalizer::{Actor, FinalizeError, FinalizerDeps, OrderFinalizer};
use crate::memory::{InMemoryOrderRepository, InMemoryPaymentRepository};
use crate::models::{InconsistencyKind, Order, OrderError, OrderStatus, PaymentStatus};
use crate::orchestrator::{MockPaymentGateway, PaymentOrchestrator, RetryPolicy};
use crate::reconciler::{PaymentReconciler, ReconcileOutcome};
use crate::repository::PaymentRepository;

struct Harness {
    finalizer: Arc<OrderFinalizer>,
    reconciler: PaymentReconciler,
    carts: Arc<CartManager>,
    cart_store: Arc<InMemoryCartRepository>,
    ledger: Arc<InventoryLedger>,
    catalog: Arc<InMemoryCatalogRepository>,
    orders: Arc<InMemoryOrderRepository>,
    payments: Arc<InMemoryPaymentRepository>,
    gateway: Arc<MockPaymentGateway>,
    events: EventPublisher,
    clock: Arc<ManualClock>,
    showings: Vec<Uuid>,
}

impl Harness {
    async fn new(capacities: &[u32]) -> Self {
        let clock = Arc::new(ManualClock::default());
        let catalog = Arc::new(InMemoryCatalogRepository::new());
        let movie = Movie::new("Vertigo".to_string(), 1958, 128, String::new(), 1000).unwrap();
        catalog.create_movie(&movie).await.unwrap();

        let mut showings = Vec::new();
        for capacity in capacities {
            let showing = Showing::new(&movie, Utc::now() + Duration::days(1), *capacity, None).unwrap();
            catalog.create_showing(&showing).await.unwrap();
            showings.push(showing.id);
        }

        Self::assemble(
            clock,
            catalog,
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryPaymentRepository::new()),
            Arc::new(InMemoryCartRepository::new()),
            showings,
        )
        .await
    }

    /// Wire a fresh ledger, cart manager and finalizer over existing stores,
    /// the way a restarted process would.
    async fn assemble(
        clock: Arc<ManualClock>,
        catalog: Arc<InMemoryCatalogRepository>,
        orders: Arc<InMemoryOrderRepository>,
        payments: Arc<InMemoryPaymentRepository>,
        cart_store: Arc<InMemoryCartRepository>,
        showings: Vec<Uuid>,
    ) -> Self {
        let ledger = Arc::new(InventoryLedger::new(LedgerConfig::default(), clock.clone()));
        for showing in catalog.list_showings(None).await.unwrap() {
            ledger
                .register_showing(showing.id, showing.capacity, showing.seats_reserved)
                .await
                .unwrap();
        }

        let carts = Arc::new(CartManager::new(cart_store.clone(), ledger.clone()));
        let gateway = Arc::new(MockPaymentGateway::new());
        let events = EventPublisher::new(64);
        let pricing = PricingEngine::new(PricingConfig {
            booking_fee_cents: 100,
            tax_rate: 0.0,
            currency: "USD".to_string(),
        })
        .unwrap();

        let finalizer = Arc::new(OrderFinalizer::new(FinalizerDeps {
            carts: carts.clone(),
            ledger: ledger.clone(),
            catalog: catalog.clone(),
            orders: orders.clone(),
            payments: payments.clone(),
            orchestrator: Arc::new(PaymentOrchestrator::new(gateway.clone(), RetryPolicy::immediate(2))),
            pricing,
            events: events.clone(),
            clock: clock.clone(),
        }));
        let reconciler = PaymentReconciler::new(finalizer.clone(), payments.clone(), clock.clone());

        Self {
            finalizer,
            reconciler,
            carts,
            cart_store,
            ledger,
            catalog,
            orders,
            payments,
            gateway,
            events,
            clock,
            showings,
        }
    }

    async fn place(&self, user: &str, showing: usize, quantity: u32) -> Order {
        self.carts
            .add_item(user, self.showings[showing], quantity)
            .await
            .unwrap();
        self.finalizer
            .place_order(user, Masked::new("tok_visa".to_string()))
            .await
            .unwrap()
    }

    async fn transaction_of(&self, order: &Order) -> TransactionId {
        self.payments
            .get_payment_by_order(order.id)
            .await
            .unwrap()
            .unwrap()
            .transaction_id
            .unwrap()
    }

    async fn settle(&self, order: &Order) -> ReconcileOutcome {
        let transaction_id = self.transaction_of(order).await;
        self.reconciler
            .reconcile(SettlementNotice::succeeded(transaction_id, Some(order.id)))
            .await
            .unwrap()
    }

    async fn status(&self, order: &Order) -> OrderStatus {
        self.finalizer.orders().get_order(order.id).await.unwrap().status
    }

    async fn payment_status(&self, order: &Order) -> PaymentStatus {
        self.payments
            .get_payment_by_order(order.id)
            .await
            .unwrap()
            .unwrap()
            .status
    }
}

fn owner(user: &str) -> Actor {
    Actor {
        user_id: user.to_string(),
        is_admin: false,
    }
}

#[tokio::test]
async fn test_paid_order_commits_seats_once() {
    let h = Harness::new(&[10]).await;
    let mut events = h.events.subscribe();

    let order = h.place("alice", 0, 2).await;
    assert_eq!(order.status, OrderStatus::PendingPayment);
    assert_eq!(order.subtotal_cents, 2000);
    assert_eq!(order.total_cents, 2100);
    assert_eq!(h.payment_status(&order).await, PaymentStatus::Pending);
    assert!(h.carts.get("alice").await.is_err());

    assert_eq!(h.settle(&order).await, ReconcileOutcome::Applied(OrderStatus::Paid));
    assert_eq!(h.settle(&order).await, ReconcileOutcome::Duplicate);

    let availability = h.ledger.availability(h.showings[0]).await.unwrap();
    assert_eq!(availability.committed, 2);
    assert_eq!(availability.held, 0);
    assert_eq!(h.payment_status(&order).await, PaymentStatus::Successful);

    let showing = h.catalog.get_showing(h.showings[0]).await.unwrap().unwrap();
    assert_eq!(showing.seats_reserved, 2);

    assert!(matches!(events.recv().await.unwrap(), OrderEvent::Placed(_)));
    assert!(matches!(events.recv().await.unwrap(), OrderEvent::Paid(_)));
}

#[tokio::test]
async fn test_declined_charge_fails_order_and_frees_seats() {
    let h = Harness::new(&[4]).await;
    h.carts.add_item("bob", h.showings[0], 3).await.unwrap();

    let result = h
        .finalizer
        .place_order("bob", Masked::new("tok_declined".to_string()))
        .await;
    assert!(matches!(result, Err(FinalizeError::Gateway(GatewayError::Declined(_)))));

    let orders = h.finalizer.orders().list_for_user("bob").await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Failed);
    assert_eq!(orders[0].status_reason.as_deref(), Some("payment_declined"));
    assert_eq!(h.payment_status(&orders[0]).await, PaymentStatus::Canceled);
    assert_eq!(h.ledger.availability(h.showings[0]).await.unwrap().available, 4);
}

#[tokio::test]
async fn test_unreachable_gateway_is_retried_then_fails() {
    let h = Harness::new(&[4]).await;
    h.carts.add_item("bob", h.showings[0], 1).await.unwrap();

    let result = h
        .finalizer
        .place_order("bob", Masked::new("tok_unavailable".to_string()))
        .await;
    assert!(matches!(result, Err(FinalizeError::Gateway(GatewayError::Unavailable(_)))));
    assert_eq!(h.gateway.charge_count(), 2);
    assert_eq!(h.ledger.availability(h.showings[0]).await.unwrap().held, 0);
}

#[tokio::test]
async fn test_sold_out_checkout_keeps_cart() {
    let h = Harness::new(&[2, 1]).await;
    h.place("carol", 1, 1).await;

    h.carts.add_item("dave", h.showings[0], 2).await.unwrap();
    h.carts.add_item("dave", h.showings[1], 1).await.unwrap();
    let err = h
        .finalizer
        .place_order("dave", Masked::new("tok_visa".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err.inventory(), Some(InventoryError::CapacityExceeded { .. })));
    assert_eq!(h.ledger.availability(h.showings[0]).await.unwrap().held, 0);
    assert_eq!(h.carts.get("dave").await.unwrap().lines.len(), 2);
    assert!(h.finalizer.orders().list_for_user("dave").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_late_success_after_expiry_is_flagged() {
    let h = Harness::new(&[3]).await;
    let order = h.place("erin", 0, 3).await;

    h.clock.advance(Duration::minutes(16));
    assert_eq!(h.finalizer.expire_overdue().await.unwrap(), 1);
    assert_eq!(h.status(&order).await, OrderStatus::Failed);
    assert_eq!(h.ledger.availability(h.showings[0]).await.unwrap().available, 3);

    // seats go to someone else
    h.place("frank", 0, 3).await;

    assert_eq!(
        h.settle(&order).await,
        ReconcileOutcome::Flagged(InconsistencyKind::LateSuccessAfterRelease)
    );
    assert_eq!(h.status(&order).await, OrderStatus::Failed);
    assert_eq!(h.payment_status(&order).await, PaymentStatus::ManualReview);
    assert_eq!(h.settle(&order).await, ReconcileOutcome::Duplicate);

    let flags = h.reconciler.list_flags(false).await.unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].order_id, Some(order.id));

    let (resolved, refund_id) = h.reconciler.resolve(flags[0].id).await.unwrap();
    assert!(resolved.resolved);
    assert!(refund_id.is_some());
    assert_eq!(h.gateway.refund_count(), 1);
    assert_eq!(h.payment_status(&order).await, PaymentStatus::Refunded);
    assert!(h.reconciler.list_flags(false).await.unwrap().is_empty());
    assert!(matches!(
        h.reconciler.resolve(flags[0].id).await,
        Err(FinalizeError::AlreadyResolved(_))
    ));
}

#[tokio::test]
async fn test_late_success_without_sweep_is_flagged() {
    let h = Harness::new(&[2]).await;
    let order = h.place("gina", 0, 2).await;

    h.clock.advance(Duration::minutes(20));
    assert_eq!(
        h.settle(&order).await,
        ReconcileOutcome::Flagged(InconsistencyKind::LateSuccessAfterRelease)
    );

    let stored = h.finalizer.orders().get_order(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    assert_eq!(stored.status_reason.as_deref(), Some("reservation_timeout"));
    let availability = h.ledger.availability(h.showings[0]).await.unwrap();
    assert_eq!(availability.committed, 0);
    assert_eq!(availability.available, 2);
}

#[tokio::test]
async fn test_declined_settlement_releases_holds() {
    let h = Harness::new(&[5]).await;
    let order = h.place("hank", 0, 4).await;
    let transaction_id = h.transaction_of(&order).await;

    let outcome = h
        .reconciler
        .reconcile(SettlementNotice::declined(transaction_id.clone(), None, "insufficient funds"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Applied(OrderStatus::Failed));
    assert_eq!(h.ledger.availability(h.showings[0]).await.unwrap().available, 5);

    // a contradicting success later is parked, not applied
    let outcome = h
        .reconciler
        .reconcile(SettlementNotice::succeeded(transaction_id, Some(order.id)))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Flagged(InconsistencyKind::ConflictingOutcome));
    assert_eq!(h.status(&order).await, OrderStatus::Failed);
}

#[tokio::test]
async fn test_decline_after_paid_does_not_override() {
    let h = Harness::new(&[5]).await;
    let order = h.place("iris", 0, 1).await;
    h.settle(&order).await;

    let transaction_id = h.transaction_of(&order).await;
    let outcome = h
        .reconciler
        .reconcile(SettlementNotice::declined(transaction_id, Some(order.id), "chargeback"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Flagged(InconsistencyKind::ConflictingOutcome));
    assert_eq!(h.status(&order).await, OrderStatus::Paid);
    assert_eq!(h.ledger.availability(h.showings[0]).await.unwrap().committed, 1);
}

#[tokio::test]
async fn test_unknown_transaction_is_flagged_once() {
    let h = Harness::new(&[5]).await;
    let notice = SettlementNotice::succeeded(TransactionId::new("txn_from_nowhere"), None);

    let first = h.reconciler.reconcile(notice.clone()).await.unwrap();
    let second = h.reconciler.reconcile(notice).await.unwrap();
    assert_eq!(first, ReconcileOutcome::Flagged(InconsistencyKind::UnknownTransaction));
    assert_eq!(second, ReconcileOutcome::Duplicate);

    let stray = SettlementNotice::succeeded(TransactionId::new("txn_2"), Some(Uuid::new_v4()));
    assert_eq!(
        h.reconciler.reconcile(stray).await.unwrap(),
        ReconcileOutcome::Flagged(InconsistencyKind::UnknownTransaction)
    );

    // nothing tells us how much to give back, so the flag stays open
    let flags = h.reconciler.list_flags(false).await.unwrap();
    for flag in &flags {
        assert!(matches!(
            h.reconciler.resolve(flag.id).await,
            Err(FinalizeError::RefundAmountUnknown(_))
        ));
    }
    assert_eq!(h.reconciler.list_flags(false).await.unwrap().len(), 2);
    assert_eq!(h.gateway.refund_count(), 0);
}

#[tokio::test]
async fn test_resolved_unknown_decline_is_not_reflagged() {
    let h = Harness::new(&[5]).await;
    let notice = SettlementNotice::declined(TransactionId::new("txn_stray"), None, "do_not_honor");

    assert_eq!(
        h.reconciler.reconcile(notice.clone()).await.unwrap(),
        ReconcileOutcome::Flagged(InconsistencyKind::UnknownTransaction)
    );
    let flags = h.reconciler.list_flags(false).await.unwrap();
    assert_eq!(
        flags[0].outcome,
        SettlementOutcome::Declined { reason: "do_not_honor".to_string() }
    );

    let (resolved, refund_id) = h.reconciler.resolve(flags[0].id).await.unwrap();
    assert!(resolved.resolved);
    assert_eq!(refund_id, None);
    assert_eq!(h.gateway.refund_count(), 0);

    assert_eq!(h.reconciler.reconcile(notice).await.unwrap(), ReconcileOutcome::Duplicate);
    assert!(h.reconciler.list_flags(false).await.unwrap().is_empty());
    assert_eq!(h.reconciler.list_flags(true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_timed_out_charge_that_went_through_is_refunded() {
    let h = Harness::new(&[5]).await;
    h.gateway.fail_next(2);
    h.carts.add_item("quinn", h.showings[0], 2).await.unwrap();

    let result = h
        .finalizer
        .place_order("quinn", Masked::new("tok_visa".to_string()))
        .await;
    assert!(matches!(result, Err(FinalizeError::Gateway(GatewayError::Unavailable(_)))));
    let order = h.finalizer.orders().list_for_user("quinn").await.unwrap().remove(0);
    assert_eq!(order.status, OrderStatus::Failed);

    // the provider did take the money after all
    let transaction_id = TransactionId::new(format!("mock_txn_{}", order.id.simple()));
    let outcome = h
        .reconciler
        .reconcile(SettlementNotice::succeeded(transaction_id.clone(), Some(order.id)))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Flagged(InconsistencyKind::UnknownTransaction));

    let flags = h.reconciler.list_flags(false).await.unwrap();
    assert_eq!(flags[0].outcome, SettlementOutcome::Succeeded);
    let (resolved, refund_id) = h.reconciler.resolve(flags[0].id).await.unwrap();
    assert!(resolved.resolved);
    assert!(refund_id.is_some());
    assert_eq!(h.gateway.refund_count(), 1);

    let payment = h.payments.get_payment_by_order(order.id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.transaction_id, Some(transaction_id));
    assert_eq!(h.status(&order).await, OrderStatus::Failed);
}

#[tokio::test]
async fn test_resolved_chargeback_refunds_once() {
    let h = Harness::new(&[5]).await;
    let order = h.place("rosa", 0, 2).await;
    h.settle(&order).await;

    let transaction_id = h.transaction_of(&order).await;
    let outcome = h
        .reconciler
        .reconcile(SettlementNotice::declined(transaction_id, Some(order.id), "chargeback"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Flagged(InconsistencyKind::ConflictingOutcome));
    assert_eq!(h.payment_status(&order).await, PaymentStatus::ManualReview);

    // parked money is the admin's call, not the customer's
    assert!(matches!(
        h.finalizer.refund(order.id, &owner("rosa")).await,
        Err(FinalizeError::PaymentNotRefundable { status: PaymentStatus::ManualReview, .. })
    ));

    let flags = h.reconciler.list_flags(false).await.unwrap();
    let (_, refund_id) = h.reconciler.resolve(flags[0].id).await.unwrap();
    assert!(refund_id.is_some());
    assert_eq!(h.status(&order).await, OrderStatus::Refunded);
    assert_eq!(h.payment_status(&order).await, PaymentStatus::Refunded);
    assert_eq!(h.ledger.availability(h.showings[0]).await.unwrap().available, 5);
    assert_eq!(h.catalog.get_showing(h.showings[0]).await.unwrap().unwrap().seats_reserved, 0);

    assert!(matches!(
        h.finalizer.refund(order.id, &owner("rosa")).await,
        Err(FinalizeError::Order(OrderError::InvalidTransition { .. }))
    ));
    assert_eq!(h.gateway.refund_count(), 1);
}

#[tokio::test]
async fn test_decline_after_refund_keeps_payment_refunded() {
    let h = Harness::new(&[5]).await;
    let order = h.place("sam", 0, 1).await;
    h.settle(&order).await;
    h.finalizer.refund(order.id, &owner("sam")).await.unwrap();

    let transaction_id = h.transaction_of(&order).await;
    let outcome = h
        .reconciler
        .reconcile(SettlementNotice::declined(transaction_id, Some(order.id), "chargeback"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Flagged(InconsistencyKind::ConflictingOutcome));
    assert_eq!(h.payment_status(&order).await, PaymentStatus::Refunded);

    let flags = h.reconciler.list_flags(false).await.unwrap();
    let (_, refund_id) = h.reconciler.resolve(flags[0].id).await.unwrap();
    assert_eq!(refund_id, None);
    assert_eq!(h.gateway.refund_count(), 1);
}

#[tokio::test]
async fn test_interrupted_refund_resumes_without_paying_twice() {
    let h = Harness::new(&[3]).await;
    let order = h.place("tara", 0, 2).await;
    h.settle(&order).await;

    // gateway refund went out, then the process stopped before the order moved
    let mut payment = h.payments.get_payment_by_order(order.id).await.unwrap().unwrap();
    payment.status = PaymentStatus::Refunded;
    h.payments.update_payment(&payment).await.unwrap();

    let refunded = h.finalizer.refund(order.id, &owner("tara")).await.unwrap();
    assert_eq!(refunded.status, OrderStatus::Refunded);
    assert_eq!(h.gateway.refund_count(), 0);
    assert_eq!(h.ledger.availability(h.showings[0]).await.unwrap().available, 3);
}

#[tokio::test]
async fn test_refund_checks_seats_before_paying_back() {
    let h = Harness::new(&[4]).await;
    let first = h.place("uma", 0, 1).await;
    let second = h.place("vic", 0, 1).await;
    h.settle(&first).await;
    h.settle(&second).await;

    let restarted = Harness::assemble(
        h.clock.clone(),
        h.catalog.clone(),
        h.orders.clone(),
        h.payments.clone(),
        h.cart_store.clone(),
        h.showings.clone(),
    )
    .await;
    // sold-seat count drifted below what the order holds
    restarted
        .ledger
        .release_committed_seats(h.showings[0], 2)
        .await
        .unwrap();

    assert!(matches!(
        restarted.finalizer.refund(first.id, &owner("uma")).await,
        Err(FinalizeError::SeatsNotReturnable { quantity: 1, committed: 0, .. })
    ));
    assert_eq!(restarted.gateway.refund_count(), 0);
    assert_eq!(restarted.status(&first).await, OrderStatus::Paid);
    assert_eq!(restarted.payment_status(&first).await, PaymentStatus::Successful);
}

#[tokio::test]
async fn test_refund_returns_seats() {
    let h = Harness::new(&[3]).await;
    let order = h.place("jack", 0, 3).await;
    h.settle(&order).await;

    assert!(matches!(
        h.finalizer.refund(order.id, &owner("mallory")).await,
        Err(FinalizeError::Forbidden)
    ));

    let refunded = h.finalizer.refund(order.id, &owner("jack")).await.unwrap();
    assert_eq!(refunded.status, OrderStatus::Refunded);
    assert_eq!(h.payment_status(&order).await, PaymentStatus::Refunded);
    assert_eq!(h.ledger.availability(h.showings[0]).await.unwrap().available, 3);
    assert_eq!(h.catalog.get_showing(h.showings[0]).await.unwrap().unwrap().seats_reserved, 0);

    assert!(matches!(
        h.finalizer.refund(order.id, &owner("jack")).await,
        Err(FinalizeError::Order(OrderError::InvalidTransition { .. }))
    ));
}

#[tokio::test]
async fn test_pending_order_cannot_be_refunded_and_is_private() {
    let h = Harness::new(&[3]).await;
    let order = h.place("kate", 0, 1).await;

    assert!(matches!(
        h.finalizer.refund(order.id, &owner("kate")).await,
        Err(FinalizeError::Order(OrderError::InvalidTransition { .. }))
    ));
    assert!(matches!(
        h.finalizer.get_order(order.id, &owner("leo")).await,
        Err(FinalizeError::OrderNotFound(_))
    ));
    let admin = Actor { user_id: "root".to_string(), is_admin: true };
    assert!(h.finalizer.get_order(order.id, &admin).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_finalize_of_one_cart() {
    let h = Harness::new(&[10]).await;
    h.carts.add_item("mia", h.showings[0], 2).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let finalizer = h.finalizer.clone();
        handles.push(tokio::spawn(async move {
            finalizer
                .place_order("mia", Masked::new("tok_visa".to_string()))
                .await
        }));
    }

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(FinalizeError::Cart(CartError::CartNotFound(_)))
            | Err(FinalizeError::Cart(CartError::CheckoutInProgress)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(h.gateway.charge_count(), 1);
    assert_eq!(h.ledger.availability(h.showings[0]).await.unwrap().held, 2);
}

#[tokio::test]
async fn test_recovery_reholds_pending_orders() {
    let h = Harness::new(&[4]).await;
    let pending = h.place("nina", 0, 2).await;
    let paid = h.place("omar", 0, 1).await;
    h.settle(&paid).await;

    let restarted = Harness::assemble(
        h.clock.clone(),
        h.catalog.clone(),
        h.orders.clone(),
        h.payments.clone(),
        h.cart_store.clone(),
        h.showings.clone(),
    )
    .await;
    let availability = restarted.ledger.availability(h.showings[0]).await.unwrap();
    assert_eq!(availability.committed, 1);
    assert_eq!(availability.held, 0);

    let report = restarted.finalizer.recover_pending().await.unwrap();
    assert_eq!(report.reheld, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(restarted.ledger.availability(h.showings[0]).await.unwrap().held, 2);

    assert_eq!(restarted.settle(&pending).await, ReconcileOutcome::Applied(OrderStatus::Paid));
    assert_eq!(restarted.ledger.availability(h.showings[0]).await.unwrap().committed, 3);

    // paid before the restart, refundable after it
    restarted.finalizer.refund(paid.id, &owner("omar")).await.unwrap();
    assert_eq!(restarted.ledger.availability(h.showings[0]).await.unwrap().committed, 2);
}

#[tokio::test]
async fn test_recovery_fails_orders_past_deadline() {
    let h = Harness::new(&[4]).await;
    let order = h.place("pia", 0, 2).await;
    h.clock.advance(Duration::minutes(30));

    let restarted = Harness::assemble(
        h.clock.clone(),
        h.catalog.clone(),
        h.orders.clone(),
        h.payments.clone(),
        h.cart_store.clone(),
        h.showings.clone(),
    )
    .await;
    let report = restarted.finalizer.recover_pending().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(restarted.status(&order).await, OrderStatus::Failed);
}

#[tokio::test]
async fn test_recovery_settles_carts_stuck_in_checkout() {
    let h = Harness::new(&[6]).await;

    // wendy's checkout stopped before an order was written
    h.carts.add_item("wendy", h.showings[0], 2).await.unwrap();
    h.carts.checkout("wendy").await.unwrap();

    // xavier's order was written but the cart was never removed
    let order = h.place("xavier", 0, 1).await;
    let mut leftover = Cart::new("xavier".to_string(), Utc::now());
    leftover.id = order.cart_id;
    leftover.status = CartStatus::CheckingOut;
    h.cart_store.save_cart(&leftover).await.unwrap();

    let restarted = Harness::assemble(
        h.clock.clone(),
        h.catalog.clone(),
        h.orders.clone(),
        h.payments.clone(),
        h.cart_store.clone(),
        h.showings.clone(),
    )
    .await;
    let report = restarted.finalizer.recover_pending().await.unwrap();
    assert_eq!(report.carts_reopened, 1);
    assert_eq!(report.carts_closed, 1);

    let cart = restarted.carts.get("wendy").await.unwrap();
    assert_eq!(cart.status, CartStatus::Open);
    assert_eq!(cart.total_seats(), 2);
    assert!(restarted.carts.get("xavier").await.is_err());
}
