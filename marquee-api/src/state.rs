use std::sync::Arc;

use anyhow::Context;
use marquee_cart::{CartManager, CartRepository};
use marquee_catalog::{CatalogRepository, InventoryLedger, LedgerConfig, PricingConfig, PricingEngine};
use marquee_core::{Clock, PaymentGateway};
use marquee_order::{
    EventPublisher, FinalizerDeps, OrderFinalizer, OrderRepository, PaymentOrchestrator,
    PaymentReconciler, PaymentRepository, RetryPolicy, SettlementQueue,
};
use marquee_store::RedisClient;

use crate::middleware::{RateLimits, Resiliency};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogRepository>,
    pub ledger: Arc<InventoryLedger>,
    pub carts: Arc<CartManager>,
    pub finalizer: Arc<OrderFinalizer>,
    pub reconciler: Arc<PaymentReconciler>,
    pub payments: Arc<dyn PaymentRepository>,
    pub settlements: SettlementQueue,
    pub events: EventPublisher,
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limits: RateLimits,
    pub auth: AuthConfig,
    pub webhook_secret: String,
    pub resiliency: Arc<Resiliency>,
}

/// Storage handles the service runs on, in-memory or PostgreSQL.
pub struct Backends {
    pub catalog: Arc<dyn CatalogRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub carts: Arc<dyn CartRepository>,
    pub redis: Option<Arc<RedisClient>>,
}

pub struct Settings {
    pub ledger: LedgerConfig,
    pub pricing: PricingConfig,
    pub retry: RetryPolicy,
    pub jwt_secret: String,
    pub webhook_secret: String,
    pub rate_limits: RateLimits,
    pub event_buffer: usize,
}

impl AppState {
    /// Wire the ledger, cart manager, finalizer and reconciler together.
    /// Every showing in the catalog is registered with the ledger, seeded
    /// with the seats already sold.
    pub async fn build(
        backends: Backends,
        settings: Settings,
        gateway: Arc<dyn PaymentGateway>,
        settlements: SettlementQueue,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let ledger = Arc::new(InventoryLedger::new(settings.ledger, clock.clone()));
        let showings = backends
            .catalog
            .list_showings(None)
            .await
            .context("Failed to load showings")?;
        for showing in &showings {
            ledger
                .register_showing(showing.id, showing.capacity, showing.seats_reserved)
                .await
                .with_context(|| format!("Failed to register showing {}", showing.id))?;
        }
        tracing::info!(showings = showings.len(), "Inventory ledger seeded from catalog");

        let carts = Arc::new(CartManager::new(backends.carts, ledger.clone()));
        let events = EventPublisher::new(settings.event_buffer);
        let pricing = PricingEngine::new(settings.pricing).context("Invalid pricing rules")?;
        let orchestrator = Arc::new(PaymentOrchestrator::new(gateway, settings.retry));

        let finalizer = Arc::new(OrderFinalizer::new(FinalizerDeps {
            carts: carts.clone(),
            ledger: ledger.clone(),
            catalog: backends.catalog.clone(),
            orders: backends.orders,
            payments: backends.payments.clone(),
            orchestrator,
            pricing,
            events: events.clone(),
            clock: clock.clone(),
        }));
        let reconciler = Arc::new(PaymentReconciler::new(
            finalizer.clone(),
            backends.payments.clone(),
            clock,
        ));

        Ok(Self {
            catalog: backends.catalog,
            ledger,
            carts,
            finalizer,
            reconciler,
            payments: backends.payments,
            settlements,
            events,
            redis: backends.redis,
            rate_limits: settings.rate_limits,
            auth: AuthConfig {
                secret: settings.jwt_secret,
            },
            webhook_secret: settings.webhook_secret,
            resiliency: Arc::new(Resiliency::default()),
        })
    }
}
