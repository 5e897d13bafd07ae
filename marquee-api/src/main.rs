use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use marquee_api::{
    app,
    middleware::RateLimits,
    state::{AppState, Backends, Settings},
    worker,
};
use marquee_cart::InMemoryCartRepository;
use marquee_catalog::InMemoryCatalogRepository;
use marquee_core::{Clock, SystemClock};
use marquee_order::{InMemoryOrderRepository, InMemoryPaymentRepository, MockPaymentGateway, SettlementQueue};
use marquee_store::{
    Config, DbClient, PgCartRepository, PgCatalogRepository, PgOrderRepository, PgPaymentRepository, RedisClient,
    StorageBackend,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Marquee API on port {}", config.server.port);

    let redis = match &config.redis {
        Some(redis_config) => {
            let client = RedisClient::new(&redis_config.url)
                .await
                .context("Failed to create Redis client")?;
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("No Redis configured, rate limiting disabled");
            None
        }
    };

    let (backends, business_rules) = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage");
            let backends = Backends {
                catalog: Arc::new(InMemoryCatalogRepository::new()),
                orders: Arc::new(InMemoryOrderRepository::new()),
                payments: Arc::new(InMemoryPaymentRepository::new()),
                carts: Arc::new(InMemoryCartRepository::new()),
                redis,
            };
            (backends, config.business_rules.clone())
        }
        StorageBackend::Postgres => {
            let db_config = config
                .database
                .as_ref()
                .context("storage.backend = \"postgres\" requires a [database] section")?;
            let db = DbClient::new(db_config).await.context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;

            let business_rules = db
                .fetch_business_rules(config.business_rules.clone())
                .await
                .context("Failed to load business rules")?;

            let backends = Backends {
                catalog: Arc::new(PgCatalogRepository::new(db.pool.clone())),
                orders: Arc::new(PgOrderRepository::new(db.pool.clone())),
                payments: Arc::new(PgPaymentRepository::new(db.pool.clone())),
                carts: Arc::new(PgCartRepository::new(db.pool.clone())),
                redis,
            };
            (backends, business_rules)
        }
    };

    let (settlements, settlement_rx) = SettlementQueue::channel(config.payments.settlement_queue_capacity);

    // No real provider is wired in; the mock settles accepted charges itself
    // when an auto-settle delay is configured.
    let mut gateway = MockPaymentGateway::new();
    if let Some(delay_ms) = config.payments.auto_settle_delay_ms {
        gateway = gateway.with_auto_settle(settlements.clone(), Duration::from_millis(delay_ms));
    }

    let settings = Settings {
        ledger: business_rules.ledger_config(),
        pricing: business_rules.pricing_config(),
        retry: config.payments.retry_policy(),
        jwt_secret: config.auth.jwt_secret.clone(),
        webhook_secret: config.payments.webhook_secret.clone(),
        rate_limits: config.redis.as_ref().map_or_else(RateLimits::default, |r| RateLimits {
            general_per_minute: r.rate_limit_per_minute,
            checkout_per_minute: r.checkout_rate_limit_per_minute,
        }),
        event_buffer: config.workers.event_buffer,
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let app_state = AppState::build(backends, settings, Arc::new(gateway), settlements, clock).await?;

    let recovery = app_state
        .finalizer
        .recover_pending()
        .await
        .context("Failed to recover pending orders")?;
    tracing::info!(
        reheld = recovery.reheld,
        failed = recovery.failed,
        carts_reopened = recovery.carts_reopened,
        carts_closed = recovery.carts_closed,
        "Pending orders recovered"
    );

    worker::spawn_settlement_consumer(app_state.reconciler.clone(), settlement_rx);
    worker::spawn_expiry_sweeper(
        app_state.finalizer.clone(),
        app_state.ledger.clone(),
        Duration::from_secs(config.workers.sweep_interval_seconds.max(1)),
    );

    let app = app(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
