use std::sync::Arc;

use marquee_catalog::InventoryLedger;
use marquee_core::SettlementNotice;
use marquee_order::{OrderFinalizer, PaymentReconciler};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Consume settlement notices until the queue's senders are gone.
pub fn spawn_settlement_consumer(
    reconciler: Arc<PaymentReconciler>,
    receiver: mpsc::Receiver<SettlementNotice>,
) -> JoinHandle<()> {
    tokio::spawn(reconciler.run(receiver))
}

/// Periodically fail unpaid orders past their deadline, then lapse stray
/// holds and prune old reservation records.
pub fn spawn_expiry_sweeper(
    finalizer: Arc<OrderFinalizer>,
    ledger: Arc<InventoryLedger>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Expiry sweeper started, running every {:?}", every);
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            run_sweep(&finalizer, &ledger).await;
        }
    })
}

pub async fn run_sweep(finalizer: &OrderFinalizer, ledger: &InventoryLedger) {
    if let Err(e) = finalizer.expire_overdue().await {
        error!("Failed to expire overdue orders: {}", e);
    }
    let report = ledger.sweep().await;
    if !report.expired.is_empty() {
        info!(expired = report.expired.len(), "Inventory holds lapsed");
    }
}
