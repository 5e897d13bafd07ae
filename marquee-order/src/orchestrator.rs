use marquee_core::{ChargeRequest, GatewayError, PaymentGateway, SettlementNotice, TransactionId};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::reconciler::SettlementQueue;

/// Exponential backoff for gateway transport failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. Handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// delay = initial_delay * multiplier^attempt, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(millis as u64);
        delay.min(self.max_delay)
    }
}

/// Talks to the payment gateway. Retries transport failures, never declines.
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    retry: RetryPolicy,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, retry: RetryPolicy) -> Self {
        Self { gateway, retry }
    }

    pub async fn charge(&self, request: &ChargeRequest) -> Result<TransactionId, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.gateway.charge(request).await {
                Ok(transaction_id) => {
                    info!(
                        order_id = %request.idempotency_key,
                        transaction_id = %transaction_id,
                        attempt,
                        "Charge accepted by gateway"
                    );
                    return Ok(transaction_id);
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        order_id = %request.idempotency_key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Gateway unavailable, retrying charge"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(order_id = %request.idempotency_key, error = %e, "Charge failed");
                    return Err(e);
                }
            }
        }
    }

    pub async fn refund(
        &self,
        transaction_id: &TransactionId,
        amount_cents: i64,
    ) -> Result<String, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.gateway.refund(transaction_id, amount_cents).await {
                Ok(refund_id) => {
                    info!(transaction_id = %transaction_id, refund_id = %refund_id, "Refund issued");
                    return Ok(refund_id);
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(transaction_id = %transaction_id, error = %e, "Refund failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Stand-in gateway for development and tests.
///
/// Token `tok_declined` is declined, `tok_unavailable` always times out, anything
/// else is accepted. When wired to a settlement queue it later reports every
/// accepted charge as settled, like a real provider's webhook would.
pub struct MockPaymentGateway {
    charges: AtomicUsize,
    refunds: AtomicUsize,
    failures_remaining: AtomicU32,
    auto_settle: Option<(SettlementQueue, Duration)>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            charges: AtomicUsize::new(0),
            refunds: AtomicUsize::new(0),
            failures_remaining: AtomicU32::new(0),
            auto_settle: None,
        }
    }

    pub fn with_auto_settle(mut self, queue: SettlementQueue, delay: Duration) -> Self {
        self.auto_settle = Some((queue, delay));
        self
    }

    /// Make the next `n` calls fail as if the provider were unreachable.
    pub fn fail_next(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn charge_count(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<TransactionId, GatewayError> {
        self.charges.fetch_add(1, Ordering::SeqCst);

        if self.take_failure() {
            return Err(GatewayError::Unavailable("simulated timeout".to_string()));
        }
        match request.token.expose().as_str() {
            "tok_declined" => return Err(GatewayError::Declined("card declined".to_string())),
            "tok_unavailable" => {
                return Err(GatewayError::Unavailable("gateway timeout".to_string()))
            }
            _ => {}
        }

        // Same order, same transaction: repeated charges stay idempotent.
        let transaction_id =
            TransactionId::new(format!("mock_txn_{}", request.idempotency_key.simple()));

        if let Some((queue, delay)) = &self.auto_settle {
            let queue = queue.clone();
            let delay = *delay;
            let notice =
                SettlementNotice::succeeded(transaction_id.clone(), Some(request.idempotency_key));
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = queue.enqueue(notice).await {
                    warn!("Mock gateway could not deliver settlement: {}", e);
                }
            });
        }

        Ok(transaction_id)
    }

    async fn refund(
        &self,
        transaction_id: &TransactionId,
        _amount_cents: i64,
    ) -> Result<String, GatewayError> {
        self.refunds.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            return Err(GatewayError::Unavailable("simulated timeout".to_string()));
        }
        Ok(format!("mock_refund_{}", transaction_id))
    }
}
