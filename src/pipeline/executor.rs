//! Purchase executor - drives one accepted candidate to a terminal state.
//!
//! Each candidate gets a bounded number of full attempts (re-quote and
//! re-submit) spaced by the shared backoff schedule. Successes are recorded in
//! the ledger; failures end with a log line and never escalate.

use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_retry::RetryIf;
use tracing::{error, info, instrument, warn};

use crate::ledger::PurchaseLedger;
use crate::pipeline::attempt::{AttemptError, Fill, PurchaseAttempt, PurchaseOrder, Slippage};
use crate::pipeline::backoff::BackoffSchedule;
use crate::pipeline::registry::InFlightGuard;
use crate::types::{LaunchEvent, PurchaseRecord};
use crate::vault::token_id_from_vault;

/// Trade parameters shared by every candidate.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub base_token: String,
    pub buy_amount: Decimal,
    pub slippage: Slippage,
    pub recipient: String,
    /// Total attempts per candidate, including the first
    pub max_attempts: u32,
    pub retry: BackoffSchedule,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_token: "GALA|Unit|none|none".to_string(),
            buy_amount: Decimal::new(50, 0),
            slippage: Slippage::default(),
            recipient: String::new(),
            max_attempts: 5,
            retry: BackoffSchedule::from_millis(250, 6000),
        }
    }
}

/// Terminal state of one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased(Fill),
    Failed { attempts: u32, reason: String },
    /// The candidate could not be traded at all (e.g. unparseable vault)
    Skipped(String),
}

impl PurchaseOutcome {
    pub fn is_purchased(&self) -> bool {
        matches!(self, PurchaseOutcome::Purchased(_))
    }
}

pub struct PurchaseExecutor {
    attempt: Arc<dyn PurchaseAttempt>,
    ledger: Arc<dyn PurchaseLedger>,
    config: ExecutorConfig,
}

impl PurchaseExecutor {
    pub fn new(attempt: Arc<dyn PurchaseAttempt>, ledger: Arc<dyn PurchaseLedger>, config: ExecutorConfig) -> Self {
        Self {
            attempt,
            ledger,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Buy `event`, consuming its registry guard.
    ///
    /// The guard is dropped when this returns, which frees the vault for future
    /// events whatever the outcome.
    #[instrument(skip_all, fields(vault = %event.vault_address))]
    pub async fn execute(&self, event: LaunchEvent, guard: InFlightGuard) -> PurchaseOutcome {
        let label = event.label();

        let Some(target_token) = token_id_from_vault(&event.vault_address) else {
            warn!("Could not derive a tradable token id for {} from {}", label, event.vault_address);
            return PurchaseOutcome::Skipped(format!("unrecognized vault {}", event.vault_address));
        };

        let order = PurchaseOrder {
            label: label.clone(),
            base_token: self.config.base_token.clone(),
            target_token,
            buy_amount: self.config.buy_amount,
            slippage: self.config.slippage,
            recipient: self.config.recipient.clone(),
            event,
        };

        match self.run_attempts(&order, &guard).await {
            Ok(fill) => {
                self.record(&order, &fill).await;
                PurchaseOutcome::Purchased(fill)
            }
            Err((attempts, e)) => {
                error!("Giving up on {} after {} attempt(s): {}", label, attempts, e);
                PurchaseOutcome::Failed {
                    attempts,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn run_attempts(&self, order: &PurchaseOrder, guard: &InFlightGuard) -> Result<Fill, (u32, AttemptError)> {
        let max_attempts = self.config.max_attempts.max(1);
        let retries = (max_attempts - 1) as usize;
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let attempt = self.attempt.as_ref();
        let schedule = &self.config.retry;

        let result = RetryIf::spawn(
            schedule.clone().take(retries),
            move || async move {
                let n = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                info!("Purchase attempt {}/{} for {}", n, max_attempts, order.label);
                let outcome = attempt.run(order, guard).await;
                if let Err(e) = &outcome {
                    if e.is_retryable() && n < max_attempts {
                        warn!(
                            "Attempt {} for {} failed: {}; retrying in {}ms",
                            n,
                            order.label,
                            e,
                            schedule.delay_for(n).as_millis()
                        );
                    } else {
                        warn!("Attempt {} for {} failed: {}", n, order.label, e);
                    }
                }
                outcome
            },
            |e: &AttemptError| e.is_retryable(),
        )
        .await;

        result.map_err(|e| (attempts.load(Ordering::Relaxed), e))
    }

    async fn record(&self, order: &PurchaseOrder, fill: &Fill) {
        let record = PurchaseRecord::for_event(&order.event, fill.transaction_id.clone(), order.buy_amount);
        match self.ledger.append(&record).await {
            Ok(()) => info!(
                "Bought {} | txId={}",
                order.label,
                fill.transaction_id.as_deref().unwrap_or("unknown")
            ),
            Err(e) => error!("Bought {} but failed to record it: {:#}", order.label, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryLedger;
    use crate::pipeline::attempt::Confirmation;
    use crate::pipeline::registry::InFlightRegistry;
    use crate::venue::VenueError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed list of results, then succeeds.
    struct Scripted {
        results: Mutex<Vec<Result<Fill, AttemptError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(mut results: Vec<Result<Fill, AttemptError>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl PurchaseAttempt for Scripted {
        async fn run(&self, _order: &PurchaseOrder, _guard: &InFlightGuard) -> Result<Fill, AttemptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.lock().unwrap().pop().unwrap_or_else(|| Ok(fill("tx-final")))
        }
    }

    fn fill(tx: &str) -> Fill {
        Fill {
            transaction_id: Some(tx.to_string()),
            confirmation: Confirmation::NotAwaited,
        }
    }

    fn event() -> LaunchEvent {
        LaunchEvent {
            token_name: "FOO".to_string(),
            symbol: Some("FOO".to_string()),
            vault_address: "service|Token$Unit$FOO$none$launchpad".to_string(),
            creator_address: None,
            additional_key: None,
        }
    }

    fn config(max_attempts: u32) -> ExecutorConfig {
        ExecutorConfig {
            max_attempts,
            retry: BackoffSchedule::from_millis(1, 2),
            recipient: "eth|abc".to_string(),
            ..ExecutorConfig::default()
        }
    }

    fn transient() -> AttemptError {
        AttemptError::Submission(VenueError::Rejected("insufficient liquidity".into()))
    }

    #[tokio::test]
    async fn test_success_is_recorded_and_guard_released() {
        let registry = InFlightRegistry::new();
        let ledger = Arc::new(MemoryLedger::new());
        let attempt = Arc::new(Scripted::new(vec![Ok(fill("tx-1"))]));
        let executor = PurchaseExecutor::new(attempt.clone(), ledger.clone(), config(5));

        let guard = registry.try_register(&event().vault_address).unwrap();
        let outcome = executor.execute(event(), guard).await;

        assert_eq!(outcome, PurchaseOutcome::Purchased(fill("tx-1")));
        assert!(registry.is_empty());
        let rows = ledger.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].transaction_id.as_deref(), Some("tx-1"));
        assert_eq!(rows[0].buy_amount, Decimal::new(50, 0));
    }

    #[tokio::test]
    async fn test_transient_failures_retry_up_to_cap() {
        let registry = InFlightRegistry::new();
        let ledger = Arc::new(MemoryLedger::new());
        let attempt = Arc::new(Scripted::new(vec![Err(transient()); 10]));
        let executor = PurchaseExecutor::new(attempt.clone(), ledger.clone(), config(3));

        let guard = registry.try_register(&event().vault_address).unwrap();
        let outcome = executor.execute(event(), guard).await;

        assert!(matches!(outcome, PurchaseOutcome::Failed { attempts: 3, .. }));
        assert_eq!(attempt.calls.load(Ordering::SeqCst), 3);
        assert!(ledger.snapshot().is_empty());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let ledger = Arc::new(MemoryLedger::new());
        let attempt = Arc::new(Scripted::new(vec![Err(transient()), Ok(fill("tx-2"))]));
        let executor = PurchaseExecutor::new(attempt.clone(), ledger.clone(), config(5));

        let registry = InFlightRegistry::new();
        let guard = registry.try_register("v").unwrap();
        let outcome = executor.execute(event(), guard).await;

        assert!(outcome.is_purchased());
        assert_eq!(attempt.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_immediately() {
        let ledger = Arc::new(MemoryLedger::new());
        let attempt = Arc::new(Scripted::new(vec![Err(AttemptError::Submission(
            VenueError::Unauthorized("bad key".into()),
        ))]));
        let executor = PurchaseExecutor::new(attempt.clone(), ledger.clone(), config(5));

        let registry = InFlightRegistry::new();
        let guard = registry.try_register("v").unwrap();
        let outcome = executor.execute(event(), guard).await;

        assert!(matches!(outcome, PurchaseOutcome::Failed { attempts: 1, .. }));
        assert_eq!(attempt.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unparseable_vault_is_skipped_without_attempts() {
        let ledger = Arc::new(MemoryLedger::new());
        let attempt = Arc::new(Scripted::new(Vec::new()));
        let executor = PurchaseExecutor::new(attempt.clone(), ledger.clone(), config(5));

        let registry = InFlightRegistry::new();
        let mut bad = event();
        bad.vault_address = "service|weird-launchpad-vault".to_string();
        let guard = registry.try_register(&bad.vault_address).unwrap();
        let outcome = executor.execute(bad, guard).await;

        assert!(matches!(outcome, PurchaseOutcome::Skipped(_)));
        assert_eq!(attempt.calls.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }
}
