//! Pipeline coordinator - turns detected launches into purchase tasks.

use futures_util::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::detect::PayloadWalker;
use crate::pipeline::executor::{PurchaseExecutor, PurchaseOutcome};
use crate::pipeline::filter::CandidateFilter;
use crate::pipeline::registry::InFlightRegistry;
use crate::types::LaunchEvent;

/// Filters launch events and runs each accepted one on its own task.
#[derive(Clone)]
pub struct SnipePipeline {
    filter: CandidateFilter,
    executor: Arc<PurchaseExecutor>,
}

impl SnipePipeline {
    pub fn new(filter: CandidateFilter, executor: Arc<PurchaseExecutor>) -> Self {
        Self { filter, executor }
    }

    pub fn registry(&self) -> &InFlightRegistry {
        self.filter.registry()
    }

    /// Walk one feed payload and dispatch every launch found in it.
    ///
    /// Returns the handles of the purchases started; dropping them detaches the tasks.
    pub fn ingest(&self, source: &str, payload: &Value) -> Vec<JoinHandle<Option<PurchaseOutcome>>> {
        let mut started = Vec::new();
        PayloadWalker::new().walk(payload, |event| {
            if let Some(handle) = self.dispatch(event, source) {
                started.push(handle);
            }
        });
        started
    }

    /// Filter `event` and, if accepted, spawn its purchase without waiting.
    ///
    /// `source` names the feed event the candidate came from. The task yields
    /// `None` if the purchase panicked; the panic is logged here and the
    /// registry entry is still released.
    pub fn dispatch(&self, event: LaunchEvent, source: &str) -> Option<JoinHandle<Option<PurchaseOutcome>>> {
        let guard = self.filter.should_process(&event).ok()?;
        debug!("Accepted {} from {}", event.label(), source);

        let executor = Arc::clone(&self.executor);
        let source = source.to_string();
        Some(tokio::spawn(async move {
            match AssertUnwindSafe(executor.execute(event, guard)).catch_unwind().await {
                Ok(outcome) => Some(outcome),
                Err(panic) => {
                    error!("Unhandled error processing {}: {}", source, panic_message(panic.as_ref()));
                    None
                }
            }
        }))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blacklist::Blacklist;
    use crate::ledger::memory::MemoryLedger;
    use crate::pipeline::attempt::{AttemptError, Fill, PurchaseAttempt, PurchaseOrder};
    use crate::pipeline::executor::ExecutorConfig;
    use crate::pipeline::registry::InFlightGuard;
    use async_trait::async_trait;

    struct Exploding;

    #[async_trait]
    impl PurchaseAttempt for Exploding {
        async fn run(&self, _order: &PurchaseOrder, _guard: &InFlightGuard) -> Result<Fill, AttemptError> {
            panic!("venue client blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_purchase_is_contained() {
        let registry = InFlightRegistry::new();
        let filter = CandidateFilter::new(Arc::new(Blacklist::default()), registry.clone());
        let executor = PurchaseExecutor::new(
            Arc::new(Exploding),
            Arc::new(MemoryLedger::new()),
            ExecutorConfig::default(),
        );
        let pipeline = SnipePipeline::new(filter, Arc::new(executor));

        let event = LaunchEvent {
            token_name: "FOO".to_string(),
            symbol: Some("FOO".to_string()),
            vault_address: "service|Token$Unit$FOO$none$launchpad".to_string(),
            creator_address: None,
            additional_key: None,
        };

        let handle = pipeline.dispatch(event.clone(), "CreateSale").unwrap();
        assert_eq!(handle.await.unwrap(), None);
        assert!(registry.is_empty());

        // the vault is free again after the panic
        assert!(pipeline.dispatch(event, "CreateSale").is_some());
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
