//! End-to-end tests for the purchase pipeline with a scripted venue

use anyhow::Result;
use async_trait::async_trait;
use launch_sniper::blacklist::Blacklist;
use launch_sniper::ledger::MemoryLedger;
use launch_sniper::pipeline::{
    BackoffSchedule, CandidateFilter, DirectAttempt, ExecutorConfig, InFlightRegistry, PurchaseExecutor,
    PurchaseOutcome, QuoteAcquirer, SnipePipeline,
};
use launch_sniper::venue::{PendingSwap, Receipt, SwapOrder, SwapVenue, VenueError};
use launch_sniper::Quote;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const VAULT: &str = "service|Token$Unit$FOO$none$launchpad";

/// Venue double: quotes fail until `pool_after` calls, submissions replay `submit_errors`.
#[derive(Default)]
struct ScriptedVenue {
    pool_after: usize,
    quotes: AtomicUsize,
    submit_errors: Mutex<Vec<VenueError>>,
    submitted: Mutex<Vec<SwapOrder>>,
    /// When set, quoting waits here until notified
    gate: Option<Arc<Notify>>,
}

impl ScriptedVenue {
    fn submissions(&self) -> Vec<SwapOrder> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SwapVenue for ScriptedVenue {
    async fn quote(&self, _base: &str, _target: &str, _amount: Decimal) -> Result<Quote, VenueError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let call = self.quotes.fetch_add(1, Ordering::SeqCst);
        if call < self.pool_after {
            return Err(VenueError::NoMarket("Pool not found".into()));
        }
        Ok(Quote { output_amount: dec!(1000), fee_tier: 10000 })
    }

    async fn submit(&self, order: &SwapOrder) -> Result<PendingSwap, VenueError> {
        self.submitted.lock().unwrap().push(order.clone());
        if let Some(err) = self.submit_errors.lock().unwrap().pop() {
            return Err(err);
        }
        Ok(PendingSwap { transaction_id: format!("tx-{}", self.submitted.lock().unwrap().len()) })
    }

    async fn wait_for_receipt(&self, pending: &PendingSwap) -> Result<Receipt, VenueError> {
        Ok(Receipt { transaction_hash: format!("hash-{}", pending.transaction_id) })
    }
}

struct Harness {
    pipeline: SnipePipeline,
    registry: InFlightRegistry,
    ledger: Arc<MemoryLedger>,
    venue: Arc<ScriptedVenue>,
}

fn harness(venue: ScriptedVenue, blacklist: Blacklist, max_attempts: u32) -> Harness {
    let venue = Arc::new(venue);
    let ledger = Arc::new(MemoryLedger::new());
    let registry = InFlightRegistry::new();
    let schedule = BackoffSchedule::from_millis(1, 4);

    let quotes = QuoteAcquirer::new(venue.clone(), schedule.clone());
    let attempt = Arc::new(DirectAttempt::new(venue.clone(), quotes, true));
    let config = ExecutorConfig {
        recipient: "eth|0000000000000000000000000000000000000001".to_string(),
        max_attempts,
        retry: schedule,
        ..ExecutorConfig::default()
    };
    let executor = Arc::new(PurchaseExecutor::new(attempt, ledger.clone(), config));
    let filter = CandidateFilter::new(Arc::new(blacklist), registry.clone());

    Harness {
        pipeline: SnipePipeline::new(filter, executor),
        registry,
        ledger,
        venue,
    }
}

fn create_sale() -> Value {
    json!({
        "data": {
            "Data": {
                "functionName": "CreateSale",
                "vaultAddress": VAULT,
                "initialBuyQuantity": "10"
            }
        }
    })
}

#[tokio::test]
async fn test_create_sale_is_bought_end_to_end() -> Result<()> {
    let h = harness(ScriptedVenue { pool_after: 3, ..Default::default() }, Blacklist::default(), 5);

    let handles = h.pipeline.ingest("CreateSale", &create_sale());
    assert_eq!(handles.len(), 1);
    let outcome = handles.into_iter().next().unwrap().await?;

    match outcome {
        Some(PurchaseOutcome::Purchased(fill)) => assert_eq!(fill.transaction_id.as_deref(), Some("tx-1")),
        other => panic!("expected a purchase, got {:?}", other),
    }

    // quoting kept polling until the pool appeared
    assert_eq!(h.venue.quotes.load(Ordering::SeqCst), 4);

    let submitted = h.venue.submissions();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].token_in, "GALA|Unit|none|none");
    assert_eq!(submitted[0].token_out, "Token|Unit|FOO|none");
    assert_eq!(submitted[0].exact_in, dec!(50));
    assert_eq!(submitted[0].amount_out_minimum, dec!(980));

    let rows = h.ledger.snapshot();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].token_name, "FOO");
    assert_eq!(rows[0].symbol.as_deref(), Some("FOO"));
    assert_eq!(rows[0].vault_address, VAULT);
    assert!(h.registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_in_flight_is_rejected_then_reaccepted() -> Result<()> {
    let gate = Arc::new(Notify::new());
    let h = harness(
        ScriptedVenue { gate: Some(gate.clone()), ..Default::default() },
        Blacklist::default(),
        5,
    );

    let first = h.pipeline.ingest("CreateSale", &create_sale());
    assert_eq!(first.len(), 1);
    assert!(h.registry.contains(VAULT));

    // same vault while the first purchase is still quoting
    assert!(h.pipeline.ingest("Bundle", &json!([create_sale()])).is_empty());

    gate.notify_one();
    for handle in first {
        assert!(matches!(handle.await?, Some(PurchaseOutcome::Purchased(_))));
    }
    assert!(h.registry.is_empty());

    let again = h.pipeline.ingest("CreateSale", &create_sale());
    assert_eq!(again.len(), 1);
    gate.notify_one();
    for handle in again {
        handle.await?;
    }
    assert_eq!(h.ledger.snapshot().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_blacklisted_creator_never_registers() -> Result<()> {
    let h = harness(ScriptedVenue::default(), Blacklist::from_entries(["Eth:BadCreator"]), 5);

    let payload = json!({
        "functionName": "CreateSale",
        "vaultAddress": VAULT,
        "creatorAddress": "eth|badcreator"
    });

    assert!(h.pipeline.ingest("CreateSale", &payload).is_empty());
    assert!(h.registry.is_empty());
    assert_eq!(h.venue.quotes.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_transient_submission_failures_stop_at_cap() -> Result<()> {
    let errors = vec![VenueError::Rejected("slippage exceeded".into()); 10];
    let h = harness(
        ScriptedVenue { submit_errors: Mutex::new(errors), ..Default::default() },
        Blacklist::default(),
        3,
    );

    let outcome = h.pipeline.ingest("CreateSale", &create_sale()).remove(0).await?;

    assert!(matches!(outcome, Some(PurchaseOutcome::Failed { attempts: 3, .. })));
    // every attempt re-quotes before submitting
    assert_eq!(h.venue.quotes.load(Ordering::SeqCst), 3);
    assert_eq!(h.venue.submissions().len(), 3);
    assert!(h.ledger.snapshot().is_empty());
    assert!(h.registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() -> Result<()> {
    let h = harness(
        ScriptedVenue {
            submit_errors: Mutex::new(vec![VenueError::Unauthorized("bad api key".into())]),
            ..Default::default()
        },
        Blacklist::default(),
        5,
    );

    let outcome = h.pipeline.ingest("CreateSale", &create_sale()).remove(0).await?;

    assert!(matches!(outcome, Some(PurchaseOutcome::Failed { attempts: 1, .. })));
    assert_eq!(h.venue.submissions().len(), 1);
    assert!(h.registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sibling_launches_run_independently() -> Result<()> {
    let h = harness(ScriptedVenue::default(), Blacklist::default(), 5);

    let payload = json!({
        "events": [
            {"functionName": "CreateSale", "vaultAddress": "service|Token$Unit$AAA$none$launchpad"},
            {"initialBuyQuantity": null, "vault": "service|Token$Unit$BBB$none$launchpad", "tokenName": "Bee"}
        ]
    });

    let handles = h.pipeline.ingest("Bundle", &payload);
    assert_eq!(handles.len(), 2);
    for handle in handles {
        assert!(matches!(handle.await?, Some(PurchaseOutcome::Purchased(_))));
    }

    let mut names: Vec<String> = h.ledger.snapshot().into_iter().map(|r| r.token_name).collect();
    names.sort();
    assert_eq!(names, vec!["AAA".to_string(), "Bee".to_string()]);
    Ok(())
}
