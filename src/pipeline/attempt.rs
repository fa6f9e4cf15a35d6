//! A single purchase attempt: quote, bound, submit, confirm.
//!
//! The executor retries whole attempts, so everything an attempt needs lives in
//! the [`PurchaseOrder`] and every attempt re-quotes from scratch.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::pipeline::quote::QuoteAcquirer;
use crate::pipeline::registry::InFlightGuard;
use crate::types::{LaunchEvent, PurchaseState};
use crate::venue::{PendingSwap, SwapOrder, SwapVenue, VenueError};

/// How much of the quoted output must be received for the swap to go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slippage {
    /// Accept at least `quote * fraction` (e.g. 0.98)
    AcceptFraction(Decimal),
    /// Accept at most this fractional shortfall, i.e. `quote * (1 - tolerance)`
    Tolerance(Decimal),
}

impl Slippage {
    /// Minimum acceptable output for a quoted amount.
    pub fn min_output(&self, quoted: Decimal) -> Decimal {
        quoted * self.accept_fraction()
    }

    pub fn accept_fraction(&self) -> Decimal {
        match self {
            Slippage::AcceptFraction(fraction) => *fraction,
            Slippage::Tolerance(tolerance) => Decimal::ONE - *tolerance,
        }
    }

    pub fn tolerance(&self) -> Decimal {
        Decimal::ONE - self.accept_fraction()
    }
}

impl Default for Slippage {
    fn default() -> Self {
        Slippage::AcceptFraction(Decimal::new(98, 2))
    }
}

/// Everything needed to buy one launch.
#[derive(Debug, Clone)]
pub struct PurchaseOrder {
    pub event: LaunchEvent,
    pub label: String,
    pub base_token: String,
    /// Tradable token id derived from the vault
    pub target_token: String,
    pub buy_amount: Decimal,
    pub slippage: Slippage,
    /// Wallet receiving the bought tokens
    pub recipient: String,
}

/// Result of settling a submitted swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { transaction_hash: String },
    Failed(String),
    NotAwaited,
}

/// A purchase the venue accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    pub transaction_id: Option<String>,
    pub confirmation: Confirmation,
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("quote unavailable: {0}")]
    Quote(VenueError),
    #[error("submission failed: {0}")]
    Submission(VenueError),
    #[error("buy command failed (exit {status:?}): {reason}")]
    Subprocess { status: Option<i32>, reason: String },
    #[error("buy command could not be started: {0}")]
    Launch(String),
}

impl AttemptError {
    /// Transient failures are worth another full attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Quote(_) => true,
            AttemptError::Submission(e) => e.is_transient(),
            AttemptError::Subprocess { .. } => true,
            AttemptError::Launch(_) => false,
        }
    }
}

/// One try at buying an order.
#[async_trait]
pub trait PurchaseAttempt: Send + Sync {
    /// Run the attempt, reporting progress through `guard`.
    async fn run(&self, order: &PurchaseOrder, guard: &InFlightGuard) -> Result<Fill, AttemptError>;
}

/// Buys through the venue API in-process.
pub struct DirectAttempt {
    venue: Arc<dyn SwapVenue>,
    quotes: QuoteAcquirer,
    await_confirmation: bool,
}

impl DirectAttempt {
    pub fn new(venue: Arc<dyn SwapVenue>, quotes: QuoteAcquirer, await_confirmation: bool) -> Self {
        Self {
            venue,
            quotes,
            await_confirmation,
        }
    }

    async fn confirm(&self, order: &PurchaseOrder, pending: &PendingSwap) -> Confirmation {
        if !self.await_confirmation {
            return Confirmation::NotAwaited;
        }
        match self.venue.wait_for_receipt(pending).await {
            Ok(receipt) => {
                info!("Confirmed {} | hash={}", order.label, receipt.transaction_hash);
                Confirmation::Confirmed {
                    transaction_hash: receipt.transaction_hash,
                }
            }
            Err(e) => {
                error!("Wait for {} confirmation failed: {}", order.label, e);
                Confirmation::Failed(e.to_string())
            }
        }
    }
}

#[async_trait]
impl PurchaseAttempt for DirectAttempt {
    #[instrument(skip_all, fields(token = %order.label))]
    async fn run(&self, order: &PurchaseOrder, guard: &InFlightGuard) -> Result<Fill, AttemptError> {
        guard.set_state(PurchaseState::Quoting);
        let quote = self
            .quotes
            .acquire(&order.base_token, &order.target_token, order.buy_amount, &order.label)
            .await
            .map_err(AttemptError::Quote)?;

        let min_out = order.slippage.min_output(quote.output_amount);
        info!(
            "Buying {} of {} at fee {}; minOut={}",
            order.buy_amount, order.label, quote.fee_tier, min_out
        );

        guard.set_state(PurchaseState::Submitting);
        let swap = SwapOrder {
            token_in: order.base_token.clone(),
            token_out: order.target_token.clone(),
            fee_tier: quote.fee_tier,
            exact_in: order.buy_amount,
            amount_out_minimum: min_out,
            recipient: order.recipient.clone(),
        };
        let pending = self
            .venue
            .submit(&swap)
            .await
            .map_err(AttemptError::Submission)?;
        info!("Swap submitted for {} | txId={}", order.label, pending.transaction_id);

        let confirmation = self.confirm(order, &pending).await;
        Ok(Fill {
            transaction_id: Some(pending.transaction_id),
            confirmation,
        })
    }
}
