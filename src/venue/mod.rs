//! Venue module - the quoting and trading engine the sniper talks to.
//!
//! [`SwapVenue`] is the seam between the pipeline and whatever prices and submits
//! swaps. The HTTP gateway client is the production implementation; the
//! throttle decorator caps request rate across all candidates.

pub mod http;
pub mod throttle;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Quote;

pub use http::{HttpSwapVenue, HttpVenueConfig};
pub use throttle::ThrottledVenue;

/// Exact-input swap request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapOrder {
    pub token_in: String,
    pub token_out: String,
    pub fee_tier: u32,
    pub exact_in: Decimal,
    pub amount_out_minimum: Decimal,
    pub recipient: String,
}

/// A swap accepted by the venue but not necessarily confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSwap {
    pub transaction_id: String,
}

/// Confirmation of a submitted swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: String,
}

/// Failures reported by a venue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VenueError {
    /// No pool or market exists for the pair yet
    #[error("no market yet: {0}")]
    NoMarket(String),
    /// The venue refused the trade
    #[error("trade rejected: {0}")]
    Rejected(String),
    /// Credentials were refused
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The venue failed internally
    #[error("upstream error: {0}")]
    Upstream(String),
    /// The request never got a response
    #[error("transport error: {0}")]
    Transport(String),
}

impl VenueError {
    /// Whether retrying the same request later can succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, VenueError::Unauthorized(_))
    }
}

/// Quoting and trade submission operations.
#[async_trait]
pub trait SwapVenue: Send + Sync {
    /// Quote an exact-input swap of `amount` base tokens into `target`.
    async fn quote(&self, base: &str, target: &str, amount: Decimal) -> Result<Quote, VenueError>;

    /// Submit a swap; returns once the venue has accepted it.
    async fn submit(&self, order: &SwapOrder) -> Result<PendingSwap, VenueError>;

    /// Wait for a submitted swap to settle.
    async fn wait_for_receipt(&self, pending: &PendingSwap) -> Result<Receipt, VenueError>;
}
