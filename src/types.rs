//! Core types and data structures for the launch sniper.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Marker substring that identifies vaults owned by the launchpad sale mechanism.
pub const SALE_MARKER: &str = "launchpad";

/// Operation name announced when a new sale is created (compared case-insensitively).
pub const CREATE_SALE_OPERATION: &str = "createsale";

/// A "sale created" announcement extracted from the event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchEvent {
    /// Human readable token name, falls back to the symbol or `"unknown"`
    pub token_name: String,
    /// Ticker symbol, when one could be resolved
    pub symbol: Option<String>,
    /// Venue vault identifier, always contains [`SALE_MARKER`]
    pub vault_address: String,
    /// Address of the sale creator
    pub creator_address: Option<String>,
    /// Secondary token key (category disambiguator)
    pub additional_key: Option<String>,
}

impl LaunchEvent {
    /// Short label used in log lines for this candidate.
    pub fn label(&self) -> String {
        self.symbol
            .clone()
            .or_else(|| crate::vault::symbol_from_vault(&self.vault_address))
            .unwrap_or_else(|| self.token_name.clone())
    }
}

/// Price quote for an exact-input swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Tokens expected out for the quoted input
    pub output_amount: Decimal,
    /// Pool fee tier the quote was priced against
    pub fee_tier: u32,
}

/// One successful purchase as persisted in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub token_name: String,
    pub symbol: Option<String>,
    pub vault_address: String,
    /// Transaction id recovered from the trade, if any
    pub transaction_id: Option<String>,
    /// Amount of base token spent
    pub buy_amount: Decimal,
}

impl PurchaseRecord {
    /// Build the ledger row for a purchase of `event`.
    pub fn for_event(event: &LaunchEvent, transaction_id: Option<String>, buy_amount: Decimal) -> Self {
        Self {
            token_name: event.token_name.clone(),
            symbol: event.symbol.clone(),
            vault_address: event.vault_address.clone(),
            transaction_id,
            buy_amount,
        }
    }
}

/// Lifecycle marker stored in the in-flight registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseState {
    /// Accepted by the filter, executor not started yet
    Pending,
    /// Waiting for a tradable quote
    Quoting,
    /// Swap submitted or being submitted
    Submitting,
}

impl PurchaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseState::Pending => "pending",
            PurchaseState::Quoting => "quoting",
            PurchaseState::Submitting => "submitting",
        }
    }
}
