//! launch-sniper - buys newly created launchpad tokens as soon as they are announced.
//!
//! A feed client receives pub/sub events, the detector pulls launch announcements
//! out of arbitrarily nested payloads, and the purchase pipeline filters,
//! deduplicates, quotes and buys each candidate on its own task, recording every
//! successful buy in an append-only ledger.

pub mod blacklist;
pub mod config;
pub mod detect;
pub mod ledger;
pub mod pipeline;
pub mod portfolio;
pub mod transport;
pub mod types;
pub mod vault;
pub mod venue;

// Re-export main types for convenience
pub use config::{ConfigError, SniperConfig, TradeRoute};
pub use types::{LaunchEvent, PurchaseRecord, PurchaseState, Quote};
