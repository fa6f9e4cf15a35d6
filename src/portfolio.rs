//! Holdings report over the purchase ledger.
//!
//! Lists what the sniper bought, with the tradable token id recovered from each
//! vault. Balances are not queried.

use std::fmt;

use crate::types::PurchaseRecord;
use crate::vault::{lenient_token_id, token_id_from_vault};

/// One recorded purchase as shown in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub name: String,
    pub symbol: String,
    pub token_id: String,
    pub transaction_id: Option<String>,
}

impl Holding {
    pub fn from_record(record: &PurchaseRecord) -> Self {
        let token_id = token_id_from_vault(&record.vault_address)
            .or_else(|| lenient_token_id(&record.vault_address))
            .unwrap_or_else(|| record.vault_address.clone());
        let name = if record.token_name.is_empty() {
            record.symbol.clone().unwrap_or_else(|| "unknown".to_string())
        } else {
            record.token_name.clone()
        };

        Self {
            name,
            symbol: record.symbol.clone().unwrap_or_else(|| "unknown".to_string()),
            token_id,
            transaction_id: record.transaction_id.clone(),
        }
    }
}

impl fmt::Display for Holding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "- {} ({}) [{}] tx={}",
            self.name,
            self.symbol,
            self.token_id,
            self.transaction_id.as_deref().unwrap_or("unknown")
        )
    }
}

fn matches_filter(record: &PurchaseRecord, filter: &str) -> bool {
    let needle = filter.to_uppercase();
    record
        .symbol
        .as_deref()
        .is_some_and(|symbol| symbol.to_uppercase().contains(&needle))
        || record.token_name.to_uppercase().contains(&needle)
}

/// Holdings matching `filter` (case-insensitive, symbol or name), sorted by name.
pub fn holdings(records: &[PurchaseRecord], filter: Option<&str>) -> Vec<Holding> {
    let filter = filter.map(str::trim).filter(|f| !f.is_empty());
    let mut holdings: Vec<Holding> = records
        .iter()
        .filter(|record| filter.map_or(true, |f| matches_filter(record, f)))
        .map(Holding::from_record)
        .collect();
    holdings.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    holdings
}
