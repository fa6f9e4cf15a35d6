//! Lists launchpad tokens recorded in the purchase ledger.
//!
//! Usage: `holdings [symbol-or-name-filter]`

use anyhow::{Context, Result};
use launch_sniper::config::ledger_from_lookup;
use launch_sniper::ledger::{self, LedgerBackend};
use launch_sniper::portfolio::holdings;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let filter = std::env::args().nth(1);
    let backend = ledger_from_lookup(|key| std::env::var(key).ok()).context("Invalid ledger configuration")?;

    if let LedgerBackend::Csv(path) = &backend {
        if !path.exists() {
            anyhow::bail!("{} not found; nothing to list", path.display());
        }
    }

    let ledger = ledger::open(&backend).await?;
    let records = ledger.records().await?;
    ledger.close().await?;

    let rows = holdings(&records, filter.as_deref());
    println!("Launchpad purchases ({} recorded)", records.len());
    if rows.is_empty() {
        println!(" - none found (check the ledger or filter)");
        return Ok(());
    }
    for row in rows {
        println!(" {}", row);
    }
    Ok(())
}
