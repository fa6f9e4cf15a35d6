//! Purchase ledger - append-only record of successful buys.
//!
//! [`PurchaseLedger`] is the persistence contract; the CSV store is the default
//! backend and SQLite is available for deployments that prefer a database.

pub mod csv;
pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::types::PurchaseRecord;

pub use self::csv::CsvLedger;
pub use self::memory::MemoryLedger;
pub use self::sqlite::SqliteLedger;

/// Persistence contract for purchase records.
#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    /// Append one record. No deduplication is performed.
    async fn append(&self, record: &PurchaseRecord) -> Result<()>;

    /// All records in insertion order.
    async fn records(&self) -> Result<Vec<PurchaseRecord>>;

    /// Number of stored records.
    async fn record_count(&self) -> Result<usize> {
        Ok(self.records().await?.len())
    }

    /// Flush and release the backend.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Which ledger implementation to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerBackend {
    Csv(PathBuf),
    Sqlite(String),
}

/// Open (and initialize if needed) the configured ledger.
pub async fn open(backend: &LedgerBackend) -> Result<Arc<dyn PurchaseLedger>> {
    let ledger: Arc<dyn PurchaseLedger> = match backend {
        LedgerBackend::Csv(path) => Arc::new(CsvLedger::open(path).await?),
        LedgerBackend::Sqlite(url) => Arc::new(SqliteLedger::connect(url).await?),
    };
    Ok(ledger)
}
