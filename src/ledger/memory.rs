//! In-memory ledger for tests and dry runs.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

use crate::ledger::PurchaseLedger;
use crate::types::PurchaseRecord;

#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<PurchaseRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far.
    pub fn snapshot(&self) -> Vec<PurchaseRecord> {
        self.records.lock().map(|records| records.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PurchaseLedger for MemoryLedger {
    async fn append(&self, record: &PurchaseRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("memory ledger lock poisoned"))?
            .push(record.clone());
        Ok(())
    }

    async fn records(&self) -> Result<Vec<PurchaseRecord>> {
        Ok(self.snapshot())
    }
}
