//! CSV purchase ledger.
//!
//! One header line, then one row per purchase. Fields are never quoted, so
//! commas and line breaks inside values are replaced by a space on write.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::ledger::PurchaseLedger;
use crate::types::PurchaseRecord;

pub const HEADER: &str = "tokenName,symbol,vaultAddress,transactionId,buyAmount";

/// Append-only CSV file of purchases.
pub struct CsvLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvLedger {
    /// Open the ledger at `path`, writing the header if the file is new or empty.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_header(&path).await?;

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Create `path` with its header row unless it already holds data.
async fn ensure_header(path: &Path) -> Result<()> {
    let needs_header = match fs::metadata(path).await {
        Ok(meta) => meta.len() == 0,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => return Err(e).with_context(|| format!("Failed to inspect {}", path.display())),
    };
    if !needs_header {
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create ledger directory {}", parent.display()))?;
    }
    let header = encode_row(HEADER.split(','))?;
    fs::write(path, header)
        .await
        .with_context(|| format!("Failed to initialize ledger {}", path.display()))?;
    info!("Created purchase ledger at {}", path.display());
    Ok(())
}

/// Replace separators that would break the row layout.
pub fn sanitize(value: &str) -> String {
    value.replace([',', '\r', '\n'], " ")
}

fn encode_row<I, T>(fields: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(Vec::new());
    writer.write_record(fields).context("Failed to encode ledger row")?;
    writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush ledger row: {}", e.error()))
}

fn to_row(record: &PurchaseRecord) -> Result<Vec<u8>> {
    encode_row([
        sanitize(&record.token_name),
        sanitize(record.symbol.as_deref().unwrap_or("")),
        sanitize(&record.vault_address),
        sanitize(record.transaction_id.as_deref().unwrap_or("")),
        record.buy_amount.to_string(),
    ])
}

fn non_empty(field: &str) -> Option<String> {
    (!field.is_empty()).then(|| field.to_string())
}

fn parse_row(row: &csv::StringRecord) -> Result<PurchaseRecord> {
    if row.len() != 5 {
        bail!("expected 5 fields, found {}", row.len());
    }
    let buy_amount = Decimal::from_str(&row[4]).with_context(|| format!("invalid buy amount {:?}", &row[4]))?;

    Ok(PurchaseRecord {
        token_name: row[0].to_string(),
        symbol: non_empty(&row[1]),
        vault_address: row[2].to_string(),
        transaction_id: non_empty(&row[3]),
        buy_amount,
    })
}

#[async_trait]
impl PurchaseLedger for CsvLedger {
    async fn append(&self, record: &PurchaseRecord) -> Result<()> {
        let row = to_row(record)?;
        let _lock = self.write_lock.lock().await;

        // the file may have been removed or rotated since open
        ensure_header(&self.path).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open ledger {}", self.path.display()))?;
        file.write_all(&row).await.context("Failed to append purchase row")?;
        file.flush().await?;

        debug!("Recorded purchase of {} in {}", record.token_name, self.path.display());
        Ok(())
    }

    async fn records(&self) -> Result<Vec<PurchaseRecord>> {
        let contents = fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read ledger {}", self.path.display()))?;

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .quoting(false)
            .trim(csv::Trim::All)
            .from_reader(contents.as_slice());

        let mut records = Vec::new();
        for (index, row) in reader.records().enumerate() {
            let row = row.with_context(|| format!("Bad ledger row {}", index + 2))?;
            if row.iter().all(str::is_empty) {
                continue;
            }
            records.push(parse_row(&row).with_context(|| format!("Bad ledger row {}", index + 2))?);
        }
        Ok(records)
    }

    async fn close(&self) -> Result<()> {
        // every append opens and flushes its own handle; waiting for the lock
        // lets an in-progress write finish
        let _lock = self.write_lock.lock().await;
        Ok(())
    }
}
