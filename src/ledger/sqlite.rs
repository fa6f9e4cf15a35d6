//! SQLite purchase ledger.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, Pool, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

use crate::ledger::PurchaseLedger;
use crate::types::PurchaseRecord;

#[derive(FromRow)]
struct PurchaseRow {
    token_name: String,
    symbol: Option<String>,
    vault_address: String,
    transaction_id: Option<String>,
    buy_amount: String, // decimal text, exact
}

impl PurchaseRow {
    fn into_record(self) -> Result<PurchaseRecord> {
        let buy_amount = Decimal::from_str(&self.buy_amount)
            .with_context(|| format!("Invalid buy_amount {:?} in purchases table", self.buy_amount))?;
        Ok(PurchaseRecord {
            token_name: self.token_name,
            symbol: self.symbol,
            vault_address: self.vault_address,
            transaction_id: self.transaction_id,
            buy_amount,
        })
    }
}

/// Purchase ledger stored in a `purchases` table.
pub struct SqliteLedger {
    pool: Pool<Sqlite>,
}

impl SqliteLedger {
    /// Connect to `url` (e.g. `sqlite:purchases.db?mode=rwc` or `sqlite::memory:`)
    /// and create the schema if needed.
    pub async fn connect(url: &str) -> Result<Self> {
        // every connection to an in-memory database is a separate database
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .with_context(|| format!("Failed to connect to SQLite database {}", url))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS purchases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token_name TEXT NOT NULL,
                symbol TEXT,
                vault_address TEXT NOT NULL,
                transaction_id TEXT,
                buy_amount TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await
        .context("Failed to create purchases table")?;

        info!("SQLite purchase ledger connected to {}", url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl PurchaseLedger for SqliteLedger {
    async fn append(&self, record: &PurchaseRecord) -> Result<()> {
        debug!("Inserting purchase record for {}", record.vault_address);

        sqlx::query(
            r#"
            INSERT INTO purchases (token_name, symbol, vault_address, transaction_id, buy_amount, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?);
            "#,
        )
        .bind(&record.token_name)
        .bind(&record.symbol)
        .bind(&record.vault_address)
        .bind(&record.transaction_id)
        .bind(record.buy_amount.to_string())
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to insert purchase record")?;

        Ok(())
    }

    async fn records(&self) -> Result<Vec<PurchaseRecord>> {
        let rows: Vec<PurchaseRow> = sqlx::query_as(
            "SELECT token_name, symbol, vault_address, transaction_id, buy_amount FROM purchases ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch purchase records")?;

        rows.into_iter().map(PurchaseRow::into_record).collect()
    }

    async fn record_count(&self) -> Result<usize> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM purchases")
            .fetch_one(&self.pool)
            .await
            .context("Failed to get purchase count")?;
        Ok(count.0 as usize)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
