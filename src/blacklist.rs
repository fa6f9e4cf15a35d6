//! Blacklist store - addresses that must never be bought.
//!
//! The backing file is a one-column CSV: an `address` header followed by one
//! address per row. Entries are normalized on load so lookups can compare directly.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::vault::normalize_address;

const HEADER: &str = "address";

/// Read-only set of normalized blacklisted addresses.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    entries: HashSet<String>,
}

impl Blacklist {
    /// Build a blacklist from raw (un-normalized) entries.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .filter_map(|raw| normalize_address(raw.as_ref()))
                .collect(),
        }
    }

    /// `true` when `address` (already normalized) is blacklisted.
    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// File-backed blacklist loader.
pub struct BlacklistStore {
    path: PathBuf,
}

impl BlacklistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the backing file with its header row if it does not exist yet.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        std::fs::write(&self.path, format!("{}\n", HEADER))
            .with_context(|| format!("Failed to create blacklist {}", self.path.display()))?;
        info!("Created empty blacklist at {}", self.path.display());
        Ok(())
    }

    /// Load and normalize every entry after the header line.
    pub fn load(&self) -> Result<Blacklist> {
        self.ensure_exists()?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .with_context(|| format!("Failed to read blacklist {}", self.path.display()))?;

        let mut entries = Vec::new();
        for (index, row) in reader.records().enumerate() {
            let row = row.with_context(|| format!("Bad blacklist row {}", index + 2))?;
            if let Some(address) = row.get(0) {
                entries.push(address.to_string());
            }
        }

        let blacklist = Blacklist::from_entries(entries);
        debug!("Parsed {} blacklist entries from {}", blacklist.len(), self.path.display());
        Ok(blacklist)
    }
}
