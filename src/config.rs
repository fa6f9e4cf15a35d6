//! Runtime configuration loaded from the environment.
//!
//! `.env` is read by the binary before [`SniperConfig::from_env`] runs; every
//! setting has a default except the wallet credentials.

use nonempty::NonEmpty;
use rust_decimal::Decimal;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::ledger::LedgerBackend;
use crate::pipeline::{BackoffSchedule, BuyCommand, ExecutorConfig, Slippage};
use crate::transport::FeedConfig;
use crate::venue::HttpVenueConfig;

pub const DEFAULT_FEED_URL: &str = "wss://bundle-backend-prod1.defi.gala.com";
pub const DEFAULT_BASE_TOKEN: &str = "GALA|Unit|none|none";

/// Configuration problems detected at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// How purchases are executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeRoute {
    /// In-process calls to the trade gateway
    Direct,
    /// One external buy command per attempt
    Subprocess(BuyCommand),
}

#[derive(Clone)]
pub struct SniperConfig {
    pub feed_urls: NonEmpty<String>,
    pub feed_reconnect_delay: Duration,
    pub base_token: String,
    pub buy_amount: Decimal,
    pub slippage: Slippage,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub max_purchase_attempts: u32,
    pub await_confirmation: bool,
    pub wallet_address: String,
    pub wallet_private_key: String,
    pub blacklist_path: PathBuf,
    pub ledger: LedgerBackend,
    pub log_dir: PathBuf,
    pub trade_route: TradeRoute,
    pub trade_api_url: String,
    pub trade_api_key: Option<String>,
    pub trade_api_timeout: Duration,
    pub venue_max_rps: u32,
}

impl fmt::Debug for SniperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SniperConfig")
            .field("feed_urls", &self.feed_urls)
            .field("base_token", &self.base_token)
            .field("buy_amount", &self.buy_amount)
            .field("slippage", &self.slippage)
            .field("retry_base_ms", &self.retry_base_ms)
            .field("retry_max_ms", &self.retry_max_ms)
            .field("max_purchase_attempts", &self.max_purchase_attempts)
            .field("wallet_address", &self.wallet_address)
            .field("wallet_private_key", &"<redacted>")
            .field("ledger", &self.ledger)
            .field("trade_route", &self.trade_route)
            .field("trade_api_url", &self.trade_api_url)
            .field("trade_api_key", &self.trade_api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl Default for SniperConfig {
    fn default() -> Self {
        Self {
            feed_urls: NonEmpty::new(DEFAULT_FEED_URL.to_string()),
            feed_reconnect_delay: Duration::from_millis(500),
            base_token: DEFAULT_BASE_TOKEN.to_string(),
            buy_amount: Decimal::new(50, 0),
            slippage: Slippage::default(),
            retry_base_ms: 250,
            retry_max_ms: 6000,
            max_purchase_attempts: 5,
            await_confirmation: true,
            wallet_address: String::new(),
            wallet_private_key: String::new(),
            blacklist_path: PathBuf::from("blacklist.csv"),
            ledger: LedgerBackend::Csv(PathBuf::from("tokens_bought.csv")),
            log_dir: PathBuf::from("logs"),
            trade_route: TradeRoute::Direct,
            trade_api_url: HttpVenueConfig::default().base_url,
            trade_api_key: None,
            trade_api_timeout: Duration::from_secs(10),
            venue_max_rps: 20,
        }
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| invalid(key, format!("{:?}: {}", raw, e)))
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(key, format!("{:?} is not a boolean", other))),
    }
}

/// Ledger selection from `LEDGER_BACKEND`, `LEDGER_PATH` and `LEDGER_DATABASE_URL`.
///
/// Split out so tools that only read the ledger need no wallet settings.
pub fn ledger_from_lookup<F>(lookup: F) -> Result<LedgerBackend, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let backend = get("LEDGER_BACKEND").unwrap_or_else(|| "csv".to_string());
    match backend.to_ascii_lowercase().as_str() {
        "csv" => Ok(LedgerBackend::Csv(
            get("LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tokens_bought.csv")),
        )),
        "sqlite" => Ok(LedgerBackend::Sqlite(
            get("LEDGER_DATABASE_URL").unwrap_or_else(|| "sqlite:tokens_bought.db?mode=rwc".to_string()),
        )),
        other => Err(invalid("LEDGER_BACKEND", format!("unknown backend {:?}", other))),
    }
}

impl SniperConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for each variable; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(raw) = get("GALA_BUNDLE_WS") {
            let urls: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
            config.feed_urls =
                NonEmpty::from_vec(urls).ok_or_else(|| invalid("GALA_BUNDLE_WS", "no URLs given"))?;
        }
        if let Some(raw) = get("FEED_RECONNECT_MS") {
            config.feed_reconnect_delay = Duration::from_millis(parse_value("FEED_RECONNECT_MS", &raw)?);
        }
        if let Some(raw) = get("BASE_TOKEN") {
            config.base_token = raw;
        }
        if let Some(raw) = get("BUY_AMOUNT") {
            config.buy_amount = parse_value("BUY_AMOUNT", &raw)?;
        }
        if let Some(raw) = get("SLIPPAGE_TOLERANCE") {
            config.slippage = Slippage::Tolerance(parse_value("SLIPPAGE_TOLERANCE", &raw)?);
        } else if let Some(raw) = get("SLIPPAGE") {
            config.slippage = Slippage::AcceptFraction(parse_value("SLIPPAGE", &raw)?);
        }
        if let Some(raw) = get("RETRY_BASE_MS") {
            config.retry_base_ms = parse_value("RETRY_BASE_MS", &raw)?;
        }
        if let Some(raw) = get("RETRY_MAX_MS") {
            config.retry_max_ms = parse_value("RETRY_MAX_MS", &raw)?;
        }
        if let Some(raw) = get("MAX_PURCHASE_ATTEMPTS") {
            config.max_purchase_attempts = parse_value("MAX_PURCHASE_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = get("AWAIT_CONFIRMATION") {
            config.await_confirmation = parse_bool("AWAIT_CONFIRMATION", &raw)?;
        }

        config.wallet_address = get("WALLET_ADDRESS").ok_or(ConfigError::Missing("WALLET_ADDRESS"))?;
        config.wallet_private_key = get("WALLET_PRIVATE_KEY").ok_or(ConfigError::Missing("WALLET_PRIVATE_KEY"))?;

        if let Some(raw) = get("BLACKLIST_PATH") {
            config.blacklist_path = PathBuf::from(raw);
        }
        if let Some(raw) = get("LOG_DIR") {
            config.log_dir = PathBuf::from(raw);
        }

        config.ledger = ledger_from_lookup(&lookup)?;

        let mode = get("TRADE_MODE").unwrap_or_else(|| "direct".to_string());
        config.trade_route = match mode.to_ascii_lowercase().as_str() {
            "direct" => TradeRoute::Direct,
            "subprocess" => TradeRoute::Subprocess(match get("BUY_COMMAND") {
                Some(line) => BuyCommand::parse(&line).ok_or_else(|| invalid("BUY_COMMAND", "empty command"))?,
                None => BuyCommand::default(),
            }),
            other => return Err(invalid("TRADE_MODE", format!("unknown mode {:?}", other))),
        };

        if let Some(raw) = get("TRADE_API_URL") {
            config.trade_api_url = raw;
        }
        config.trade_api_key = get("TRADE_API_KEY");
        if let Some(raw) = get("TRADE_API_TIMEOUT_MS") {
            config.trade_api_timeout = Duration::from_millis(parse_value("TRADE_API_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = get("VENUE_MAX_RPS") {
            config.venue_max_rps = parse_value("VENUE_MAX_RPS", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buy_amount <= Decimal::ZERO {
            return Err(invalid("BUY_AMOUNT", "must be positive"));
        }
        match self.slippage {
            Slippage::AcceptFraction(f) if f <= Decimal::ZERO || f > Decimal::ONE => {
                return Err(invalid("SLIPPAGE", "accept fraction must be in (0, 1]"));
            }
            Slippage::Tolerance(t) if t < Decimal::ZERO || t >= Decimal::ONE => {
                return Err(invalid("SLIPPAGE_TOLERANCE", "tolerance must be in [0, 1)"));
            }
            _ => {}
        }
        if self.retry_base_ms == 0 {
            return Err(invalid("RETRY_BASE_MS", "must be positive"));
        }
        if self.retry_max_ms < self.retry_base_ms {
            return Err(invalid("RETRY_MAX_MS", "must not be below RETRY_BASE_MS"));
        }
        if self.max_purchase_attempts == 0 {
            return Err(invalid("MAX_PURCHASE_ATTEMPTS", "must be at least 1"));
        }
        Ok(())
    }

    pub fn with_wallet(mut self, address: impl Into<String>, private_key: impl Into<String>) -> Self {
        self.wallet_address = address.into();
        self.wallet_private_key = private_key.into();
        self
    }

    pub fn with_feed_urls(mut self, urls: NonEmpty<String>) -> Self {
        self.feed_urls = urls;
        self
    }

    pub fn with_buy_amount(mut self, amount: Decimal) -> Self {
        self.buy_amount = amount;
        self
    }

    pub fn with_slippage(mut self, slippage: Slippage) -> Self {
        self.slippage = slippage;
        self
    }

    pub fn with_retry(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.retry_base_ms = base_ms;
        self.retry_max_ms = max_ms;
        self
    }

    pub fn with_max_purchase_attempts(mut self, attempts: u32) -> Self {
        self.max_purchase_attempts = attempts;
        self
    }

    pub fn with_ledger(mut self, ledger: LedgerBackend) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_trade_route(mut self, route: TradeRoute) -> Self {
        self.trade_route = route;
        self
    }

    pub fn retry_schedule(&self) -> BackoffSchedule {
        BackoffSchedule::from_millis(self.retry_base_ms, self.retry_max_ms)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            base_token: self.base_token.clone(),
            buy_amount: self.buy_amount,
            slippage: self.slippage,
            recipient: self.wallet_address.clone(),
            max_attempts: self.max_purchase_attempts,
            retry: self.retry_schedule(),
        }
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            urls: self.feed_urls.clone(),
            reconnect_delay: self.feed_reconnect_delay,
            ..FeedConfig::default()
        }
    }

    pub fn venue_config(&self) -> HttpVenueConfig {
        HttpVenueConfig {
            base_url: self.trade_api_url.clone(),
            api_key: self.trade_api_key.clone(),
            request_timeout: self.trade_api_timeout,
            ..HttpVenueConfig::default()
        }
    }

    /// Environment handed to the external buy command.
    pub fn subprocess_env(&self) -> Vec<(String, String)> {
        vec![
            ("WALLET_ADDRESS".to_string(), self.wallet_address.clone()),
            ("WALLET_PRIVATE_KEY".to_string(), self.wallet_private_key.clone()),
            ("BASE_TOKEN".to_string(), self.base_token.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const WALLET: [(&str, &str); 2] = [("WALLET_ADDRESS", "eth|abc"), ("WALLET_PRIVATE_KEY", "0xkey")];

    #[test]
    fn test_defaults_with_wallet_only() {
        let config = SniperConfig::from_lookup(lookup(&WALLET)).unwrap();
        assert_eq!(config.feed_urls.head, DEFAULT_FEED_URL);
        assert_eq!(config.base_token, DEFAULT_BASE_TOKEN);
        assert_eq!(config.buy_amount, Decimal::new(50, 0));
        assert_eq!(config.slippage, Slippage::AcceptFraction(Decimal::new(98, 2)));
        assert_eq!(config.max_purchase_attempts, 5);
        assert_eq!(config.trade_route, TradeRoute::Direct);
        assert_eq!(config.ledger, LedgerBackend::Csv(PathBuf::from("tokens_bought.csv")));
    }

    #[test]
    fn test_missing_wallet_is_reported() {
        let err = SniperConfig::from_lookup(lookup(&[("WALLET_ADDRESS", "eth|abc")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("WALLET_PRIVATE_KEY"));

        let err = SniperConfig::from_lookup(lookup(&[("WALLET_ADDRESS", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("WALLET_ADDRESS"));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = WALLET.to_vec();
        pairs.extend([
            ("GALA_BUNDLE_WS", "wss://a.example, wss://b.example"),
            ("BUY_AMOUNT", "12.5"),
            ("SLIPPAGE_TOLERANCE", "0.05"),
            ("TRADE_MODE", "subprocess"),
            ("LEDGER_BACKEND", "sqlite"),
            ("AWAIT_CONFIRMATION", "no"),
            ("LOG_DIR", "/var/log/snipebot"),
        ]);
        let config = SniperConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.feed_urls.len(), 2);
        assert_eq!(config.feed_urls.tail, vec!["wss://b.example".to_string()]);
        assert_eq!(config.buy_amount, Decimal::new(125, 1));
        assert_eq!(config.slippage.min_output(Decimal::new(1000, 0)), Decimal::new(950, 0));
        assert_eq!(config.trade_route, TradeRoute::Subprocess(BuyCommand::default()));
        assert!(matches!(config.ledger, LedgerBackend::Sqlite(_)));
        assert!(!config.await_confirmation);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/snipebot"));
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("BUY_AMOUNT", "fifty"),
            ("BUY_AMOUNT", "0"),
            ("SLIPPAGE", "1.5"),
            ("RETRY_BASE_MS", "-1"),
            ("MAX_PURCHASE_ATTEMPTS", "0"),
            ("TRADE_MODE", "telepathy"),
        ] {
            let mut pairs = WALLET.to_vec();
            pairs.push((key, value));
            let err = SniperConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{}={} gave {:?}", key, value, err);
        }
    }

    #[test]
    fn test_ledger_selection_needs_no_wallet() {
        let backend = ledger_from_lookup(lookup(&[("LEDGER_PATH", "data/bought.csv")])).unwrap();
        assert_eq!(backend, LedgerBackend::Csv(PathBuf::from("data/bought.csv")));

        let err = ledger_from_lookup(lookup(&[("LEDGER_BACKEND", "postgres")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LEDGER_BACKEND", .. }));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = SniperConfig::default().with_wallet("eth|abc", "super-secret");
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("eth|abc"));
        assert!(!rendered.contains("super-secret"));
    }
}
