//! Vault identifier decomposition and address normalization.
//!
//! Launchpad vaults look like `service|Token$Unit$<SYMBOL>$<KEY>$launchpad`. The
//! segments carry the token identity, and the segment before the marker doubles as
//! an address used for blacklist checks.

use once_cell::sync::Lazy;
use regex::Regex;

static SYMBOL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Token\$Unit\$([^$]+)\$").expect("valid symbol pattern"));

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^service\|Token\$Unit\$([^$]+)\$([^$]+)\$launchpad$").expect("valid token pattern")
});

static ADDRESS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$([a-z0-9:]+)\$launchpad$").expect("valid address pattern"));

/// Normalize a raw address for blacklist comparison.
///
/// `eth:abc` becomes `eth|abc`; everything is lowercased; blank input yields `None`.
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains('|') {
        return Some(trimmed.to_lowercase());
    }
    if let Some((prefix, rest)) = trimmed.split_once(':') {
        return Some(format!("{}|{}", prefix, rest).to_lowercase());
    }
    Some(trimmed.to_lowercase())
}

/// Symbol embedded in a vault address (`...Token$Unit$<SYMBOL>$...`).
pub fn symbol_from_vault(vault_address: &str) -> Option<String> {
    SYMBOL_PATTERN
        .captures(vault_address)
        .map(|caps| caps[1].to_string())
}

/// Tradable token id for a launchpad vault: `Token|Unit|<SYMBOL>|<KEY>`.
pub fn token_id_from_vault(vault_address: &str) -> Option<String> {
    TOKEN_PATTERN
        .captures(vault_address)
        .map(|caps| format!("Token|Unit|{}|{}", &caps[1], &caps[2]))
}

/// Normalized address taken from the segment just before the `$launchpad` suffix.
pub fn address_from_vault(vault_address: &str) -> Option<String> {
    ADDRESS_PATTERN
        .captures(vault_address)
        .and_then(|caps| normalize_address(&caps[1]))
}

/// Best-effort token id for arbitrary vault strings.
///
/// Strips the `service|` prefix and joins the first three `$` segments with `|`,
/// keeping the remainder verbatim as the additional key.
pub fn lenient_token_id(vault_address: &str) -> Option<String> {
    let clean = vault_address.strip_prefix("service|").unwrap_or(vault_address);
    let parts: Vec<&str> = clean.split('$').collect();
    if parts.len() < 4 {
        return None;
    }
    Some(format!("{}|{}|{}|{}", parts[0], parts[1], parts[2], parts[3..].join("$")))
}
