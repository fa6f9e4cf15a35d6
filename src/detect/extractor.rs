//! Launch event extraction from loosely shaped feed payloads.
//!
//! Upstream services wrap the interesting object at different depths and spell
//! field names several ways. Each logical field is resolved through a fixed alias
//! chain; the first alias holding a non-empty string wins.

use serde_json::{Map, Value};

use crate::types::{LaunchEvent, CREATE_SALE_OPERATION, SALE_MARKER};
use crate::vault::symbol_from_vault;

const FUNCTION_NAME_ALIASES: &[&str] = &["functionName", "FunctionName", "function_name"];
const INITIAL_BUY_ALIASES: &[&str] = &["initialBuyQuantity", "InitialBuyQuantity"];
const VAULT_ALIASES: &[&str] = &["vaultAddress", "VaultAddress", "vault", "vaultaddress"];
const SYMBOL_ALIASES: &[&str] = &["symbol", "Symbol", "type"];
const TOKEN_NAME_ALIASES: &[&str] = &["tokenName", "name", "token"];
const CREATOR_ALIASES: &[&str] = &["creatorAddress", "creator", "ownerAddress", "owner"];
const ADDITIONAL_KEY_ALIASES: &[&str] = &["additionalKey", "tokenAdditionalKey"];
const TOKEN_STRING_KEY: &str = "tokenStringKey";

/// Extract a launch event from `payload`, looking at the payload itself, then
/// `data`, `data.Data` and finally `Data`.
pub fn extract(payload: &Value) -> Option<LaunchEvent> {
    let root = payload.as_object()?;
    let data = root.get("data");

    std::iter::once(Some(payload))
        .chain(std::iter::once(data))
        .chain(std::iter::once(data.and_then(|d| d.get("Data"))))
        .chain(std::iter::once(root.get("Data")))
        .flatten()
        .find_map(candidate_from)
}

/// Test a single object for the sale-creation shape.
fn candidate_from(value: &Value) -> Option<LaunchEvent> {
    let obj = value.as_object()?;

    let is_create = text_field(obj, FUNCTION_NAME_ALIASES)
        .map(|name| name.eq_ignore_ascii_case(CREATE_SALE_OPERATION))
        .unwrap_or(false)
        || INITIAL_BUY_ALIASES.iter().any(|alias| obj.contains_key(*alias));
    if !is_create {
        return None;
    }

    let vault_address = text_field(obj, VAULT_ALIASES)?;
    if !vault_address.to_lowercase().contains(SALE_MARKER) {
        return None;
    }

    let token_key = text_field(obj, &[TOKEN_STRING_KEY]);
    let token_key_segment = |index: usize| -> Option<String> {
        token_key
            .and_then(|key| key.split('$').nth(index))
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
    };

    let symbol = text_field(obj, SYMBOL_ALIASES)
        .map(str::to_string)
        .or_else(|| token_key_segment(2))
        .or_else(|| symbol_from_vault(vault_address));

    let token_name = text_field(obj, TOKEN_NAME_ALIASES)
        .map(str::to_string)
        .or_else(|| symbol.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let creator_address = text_field(obj, CREATOR_ALIASES).map(str::to_string);
    let additional_key = text_field(obj, ADDITIONAL_KEY_ALIASES)
        .map(str::to_string)
        .or_else(|| token_key_segment(3));

    Some(LaunchEvent {
        token_name,
        symbol,
        vault_address: vault_address.to_string(),
        creator_address,
        additional_key,
    })
}

fn text_field<'a>(obj: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .filter_map(|alias| obj.get(*alias).and_then(Value::as_str))
        .find(|value| !value.is_empty())
}
