//! In-flight registry - at most one purchase per vault at a time.
//!
//! Registration hands out an [`InFlightGuard`]; dropping the guard removes the
//! entry, so every exit path of a purchase (including panics) frees the vault.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::types::PurchaseState;

/// Shared map of vault address to purchase state.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    entries: Arc<DashMap<String, PurchaseState>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `vault` as pending. Returns `None` if it is already in flight.
    pub fn try_register(&self, vault: &str) -> Option<InFlightGuard> {
        match self.entries.entry(vault.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(PurchaseState::Pending);
                Some(InFlightGuard {
                    registry: self.clone(),
                    vault: vault.to_string(),
                })
            }
        }
    }

    pub fn contains(&self, vault: &str) -> bool {
        self.entries.contains_key(vault)
    }

    pub fn state(&self, vault: &str) -> Option<PurchaseState> {
        self.entries.get(vault).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ownership of one in-flight vault entry.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    vault: String,
}

impl InFlightGuard {
    pub fn vault(&self) -> &str {
        &self.vault
    }

    /// Record the purchase's progress in the registry.
    pub fn set_state(&self, state: PurchaseState) {
        if let Some(mut entry) = self.registry.entries.get_mut(&self.vault) {
            *entry = state;
            debug!("{} is now {}", self.vault, state.as_str());
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.entries.remove(&self.vault);
        debug!("Released in-flight entry for {}", self.vault);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_registration_per_vault() {
        let registry = InFlightRegistry::new();

        let guard = registry.try_register("vault-a").expect("first registration");
        assert!(registry.try_register("vault-a").is_none());
        assert!(registry.try_register("vault-b").is_some());
        assert_eq!(registry.state("vault-a"), Some(PurchaseState::Pending));

        guard.set_state(PurchaseState::Submitting);
        assert_eq!(registry.state("vault-a"), Some(PurchaseState::Submitting));

        drop(guard);
        assert!(!registry.contains("vault-a"));
        assert!(registry.try_register("vault-a").is_some());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let registry = InFlightRegistry::new();
        let cloned = registry.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.try_register("vault-p").unwrap();
            panic!("boom");
        }));

        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
