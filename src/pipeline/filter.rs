//! Candidate filter and deduplicator.

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::blacklist::Blacklist;
use crate::pipeline::registry::{InFlightGuard, InFlightRegistry};
use crate::types::LaunchEvent;
use crate::vault::{address_from_vault, normalize_address};

/// Why a candidate was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("blacklist match ({0})")]
    Blacklisted(String),
    #[error("already in flight")]
    DuplicateInFlight,
}

/// Decides whether a launch event should be bought.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    blacklist: Arc<Blacklist>,
    registry: InFlightRegistry,
}

impl CandidateFilter {
    pub fn new(blacklist: Arc<Blacklist>, registry: InFlightRegistry) -> Self {
        Self { blacklist, registry }
    }

    pub fn registry(&self) -> &InFlightRegistry {
        &self.registry
    }

    /// Check the blacklist, then claim the vault in the registry.
    ///
    /// A blacklisted candidate never touches the registry.
    pub fn should_process(&self, event: &LaunchEvent) -> Result<InFlightGuard, Rejection> {
        let label = event.label();

        if let Some(hit) = self.blacklist_hit(event) {
            info!("Skipping {} due to blacklist match ({})", label, hit);
            return Err(Rejection::Blacklisted(hit));
        }

        match self.registry.try_register(&event.vault_address) {
            Some(guard) => Ok(guard),
            None => {
                info!("Already handling {}; ignoring duplicate event", label);
                Err(Rejection::DuplicateInFlight)
            }
        }
    }

    fn blacklist_hit(&self, event: &LaunchEvent) -> Option<String> {
        let candidates = [
            event.creator_address.as_deref().and_then(normalize_address),
            event.additional_key.as_deref().and_then(normalize_address),
            address_from_vault(&event.vault_address),
        ];

        candidates
            .into_iter()
            .flatten()
            .find(|address| self.blacklist.contains(address))
    }
}
