//! Server-wide state shared by every connection.

use std::sync::Arc;

use tracing::debug;

use crate::config::RulesConfig;
use crate::ledger::Ledger;
use crate::registry::{LockRegistry, SessionRegistry};

/// The ledger, both registries and the business-rule parameters.
///
/// Constructed once at startup and handed to the server behind an `Arc`.
#[derive(Debug, Default)]
pub struct BankState {
    pub sessions: SessionRegistry,
    pub locks: LockRegistry,
    pub ledger: Ledger,
    pub rules: RulesConfig,
}

impl BankState {
    /// Wraps a ledger and registers a free lock slot for each of its resources.
    pub fn new(ledger: Ledger, rules: RulesConfig) -> Arc<Self> {
        let locks = LockRegistry::new();
        for resource in ledger.resource_ids() {
            locks.register_slot(resource);
        }
        debug!(slots = locks.slot_count(), "Lock slots registered");

        Arc::new(Self {
            sessions: SessionRegistry::new(),
            locks,
            ledger,
            rules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bank_core::{AccountVariant, ClientProfile, ContactInfo, Username};

    #[test]
    fn test_slots_seeded_from_ledger() {
        let ledger = Ledger::new();
        let alice = Username::new("alice");
        ledger
            .create_profile(ClientProfile::new(alice.clone(), "pw", ContactInfo::default()))
            .unwrap();
        ledger.open_account(&alice, AccountVariant::Checking).unwrap();

        let state = BankState::new(ledger, RulesConfig::default());
        assert_eq!(state.locks.slot_count(), 2);
        assert!(state.sessions.is_empty());
    }
}
