//! Monitored-address registry.
//!
//! Membership decides whether the pool heartbeats and reconnects a host.
//! Each monitored address carries a cancellation token; cancelling it on
//! unmonitor stops any in-flight reconnect supervisor for that address, so
//! no orphaned timer ever touches torn-down state.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;

/// Set of addresses currently under active long-poll monitoring.
#[derive(Default)]
pub struct MonitorRegistry {
    monitored: DashMap<String, CancellationToken>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address to the monitored set. Returns `true` if it was newly
    /// added, `false` if it was already monitored (idempotent).
    pub fn enable(&self, address: &str) -> bool {
        match self.monitored.entry(address.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(CancellationToken::new());
                true
            }
        }
    }

    /// Remove an address from the monitored set, cancelling its reconnect
    /// supervisors. Returns `true` if it was monitored (idempotent).
    pub fn disable(&self, address: &str) -> bool {
        if let Some((_, token)) = self.monitored.remove(address) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn is_monitored(&self, address: &str) -> bool {
        self.monitored.contains_key(address)
    }

    /// The token gating background work for an address, while monitored.
    pub fn token(&self, address: &str) -> Option<CancellationToken> {
        self.monitored.get(address).map(|entry| entry.value().clone())
    }

    /// Snapshot of the monitored addresses for a sweep pass.
    pub fn monitored(&self) -> Vec<String> {
        self.monitored.iter().map(|entry| entry.key().clone()).collect()
    }
}
