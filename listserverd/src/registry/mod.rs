pub mod clock;
pub mod entry;
pub mod error;
pub mod listing;
pub mod register;
pub mod store;
pub mod validate;

use std::net::IpAddr;
use std::sync::Arc;
use chrono::Duration;
use uuid::Uuid;
use crate::config::Config;
use self::clock::Clock;
use self::entry::{Entry, EntryId};
use self::error::{RegistryError, RegistryResult};
use self::store::EntryStore;

/// Registry behaviour switches taken from the configuration
#[derive(Debug, Clone)]
pub struct RegistryPolicy {
    pub window: Duration,
    pub allow_duplicate_names: bool,
    pub updates_must_match_original_address: bool,
    pub allow_privileged_detail_changes: bool,
    pub hide_own_servers: bool,
    pub report_retry_after: bool,
}

impl From<&Config> for RegistryPolicy {
    fn from(config: &Config) -> Self {
        Self {
            window: Duration::minutes(config.pruning.inactive_server_removal_minutes as i64),
            allow_duplicate_names: config.security.allow_duplicate_server_names,
            updates_must_match_original_address: config.security.updates_must_match_original_address,
            allow_privileged_detail_changes: config.security.allow_privileged_detail_changes,
            hide_own_servers: config.pruning.dont_show_servers_on_same_ip,
            report_retry_after: config.pruning.send_next_prune_time,
        }
    }
}

impl Default for RegistryPolicy {
    fn default() -> Self {
        RegistryPolicy::from(&Config::default())
    }
}

type IdSource = Box<dyn FnMut() -> EntryId + Send>;

/// The server directory: entry store plus the rules for changing it.
///
/// All methods are synchronous and in-memory; `RegistryHandle` gives
/// concurrent callers serialised access to a single instance.
pub struct Registry {
    store: EntryStore,
    policy: RegistryPolicy,
    clock: Arc<dyn Clock>,
    next_id: IdSource,
}

impl Registry {
    pub fn new(policy: RegistryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: EntryStore::new(policy.window, policy.allow_privileged_detail_changes),
            policy,
            clock,
            next_id: Box::new(Uuid::new_v4),
        }
    }

    #[cfg(test)]
    pub fn with_id_source(mut self, source: impl FnMut() -> EntryId + Send + 'static) -> Self {
        self.next_id = Box::new(source);
        self
    }

    pub fn get(&self, id: &EntryId) -> RegistryResult<Entry> {
        self.store.get(id, self.clock.now()).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.store.live_count(self.clock.now())
    }

    /// Entries still held, lapsed or not
    #[cfg(test)]
    pub fn stored_count(&self) -> usize {
        self.store.len()
    }

    /// Reclaim lapsed entries; returns how many were dropped
    pub fn sweep(&mut self) -> usize {
        self.store.sweep_expired(self.clock.now())
    }

    fn check_owner(&self, entry: &Entry, origin: IpAddr) -> RegistryResult<()> {
        if self.policy.updates_must_match_original_address && entry.address != origin {
            return Err(RegistryError::Forbidden(format!(
                "server '{}' was registered from {}, not {}",
                entry.id, entry.address, origin
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::registry::clock::ManualClock;

    pub fn test_registry(policy: RegistryPolicy) -> (Registry, ManualClock) {
        let clock = ManualClock::new();
        let registry = Registry::new(policy, Arc::new(clock.clone()));
        (registry, clock)
    }

    pub fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }
}
