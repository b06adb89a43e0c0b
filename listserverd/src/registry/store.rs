use std::collections::HashMap;
use std::net::IpAddr;
use chrono::{DateTime, Duration, Utc};
use super::entry::{Entry, EntryId, EntryPatch};
use super::error::{RegistryError, RegistryResult};

/// Authoritative table of registered servers, keyed by id.
///
/// Expired entries may linger until the next sweep, but every read skips
/// them. The store itself is not synchronised; the registry thread owns it.
pub struct EntryStore {
    entries: HashMap<EntryId, Entry>,
    window: Duration,
    allow_privileged_changes: bool,
}

impl EntryStore {
    pub fn new(window: Duration, allow_privileged_changes: bool) -> Self {
        Self {
            entries: HashMap::new(),
            window,
            allow_privileged_changes,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Expiry time for an entry refreshed at `now`
    pub fn lease_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.window
    }

    pub fn get(&self, id: &EntryId, now: DateTime<Utc>) -> RegistryResult<&Entry> {
        self.entries
            .get(id)
            .filter(|entry| entry.is_live(now))
            .ok_or_else(|| RegistryError::NotFound(format!("unknown server id '{}'", id)))
    }

    pub fn find_by_address_port(
        &self,
        address: IpAddr,
        port: u16,
        now: DateTime<Utc>,
    ) -> Option<&Entry> {
        self.live(now)
            .find(|entry| entry.address == address && entry.port == port)
    }

    pub fn find_by_name(&self, name: &str, now: DateTime<Utc>) -> Option<&Entry> {
        self.live(now).find(|entry| entry.display_name == name)
    }

    /// Add a new entry. Fails if its id or its address/port pair is already live.
    pub fn insert(&mut self, entry: Entry, now: DateTime<Utc>) -> RegistryResult<()> {
        if self.get(&entry.id, now).is_ok() {
            return Err(RegistryError::conflict(format!(
                "server id '{}' is already registered",
                entry.id
            )));
        }

        if let Some(existing) = self.find_by_address_port(entry.address, entry.port, now) {
            if existing.id != entry.id {
                return Err(RegistryError::Conflict {
                    reason: format!("{}:{} is already registered", entry.address, entry.port),
                    retry_after_secs: Some(existing.seconds_remaining(now)),
                });
            }
        }

        self.entries.insert(entry.id, entry);
        Ok(())
    }

    /// Apply a partial update and refresh the lease.
    ///
    /// An empty patch is a pure refresh. Address and port changes are
    /// refused unless privileged changes are enabled.
    pub fn update(
        &mut self,
        id: &EntryId,
        patch: EntryPatch,
        now: DateTime<Utc>,
    ) -> RegistryResult<Entry> {
        let (current_address, current_port) = match self.entries.get(id) {
            Some(entry) if entry.is_live(now) => (entry.address, entry.port),
            Some(_) => {
                // Lapsed leases are never revived
                self.entries.remove(id);
                return Err(RegistryError::NotFound(format!("server id '{}' has expired", id)));
            }
            None => {
                return Err(RegistryError::NotFound(format!("unknown server id '{}'", id)));
            }
        };

        if patch.is_privileged() {
            if !self.allow_privileged_changes {
                return Err(RegistryError::Forbidden(
                    "address and port cannot change after registration".to_string(),
                ));
            }

            let address = patch.address.unwrap_or(current_address);
            let port = patch.port.unwrap_or(current_port);
            if let Some(other) = self.find_by_address_port(address, port, now) {
                if other.id != *id {
                    return Err(RegistryError::Conflict {
                        reason: format!("{}:{} is already registered", address, port),
                        retry_after_secs: Some(other.seconds_remaining(now)),
                    });
                }
            }
        }

        let expires_at = self.lease_from(now);
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(format!("unknown server id '{}'", id)))?;
        patch.apply(entry);
        entry.last_refreshed_at = now;
        entry.expires_at = expires_at;

        Ok(entry.clone())
    }

    pub fn remove(&mut self, id: &EntryId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Point-in-time copy of every live entry, in no particular order
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<Entry> {
        self.live(now).cloned().collect()
    }

    /// Drop every entry whose lease ended at or before `now`
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before - self.entries.len()
    }

    pub fn live_count(&self, now: DateTime<Utc>) -> usize {
        self.live(now).count()
    }

    /// Entries physically held, including lapsed ones awaiting a sweep
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn live(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Entry> {
        self.entries.values().filter(move |entry| entry.is_live(now))
    }
}
