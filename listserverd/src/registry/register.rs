use std::net::IpAddr;
use chrono::{DateTime, Utc};
use shared::types::{RegistrationRequest, RemovalRequest, UpdateRequest};
use super::entry::{Entry, EntryId, EntryPatch};
use super::error::{RegistryError, RegistryResult};
use super::validate::{non_blank, parse_count, parse_id, parse_port};
use super::Registry;

/// Fresh ids to try before giving up on a registration
const MAX_ID_ATTEMPTS: usize = 8;

impl Registry {
    /// Register a new server, or refresh an existing one when the request carries its id.
    ///
    /// Returns the stored entry; its `id` is what the server must send on every
    /// later refresh or removal.
    pub fn register(
        &mut self,
        request: &RegistrationRequest,
        origin: IpAddr,
    ) -> RegistryResult<Entry> {
        let now = self.clock.now();
        let port = parse_port(request.port.as_ref())?;

        match non_blank(request.id.as_deref()) {
            Some(raw_id) => {
                let id = parse_id(raw_id)?;
                let mut patch = EntryPatch {
                    display_name: non_blank(request.display_name.as_deref()).map(str::to_string),
                    category_id: request.category_id.as_deref().map(|s| s.trim().to_string()),
                    occupancy: request.occupancy.as_ref().map(parse_count),
                    capacity: request.capacity.as_ref().map(parse_count),
                    metadata: request.metadata.clone(),
                    address: None,
                    port: None,
                };
                // A privileged refresh may come from the server's new address
                let may_move = self.policy.allow_privileged_detail_changes;
                if may_move {
                    patch.address = Some(origin);
                    patch.port = Some(port);
                }
                self.refresh(id, patch, origin, may_move, now)
            }
            None => self.register_new(request, port, origin, now),
        }
    }

    /// Refresh a live entry without resending its port
    pub fn update(&mut self, request: &UpdateRequest, origin: IpAddr) -> RegistryResult<Entry> {
        let now = self.clock.now();
        let raw_id = non_blank(request.id.as_deref())
            .ok_or_else(|| RegistryError::InvalidInput("server uuid is missing".to_string()))?;
        let id = parse_id(raw_id)?;

        let patch = EntryPatch {
            display_name: non_blank(request.display_name.as_deref()).map(str::to_string),
            category_id: request.category_id.as_deref().map(|s| s.trim().to_string()),
            occupancy: request.occupancy.as_ref().map(parse_count),
            capacity: request.capacity.as_ref().map(parse_count),
            metadata: request.metadata.clone(),
            address: None,
            port: None,
        };
        self.refresh(id, patch, origin, false, now)
    }

    /// Delete an entry on behalf of the server that registered it
    pub fn remove(&mut self, request: &RemovalRequest, origin: IpAddr) -> RegistryResult<()> {
        let now = self.clock.now();
        let raw_id = non_blank(request.id.as_deref())
            .ok_or_else(|| RegistryError::InvalidInput("server uuid is missing".to_string()))?;
        let id = parse_id(raw_id)?;

        let entry = self.store.get(&id, now)?;
        if let Err(e) = self.check_owner(entry, origin) {
            tracing::warn!("Denied removal of '{}' from {}: {}", id, origin, e);
            return Err(e);
        }

        self.store.remove(&id);
        tracing::info!("Removed server '{}' (requested by {})", id, origin);
        Ok(())
    }

    fn refresh(
        &mut self,
        id: EntryId,
        patch: EntryPatch,
        origin: IpAddr,
        may_move: bool,
        now: DateTime<Utc>,
    ) -> RegistryResult<Entry> {
        let entry = self.store.get(&id, now)?;
        if !may_move {
            if let Err(e) = self.check_owner(entry, origin) {
                tracing::warn!("Denied update of '{}' from {}: {}", id, origin, e);
                return Err(e);
            }
        }

        if let Some(name) = patch.display_name.as_deref() {
            if !self.policy.allow_duplicate_names {
                if let Some(holder) = self.store.find_by_name(name, now) {
                    if holder.id != id {
                        tracing::warn!("Denied rename of '{}' from {}: name '{}' is taken", id, origin, name);
                        return Err(RegistryError::conflict(format!(
                            "server name '{}' is already registered",
                            name
                        )));
                    }
                }
            }
        }

        let updated = self.store.update(&id, patch, now)?;
        tracing::debug!("Server '{}' ('{}') refreshed by {}", id, updated.display_name, origin);
        Ok(updated)
    }

    fn register_new(
        &mut self,
        request: &RegistrationRequest,
        port: u16,
        origin: IpAddr,
        now: DateTime<Utc>,
    ) -> RegistryResult<Entry> {
        let display_name = non_blank(request.display_name.as_deref())
            .ok_or_else(|| RegistryError::InvalidInput("server name is missing".to_string()))?;

        if !self.policy.allow_duplicate_names && self.store.find_by_name(display_name, now).is_some() {
            tracing::warn!("Denied registration from {}: name '{}' is taken", origin, display_name);
            return Err(RegistryError::conflict(format!(
                "server name '{}' is already registered",
                display_name
            )));
        }

        if let Some(existing) = self.store.find_by_address_port(origin, port, now) {
            tracing::warn!("Denied registration from {}: {}:{} collides with '{}'", origin, origin, port, existing.id);
            let retry_after_secs = self
                .policy
                .report_retry_after
                .then(|| existing.seconds_remaining(now));
            return Err(RegistryError::Conflict {
                reason: format!("{}:{} is already registered", origin, port),
                retry_after_secs,
            });
        }

        let entry = Entry {
            id: self.generate_id(now)?,
            address: origin,
            port,
            display_name: display_name.to_string(),
            category_id: request
                .category_id
                .as_deref()
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            occupancy: request.occupancy.as_ref().map(parse_count).unwrap_or(0),
            capacity: request.capacity.as_ref().map(parse_count).unwrap_or(0),
            metadata: request.metadata.clone().unwrap_or_default(),
            last_refreshed_at: now,
            expires_at: self.store.lease_from(now),
        };

        self.store.insert(entry.clone(), now)?;
        tracing::info!("Added server '{}' ('{}') from {}:{}", entry.id, entry.display_name, origin, port);
        Ok(entry)
    }

    fn generate_id(&mut self, now: DateTime<Utc>) -> RegistryResult<EntryId> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = (self.next_id)();
            if self.store.get(&id, now).is_err() {
                return Ok(id);
            }
            tracing::warn!("Generated server id '{}' is already in use, retrying", id);
        }

        tracing::error!("Gave up allocating a server id after {} attempts", MAX_ID_ATTEMPTS);
        Err(RegistryError::IdSpaceExhausted(MAX_ID_ATTEMPTS))
    }
}
