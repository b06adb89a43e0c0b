use std::net::IpAddr;
use chrono::{DateTime, Utc};
use shared::types::ServerListing;
use uuid::Uuid;

pub type EntryId = Uuid;

/// One registered game server
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: EntryId,

    /// Network origin of the registrant, taken from the connection
    pub address: IpAddr,
    pub port: u16,
    pub display_name: String,

    /// Empty string means ungrouped
    pub category_id: String,
    pub occupancy: u32,
    pub capacity: u32,
    pub metadata: String,
    pub last_refreshed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Entry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Whole seconds until the entry lapses, rounded up
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.expires_at - now).num_milliseconds();
        if millis <= 0 {
            0
        } else {
            (millis as u64).div_ceil(1000)
        }
    }

    pub fn to_listing(&self) -> ServerListing {
        ServerListing {
            ip: self.address,
            name: self.display_name.clone(),
            port: self.port,
            players: self.occupancy,
            capacity: self.capacity,
            extras: self.metadata.clone(),
            game_id: self.category_id.clone(),
        }
    }
}

/// Partial change to an entry. `None` leaves the field as it is.
///
/// `address` and `port` are privileged: the store only accepts them when
/// privileged detail changes are enabled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryPatch {
    pub display_name: Option<String>,
    pub category_id: Option<String>,
    pub occupancy: Option<u32>,
    pub capacity: Option<u32>,
    pub metadata: Option<String>,
    pub address: Option<IpAddr>,
    pub port: Option<u16>,
}

impl EntryPatch {
    pub fn is_privileged(&self) -> bool {
        self.address.is_some() || self.port.is_some()
    }

    pub(crate) fn apply(self, entry: &mut Entry) {
        if let Some(name) = self.display_name {
            entry.display_name = name;
        }
        if let Some(category_id) = self.category_id {
            entry.category_id = category_id;
        }
        if let Some(occupancy) = self.occupancy {
            entry.occupancy = occupancy;
        }
        if let Some(capacity) = self.capacity {
            entry.capacity = capacity;
        }
        if let Some(metadata) = self.metadata {
            entry.metadata = metadata;
        }
        if let Some(address) = self.address {
            entry.address = address;
        }
        if let Some(port) = self.port {
            entry.port = port;
        }
    }
}
