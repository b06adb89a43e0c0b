use std::net::IpAddr;
use shared::types::{ListRequest, ServerList, ServerListing};
use super::entry::Entry;
use super::Registry;

impl Registry {
    /// Build the client-visible list of live servers in one category.
    ///
    /// An absent filter selects the ungrouped servers, not every server.
    pub fn list(&mut self, request: &ListRequest, requester: IpAddr) -> ServerList {
        let now = self.clock.now();
        let swept = self.store.sweep_expired(now);
        if swept > 0 {
            tracing::debug!("Dropped {} lapsed servers before listing", swept);
        }

        let category = request.category_id.as_deref().map(str::trim).unwrap_or("");
        let hide_own = self.policy.hide_own_servers;

        let servers: Vec<ServerListing> = self
            .store
            .snapshot(now)
            .iter()
            .filter(|entry| entry.category_id == category)
            .filter(|entry| {
                let own = hide_own && entry.address == requester;
                if own {
                    tracing::debug!("Server '{}' is hosted on {}'s address, skipping", entry.id, requester);
                }
                !own
            })
            .map(Entry::to_listing)
            .collect();

        tracing::info!("Sent {} servers to {}", servers.len(), requester);

        ServerList {
            count: servers.len(),
            servers,
            update_frequency: self.update_frequency(),
        }
    }

    /// Poll interval hint for clients: half the inactivity window
    fn update_frequency(&self) -> u64 {
        (self.store.window().num_seconds() / 2).max(1) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shared::types::{FieldValue, RegistrationRequest};
    use crate::registry::test_support::{ip, test_registry};
    use crate::registry::RegistryPolicy;

    fn server(name: &str, port: i64, category: &str) -> RegistrationRequest {
        RegistrationRequest {
            port: Some(FieldValue::from(port)),
            display_name: Some(name.to_string()),
            category_id: Some(category.to_string()),
            ..Default::default()
        }
    }

    fn ungrouped() -> ListRequest {
        ListRequest::default()
    }

    #[test]
    fn test_listing_projects_public_fields() {
        let (mut registry, _clock) = test_registry(RegistryPolicy::default());
        let request = RegistrationRequest {
            occupancy: Some(FieldValue::from(3)),
            capacity: Some(FieldValue::from(8)),
            metadata: Some("map=dust".to_string()),
            ..server("Arena", 7777, "")
        };
        registry.register(&request, ip("10.0.0.1")).unwrap();

        let list = registry.list(&ungrouped(), ip("192.168.1.5"));

        assert_eq!(list.count, 1);
        assert_eq!(list.update_frequency, 150);
        assert_eq!(
            list.servers[0],
            ServerListing {
                ip: ip("10.0.0.1"),
                name: "Arena".to_string(),
                port: 7777,
                players: 3,
                capacity: 8,
                extras: "map=dust".to_string(),
                game_id: String::new(),
            }
        );
    }

    #[test]
    fn test_category_filter_is_exact() {
        let (mut registry, _clock) = test_registry(RegistryPolicy::default());
        registry.register(&server("Flags", 7777, "ctf"), ip("10.0.0.1")).unwrap();
        registry.register(&server("Lobby", 7778, ""), ip("10.0.0.1")).unwrap();

        let ctf = registry.list(
            &ListRequest {
                category_id: Some("ctf".to_string()),
            },
            ip("192.168.1.5"),
        );
        assert_eq!(ctf.count, 1);
        assert_eq!(ctf.servers[0].name, "Flags");

        let unfiltered = registry.list(&ungrouped(), ip("192.168.1.5"));
        assert_eq!(unfiltered.count, 1);
        assert_eq!(unfiltered.servers[0].name, "Lobby");

        let none = registry.list(
            &ListRequest {
                category_id: Some("dm".to_string()),
            },
            ip("192.168.1.5"),
        );
        assert_eq!(none.count, 0);
    }

    #[test]
    fn test_hides_servers_on_requester_address() {
        let policy = RegistryPolicy {
            hide_own_servers: true,
            ..Default::default()
        };
        let (mut registry, _clock) = test_registry(policy);
        registry.register(&server("Mine", 7777, ""), ip("10.0.0.1")).unwrap();
        registry.register(&server("Theirs", 7777, ""), ip("10.0.0.2")).unwrap();

        let list = registry.list(&ungrouped(), ip("10.0.0.1"));
        assert_eq!(list.count, 1);
        assert_eq!(list.servers[0].name, "Theirs");

        let (mut registry, _clock) = test_registry(RegistryPolicy::default());
        registry.register(&server("Mine", 7777, ""), ip("10.0.0.1")).unwrap();
        assert_eq!(registry.list(&ungrouped(), ip("10.0.0.1")).count, 1);
    }

    #[test]
    fn test_expiry_boundary() {
        let (mut registry, clock) = test_registry(RegistryPolicy::default());
        registry.register(&server("Arena", 7777, ""), ip("10.0.0.1")).unwrap();

        clock.advance(Duration::minutes(5) - Duration::seconds(1));
        assert_eq!(registry.list(&ungrouped(), ip("10.0.0.9")).count, 1);

        clock.advance(Duration::seconds(2));
        assert_eq!(registry.list(&ungrouped(), ip("10.0.0.9")).count, 0);
    }

    #[test]
    fn test_register_then_sweep_empties_listing() {
        let (mut registry, clock) = test_registry(RegistryPolicy::default());
        registry.register(&server("Arena", 7777, ""), ip("10.0.0.1")).unwrap();
        assert_eq!(registry.list(&ungrouped(), ip("10.0.0.9")).servers[0].port, 7777);

        clock.advance(Duration::minutes(6));
        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.live_count(), 0);

        let list = registry.list(&ungrouped(), ip("10.0.0.9"));
        assert_eq!(list.count, 0);
        assert!(list.servers.is_empty());
    }
}
