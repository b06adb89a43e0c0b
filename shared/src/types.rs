use std::net::IpAddr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A loosely typed scalar from a request body.
///
/// Game engines usually post form-encoded bodies where every value is a
/// string, while JSON clients send real numbers. Both land here and are
/// interpreted by the registry's validation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Interpret the value as an integer. Integral floats are accepted,
    /// anything else yields `None`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            FieldValue::Float(f) => integral(*f),
            FieldValue::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(integral))
            }
        }
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

/// Registration payload sent by a game server to `/add`.
///
/// Without `id` this is a first-time registration; with `id` it refreshes
/// the entry the registry handed out earlier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationRequest {
    #[serde(rename = "serverUuid", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "serverPort", default, skip_serializing_if = "Option::is_none")]
    pub port: Option<FieldValue>,

    #[serde(rename = "serverName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Game or category key; empty means ungrouped
    #[serde(rename = "serverGameId", default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,

    #[serde(rename = "serverPlayers", default, skip_serializing_if = "Option::is_none")]
    pub occupancy: Option<FieldValue>,

    #[serde(rename = "serverCapacity", default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<FieldValue>,

    /// Opaque blob passed through to listing consumers
    #[serde(rename = "serverExtras", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// Partial refresh of an existing entry, sent to `/update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRequest {
    #[serde(rename = "serverUuid", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "serverName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(rename = "serverGameId", default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,

    #[serde(rename = "serverPlayers", default, skip_serializing_if = "Option::is_none")]
    pub occupancy: Option<FieldValue>,

    #[serde(rename = "serverCapacity", default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<FieldValue>,

    #[serde(rename = "serverExtras", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemovalRequest {
    #[serde(rename = "serverUuid", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRequest {
    /// Exact-match category filter; absent means the ungrouped partition
    #[serde(rename = "gameId", default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

/// Public projection of a registered server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerListing {
    pub ip: IpAddr,
    pub name: String,
    pub port: u16,
    pub players: u32,
    pub capacity: u32,
    pub extras: String,
    pub game_id: String,
}

/// Envelope returned by `/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerList {
    pub count: usize,
    pub servers: Vec<ServerListing>,

    /// Seconds clients should wait between polls
    pub update_frequency: u64,
}

/// Success body for `/add` and `/update`. The server must keep `server_uuid`
/// for every later refresh or removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registered {
    pub server_uuid: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Removed {
    pub removed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_accepts_numbers_and_strings() {
        assert_eq!(FieldValue::from(7777).as_integer(), Some(7777));
        assert_eq!(FieldValue::from(" 7777 ").as_integer(), Some(7777));
        assert_eq!(FieldValue::Float(12.0).as_integer(), Some(12));
        assert_eq!(FieldValue::Float(12.5).as_integer(), None);
        assert_eq!(FieldValue::from("lots").as_integer(), None);
    }

    #[test]
    fn test_registration_request_uses_legacy_field_names() {
        let json = r#"{"serverName":"Arena","serverPort":"7777","serverPlayers":3}"#;
        let req: RegistrationRequest = serde_json::from_str(json).unwrap();

        assert_eq!(req.display_name.as_deref(), Some("Arena"));
        assert_eq!(req.port, Some(FieldValue::Text("7777".to_string())));
        assert_eq!(req.occupancy, Some(FieldValue::Integer(3)));
        assert!(req.id.is_none());
        assert!(req.metadata.is_none());
    }

    #[test]
    fn test_server_list_envelope_shape() {
        let list = ServerList {
            count: 1,
            servers: vec![ServerListing {
                ip: "10.0.0.1".parse().unwrap(),
                name: "Arena".to_string(),
                port: 7777,
                players: 2,
                capacity: 16,
                extras: String::new(),
                game_id: "ctf".to_string(),
            }],
            update_frequency: 150,
        };

        let value = serde_json::to_value(&list).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["updateFrequency"], 150);
        assert_eq!(value["servers"][0]["ip"], "10.0.0.1");
        assert_eq!(value["servers"][0]["gameId"], "ctf");
    }
}
