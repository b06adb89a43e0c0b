//! Sanitisation of client-supplied registration fields.

use shared::types::FieldValue;
use uuid::Uuid;
use super::entry::EntryId;
use super::error::{RegistryError, RegistryResult};

/// Port is mandatory and never defaulted
pub fn parse_port(value: Option<&FieldValue>) -> RegistryResult<u16> {
    let value = value
        .ok_or_else(|| RegistryError::InvalidInput("server port is missing".to_string()))?;

    value
        .as_integer()
        .filter(|port| (1..=65535).contains(port))
        .map(|port| port as u16)
        .ok_or_else(|| {
            RegistryError::InvalidInput(format!("server port {:?} is not within 1-65535", value))
        })
}

/// Player counts and capacities fall back to 0 instead of failing the request
pub fn parse_count(value: &FieldValue) -> u32 {
    value
        .as_integer()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

/// Trimmed text, or `None` when absent or blank
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// A malformed id can never match a live entry, so it is reported as unknown
pub fn parse_id(raw: &str) -> RegistryResult<EntryId> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| RegistryError::NotFound(format!("unknown server id '{}'", raw.trim())))
}
