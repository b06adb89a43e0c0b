use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::DEFAULT_PORT;

/// One week
const MAX_INACTIVE_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub pruning: PruningConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared secret every request must carry as `serverKey`
    #[serde(default = "default_communication_key")]
    pub communication_key: String,
    #[serde(default)]
    pub use_access_control: bool,
    #[serde(default)]
    pub allowed_addresses: Vec<IpAddr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PruningConfig {
    #[serde(default = "default_inactive_minutes")]
    pub inactive_server_removal_minutes: u64,
    /// Hide servers hosted on the requesting client's own address
    #[serde(default)]
    pub dont_show_servers_on_same_ip: bool,
    /// Report seconds until the colliding entry expires on an address/port conflict
    #[serde(default = "default_true")]
    pub send_next_prune_time: bool,
    #[serde(default)]
    pub sweep_policy: SweepPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub allow_duplicate_server_names: bool,
    #[serde(default = "default_true")]
    pub updates_must_match_original_address: bool,
    /// Let a registered server move its address or port on refresh
    #[serde(default)]
    pub allow_privileged_detail_changes: bool,
    /// Honour an explicit `serverAddress` field on `/add`
    #[serde(default)]
    pub trust_address_override: bool,
    #[serde(default = "default_true")]
    pub use_rate_limiter: bool,
    #[serde(default = "default_rate_limiter_window_ms")]
    pub rate_limiter_window_ms: u64,
    /// Requests each client address may make per window, across all routes
    #[serde(default = "default_rate_limiter_max_requests")]
    pub rate_limiter_max_requests: u32,
}

/// How often the expiry scheduler sweeps the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SweepPolicy {
    #[default]
    EverySecond,
    HalfWindow,
}

fn default_listen() -> String {
    format!("0.0.0.0:{}", DEFAULT_PORT)
}

fn default_communication_key() -> String {
    "NodeListServerDefaultKey".to_string()
}

fn default_inactive_minutes() -> u64 {
    5
}

fn default_rate_limiter_window_ms() -> u64 {
    15 * 60 * 1000
}

fn default_rate_limiter_max_requests() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            communication_key: default_communication_key(),
            use_access_control: false,
            allowed_addresses: Vec::new(),
        }
    }
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            inactive_server_removal_minutes: default_inactive_minutes(),
            dont_show_servers_on_same_ip: false,
            send_next_prune_time: true,
            sweep_policy: SweepPolicy::default(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_duplicate_server_names: false,
            updates_must_match_original_address: true,
            allow_privileged_detail_changes: false,
            trust_address_override: false,
            use_rate_limiter: true,
            rate_limiter_window_ms: default_rate_limiter_window_ms(),
            rate_limiter_max_requests: default_rate_limiter_max_requests(),
        }
    }
}

impl SecurityConfig {
    pub fn rate_limiter_window(&self) -> Duration {
        Duration::from_millis(self.rate_limiter_window_ms)
    }
}

impl PruningConfig {
    /// Inactivity window after which an unrefreshed entry expires
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.inactive_server_removal_minutes * 60)
    }

    pub fn sweep_period(&self) -> Duration {
        match self.sweep_policy {
            SweepPolicy::EverySecond => Duration::from_secs(1),
            SweepPolicy::HalfWindow => (self.window() / 2).max(Duration::from_secs(1)),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pruning.inactive_server_removal_minutes == 0 {
            bail!("pruning.inactive_server_removal_minutes must be at least 1");
        }
        if self.pruning.inactive_server_removal_minutes > MAX_INACTIVE_MINUTES {
            bail!(
                "pruning.inactive_server_removal_minutes must be at most {}",
                MAX_INACTIVE_MINUTES
            );
        }
        if self.auth.communication_key.is_empty() {
            bail!("auth.communication_key must not be empty");
        }
        if self.auth.use_access_control && self.auth.allowed_addresses.is_empty() {
            bail!("auth.use_access_control is enabled but auth.allowed_addresses is empty");
        }
        if self.security.use_rate_limiter
            && (self.security.rate_limiter_window_ms == 0 || self.security.rate_limiter_max_requests == 0)
        {
            bail!("security.use_rate_limiter needs a non-zero rate_limiter_window_ms and rate_limiter_max_requests");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        config.validate().unwrap();

        assert_eq!(config.core.listen, "0.0.0.0:8889");
        assert_eq!(config.pruning.window(), Duration::from_secs(300));
        assert_eq!(config.pruning.sweep_period(), Duration::from_secs(1));
        assert!(config.security.updates_must_match_original_address);
        assert!(!config.security.allow_duplicate_server_names);
        assert!(config.security.use_rate_limiter);
        assert_eq!(config.security.rate_limiter_window(), Duration::from_secs(900));
        assert_eq!(config.security.rate_limiter_max_requests, 100);
    }

    #[test]
    fn test_rate_limiter_settings() {
        let config: Config = toml::from_str(
            r#"
            [security]
            rate_limiter_window_ms = 1500
            rate_limiter_max_requests = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.security.rate_limiter_window(), Duration::from_millis(1500));
        assert!(config.validate().is_err());

        let config: Config = toml::from_str(
            r#"
            [security]
            use_rate_limiter = false
            rate_limiter_max_requests = 0
            "#,
        )
        .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_half_window_sweep_policy() {
        let config: Config = toml::from_str(
            r#"
            [pruning]
            inactive_server_removal_minutes = 10
            sweep_policy = "half-window"
            "#,
        )
        .unwrap();

        assert_eq!(config.pruning.sweep_period(), Duration::from_secs(300));
    }

    #[test]
    fn test_rejects_zero_window() {
        let config: Config = toml::from_str(
            r#"
            [pruning]
            inactive_server_removal_minutes = 0
            "#,
        )
        .unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_access_control_without_addresses() {
        let config: Config = toml::from_str(
            r#"
            [auth]
            use_access_control = true
            "#,
        )
        .unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parses_allowed_addresses() {
        let config: Config = toml::from_str(
            r#"
            [auth]
            communication_key = "secret"
            use_access_control = true
            allowed_addresses = ["127.0.0.1", "::1"]
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.auth.allowed_addresses.len(), 2);
    }
}
