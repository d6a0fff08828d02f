//! Configuration types for the control plane
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

use crate::model::ResolverProfile;

/// Main control-plane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    /// Backing store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Network-fabric collaborator configuration
    #[serde(default)]
    pub fabric: FabricConfig,

    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Internal retry policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    #[serde(default)]
    pub quotas: QuotaConfig,

    /// Capacity of the control-plane event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ControlPlaneConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            store: StoreConfig::default(),
            fabric: FabricConfig::default(),
            pagination: PaginationConfig::default(),
            retry: RetryConfig::default(),
            reconciler: ReconcilerConfig::default(),
            quotas: QuotaConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.store.validate()?;
        self.fabric.validate()?;
        self.pagination.validate()?;
        self.quotas.validate()?;

        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }
        if self.reconciler.interval_secs == 0 {
            return Err(crate::Error::config("reconciler interval must be > 0"));
        }

        Ok(())
    }
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Backing store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// JSON file store with crash recovery
    File {
        /// Path to the data file
        path: String,
    },

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("File store path cannot be empty"))
            }
            StoreConfig::Custom { factory, .. } if factory.is_empty() => {
                Err(crate::Error::config("Custom store factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Registry key for this store type
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::File { .. } => "file",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Network-fabric collaborator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FabricConfig {
    /// Deterministic in-process fabric (development and tests)
    #[default]
    Static,

    /// Remote fabric service reached over HTTP
    Http {
        /// Base URL, e.g. `https://fabric.internal`
        base_url: String,
        /// Bearer token (never logged)
        api_token: String,
        /// Per-request timeout
        #[serde(default = "default_fabric_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom fabric
    Custom {
        factory: String,
        config: serde_json::Value,
    },
}

impl FabricConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            FabricConfig::Http {
                base_url,
                api_token,
                timeout_secs,
            } => {
                if base_url.is_empty() {
                    return Err(crate::Error::config("Fabric base URL cannot be empty"));
                }
                if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
                    return Err(crate::Error::config(format!(
                        "Fabric base URL must use HTTP or HTTPS scheme. Got: {base_url}"
                    )));
                }
                if api_token.is_empty() {
                    return Err(crate::Error::config("Fabric API token cannot be empty"));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("Fabric timeout must be > 0"));
                }
                Ok(())
            }
            FabricConfig::Custom { factory, .. } if factory.is_empty() => {
                Err(crate::Error::config("Custom fabric factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Registry key for this fabric type
    pub fn type_name(&self) -> &str {
        match self {
            FabricConfig::Static => "static",
            FabricConfig::Http { .. } => "http",
            FabricConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Pagination defaults for list operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_page_limit")]
    pub max_limit: usize,
}

impl PaginationConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(crate::Error::config(format!(
                "default page limit must be in 1..={}, got {}",
                self.max_limit, self.default_limit
            )));
        }
        Ok(())
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_page_limit(),
            max_limit: default_max_page_limit(),
        }
    }
}

/// Bounded internal retry for transient store/fabric failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay between attempts (in milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Background removal reconciler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Pause between reconciliation passes (in seconds)
    #[serde(default = "default_reconcile_interval_secs")]
    pub interval_secs: u64,

    /// How long an entity stays in `REMOVAL_IN_PROGRESS` before it is purged
    ///
    /// Set to 0 to purge on the next pass.
    #[serde(default = "default_removal_settle_secs")]
    pub removal_settle_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconcile_interval_secs(),
            removal_settle_secs: default_removal_settle_secs(),
        }
    }
}

/// Limits for one custom-resolver profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileQuota {
    pub max_locations: usize,
    pub max_forwarding_rules: usize,
}

/// Quotas enforced by the services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_essential_quota")]
    pub essential: ProfileQuota,
    #[serde(default = "default_advanced_quota")]
    pub advanced: ProfileQuota,
    #[serde(default = "default_max_permitted_networks")]
    pub max_permitted_networks_per_zone: usize,
}

impl QuotaConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        for (name, quota) in [("essential", &self.essential), ("advanced", &self.advanced)] {
            if quota.max_locations == 0 {
                return Err(crate::Error::config(format!(
                    "{name} profile must allow at least one location"
                )));
            }
        }
        if self.max_permitted_networks_per_zone == 0 {
            return Err(crate::Error::config(
                "max_permitted_networks_per_zone must be > 0",
            ));
        }
        Ok(())
    }

    /// Quota that applies to a resolver profile
    pub fn for_profile(&self, profile: ResolverProfile) -> ProfileQuota {
        match profile {
            ResolverProfile::Essential => self.essential,
            ResolverProfile::Advanced => self.advanced,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            essential: default_essential_quota(),
            advanced: default_advanced_quota(),
            max_permitted_networks_per_zone: default_max_permitted_networks(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_fabric_timeout_secs() -> u64 {
    30
}

fn default_page_limit() -> usize {
    200
}

fn default_max_page_limit() -> usize {
    1000
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_reconcile_interval_secs() -> u64 {
    5
}

fn default_removal_settle_secs() -> u64 {
    10
}

fn default_essential_quota() -> ProfileQuota {
    ProfileQuota {
        max_locations: 3,
        max_forwarding_rules: 10,
    }
}

fn default_advanced_quota() -> ProfileQuota {
    ProfileQuota {
        max_locations: 6,
        max_forwarding_rules: 100,
    }
}

fn default_max_permitted_networks() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = ControlPlaneConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.pagination.default_limit, 200);
        assert_eq!(config.event_channel_capacity, 1000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ControlPlaneConfig = serde_json::from_str(
            r#"{"store": {"type": "file", "path": "/var/lib/zoneplane/data.json"}}"#,
        )
        .unwrap();
        assert_eq!(config.store.type_name(), "file");
        assert_eq!(config.fabric.type_name(), "static");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.event_channel_capacity, 1000);
    }

    #[test]
    fn http_fabric_requires_scheme() {
        let fabric = FabricConfig::Http {
            base_url: "fabric.internal".to_string(),
            api_token: "t".to_string(),
            timeout_secs: 5,
        };
        assert!(fabric.validate().is_err());
    }
}
