//! DNS zones

use serde::{Deserialize, Serialize};

use super::Timestamp;

/// Lifecycle state of a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneState {
    /// No active permitted network yet
    PendingNetworkAdd,
    /// At least one active permitted network
    Active,
    /// Removed; only ever seen on the value returned by a delete
    Deleted,
}

/// A DNS zone owned by a service instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub instance_id: String,
    /// Account that created the zone; owner side of access requests
    pub account_id: String,
    /// Fully-qualified name without trailing dot, lowercase
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub state: ZoneState,
    pub created_on: Timestamp,
    pub modified_on: Timestamp,
}

/// Input for creating a zone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ZoneSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Zone update; only label and description are mutable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneUpdate {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
