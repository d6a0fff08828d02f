// # Cross-Account Linking Model
//
// Permitted networks, linked zones and access requests.
//
// ## Permitted-network removal
//
// ```text
// ACTIVE ──delete──▶ REMOVAL_IN_PROGRESS ──reconciler──▶ (gone, get = 404)
// ```
//
// [`RemovalLifecycle`] keeps its state private; the only transition it
// exposes moves forward, so an entity observed in `REMOVAL_IN_PROGRESS` can
// never be read back as `ACTIVE`.
//
// ## Access requests
//
// ```text
// PENDING ──APPROVE──▶ ACTIVE ──REVOKE──▶ REVOKED
//    │                                      ▲
//    ├──REJECT──▶ REJECTED                  │
//    └──REVOKE──────────────────────────────┘
// ```
//
// REVOKED and REJECTED are terminal; a consumer reopens the relationship by
// creating a new linked zone, which files a new request.

use serde::{Deserialize, Serialize};

use super::Timestamp;
use crate::error::{Error, Result};

/// Removal state shared by entities with asynchronous deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalState {
    Active,
    RemovalInProgress,
}

/// Outcome of requesting removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalTransition {
    Started,
    AlreadyInProgress,
}

/// Forward-only removal state machine stored alongside its entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalLifecycle {
    state: RemovalState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    removal_requested_on: Option<Timestamp>,
}

impl RemovalLifecycle {
    pub fn new() -> Self {
        Self {
            state: RemovalState::Active,
            removal_requested_on: None,
        }
    }

    pub fn state(&self) -> RemovalState {
        self.state
    }

    pub fn removal_requested_on(&self) -> Option<Timestamp> {
        self.removal_requested_on
    }

    pub fn is_active(&self) -> bool {
        self.state == RemovalState::Active
    }

    /// Move to `REMOVAL_IN_PROGRESS`; repeated requests are idempotent
    pub fn request_removal(&mut self, now: Timestamp) -> RemovalTransition {
        match self.state {
            RemovalState::Active => {
                self.state = RemovalState::RemovalInProgress;
                self.removal_requested_on = Some(now);
                RemovalTransition::Started
            }
            RemovalState::RemovalInProgress => RemovalTransition::AlreadyInProgress,
        }
    }

    /// Whether the reconciler may purge the entity
    pub fn is_settled(&self, now: Timestamp, settle: chrono::Duration) -> bool {
        self.removal_requested_on
            .is_some_and(|requested| now.signed_duration_since(requested) >= settle)
    }
}

impl Default for RemovalLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Vpc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcReference {
    pub vpc_crn: String,
}

/// A VPC authorized to resolve a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermittedNetwork {
    pub id: String,
    pub zone_id: String,
    pub instance_id: String,
    #[serde(rename = "type")]
    pub network_type: NetworkType,
    pub permitted_network: VpcReference,
    #[serde(flatten)]
    pub lifecycle: RemovalLifecycle,
    pub created_on: Timestamp,
    pub modified_on: Timestamp,
}

impl PermittedNetwork {
    pub fn state(&self) -> RemovalState {
        self.lifecycle.state()
    }
}

/// Input for attaching a permitted network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermittedNetworkSpec {
    #[serde(rename = "type", default = "default_network_type")]
    pub network_type: NetworkType,
    pub permitted_network: VpcReference,
}

impl PermittedNetworkSpec {
    pub fn vpc(vpc_crn: impl Into<String>) -> Self {
        Self {
            network_type: NetworkType::Vpc,
            permitted_network: VpcReference {
                vpc_crn: vpc_crn.into(),
            },
        }
    }
}

fn default_network_type() -> NetworkType {
    NetworkType::Vpc
}

/// Owner-side zone a linked zone points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerZoneRef {
    pub instance_id: String,
    pub zone_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkedZoneState {
    PendingApproval,
    Approved,
    Rejected,
    Revoked,
    RemovalInProgress,
}

impl LinkedZoneState {
    /// Linked-zone state mirroring its access request
    pub fn mirroring(state: AccessRequestState) -> Self {
        match state {
            AccessRequestState::Pending => LinkedZoneState::PendingApproval,
            AccessRequestState::Active => LinkedZoneState::Approved,
            AccessRequestState::Rejected => LinkedZoneState::Rejected,
            AccessRequestState::Revoked => LinkedZoneState::Revoked,
        }
    }
}

/// Consumer-side view of another account's zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedZone {
    pub id: String,
    /// Consumer instance owning this linked zone
    pub instance_id: String,
    pub account_id: String,
    /// Name of the owner zone
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub linked_to: OwnerZoneRef,
    pub access_request_id: String,
    pub state: LinkedZoneState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_requested_on: Option<Timestamp>,
    pub created_on: Timestamp,
    pub modified_on: Timestamp,
}

impl LinkedZone {
    pub fn is_removing(&self) -> bool {
        self.state == LinkedZoneState::RemovalInProgress
    }

    /// Follow the access request unless removal already started
    pub fn sync_with(&mut self, access: AccessRequestState, now: Timestamp) {
        if !self.is_removing() {
            self.state = LinkedZoneState::mirroring(access);
            self.modified_on = now;
        }
    }

    /// Forward-only transition into removal; `false` if already removing
    pub fn request_removal(&mut self, now: Timestamp) -> bool {
        if self.is_removing() {
            return false;
        }
        self.state = LinkedZoneState::RemovalInProgress;
        self.removal_requested_on = Some(now);
        self.modified_on = now;
        true
    }

    pub fn is_settled(&self, now: Timestamp, settle: chrono::Duration) -> bool {
        self.is_removing()
            && self
                .removal_requested_on
                .is_some_and(|requested| now.signed_duration_since(requested) >= settle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedZoneSpec {
    pub owner_instance_id: String,
    pub owner_zone_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedZoneUpdate {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessRequestState {
    Pending,
    Active,
    Revoked,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessAction {
    Approve,
    Reject,
    Revoke,
}

/// Who asked for access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requestor {
    pub instance_id: String,
    pub account_id: String,
    pub linked_zone_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessHistoryEntry {
    pub action: AccessAction,
    pub account_id: String,
    pub from: AccessRequestState,
    pub to: AccessRequestState,
    /// Set when the transition was triggered by linked-zone deletion
    #[serde(default)]
    pub cascade: bool,
    pub at: Timestamp,
}

/// Owner-side authorization record for a linked zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub id: String,
    /// Owner instance
    pub instance_id: String,
    pub owner_account_id: String,
    pub zone_id: String,
    pub requestor: Requestor,
    pub state: AccessRequestState,
    #[serde(default)]
    pub history: Vec<AccessHistoryEntry>,
    pub created_on: Timestamp,
    pub modified_on: Timestamp,
}

impl AccessRequest {
    /// Target state of `action` from the current state, if legal
    pub fn next_state(&self, action: AccessAction) -> Option<AccessRequestState> {
        use AccessAction::*;
        use AccessRequestState::*;
        match (self.state, action) {
            (Pending, Approve) => Some(Active),
            (Pending, Reject) => Some(Rejected),
            (Pending | Active, Revoke) => Some(Revoked),
            _ => None,
        }
    }

    /// Apply an owner action, recording it in the history
    ///
    /// Authorization is checked by the caller; this enforces only the
    /// transition table. State is untouched on error.
    pub fn apply(
        &mut self,
        action: AccessAction,
        account_id: &str,
        now: Timestamp,
        cascade: bool,
    ) -> Result<(AccessRequestState, AccessRequestState)> {
        let from = self.state;
        let to = self.next_state(action).ok_or_else(|| {
            Error::conflict(format!(
                "access request {} is {:?}; cannot {:?}",
                self.id, from, action
            ))
        })?;
        self.state = to;
        self.modified_on = now;
        self.history.push(AccessHistoryEntry {
            action,
            account_id: account_id.to_string(),
            from,
            to,
            cascade,
            at: now,
        });
        Ok((from, to))
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, AccessRequestState::Pending | AccessRequestState::Active)
    }
}
