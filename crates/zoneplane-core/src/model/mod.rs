//! Control-plane data model
//!
//! Entities owned by the store plus the request shapes used to create and
//! update them. Request shapes (`*Spec`, `*Update`) are loose, wire-facing
//! field bags; entities are the validated, typed results.
//!
//! - [`Zone`] / [`ResourceRecord`]: zone store
//! - [`Monitor`] / [`Pool`] / [`LoadBalancer`]: global load balancing
//! - [`CustomResolver`] / [`ForwardingRule`]: custom resolvers
//! - [`PermittedNetwork`] / [`LinkedZone`] / [`AccessRequest`]: cross-account linking

pub mod crn;
pub mod linking;
pub mod load_balancing;
pub mod record;
pub mod resolver;
pub mod zone;

pub use crn::Crn;
pub use linking::{
    AccessAction, AccessHistoryEntry, AccessRequest, AccessRequestState, LinkedZone,
    LinkedZoneSpec, LinkedZoneState, LinkedZoneUpdate, NetworkType, OwnerZoneRef,
    PermittedNetwork, PermittedNetworkSpec, RemovalLifecycle, RemovalState, RemovalTransition,
    Requestor, VpcReference,
};
pub use load_balancing::{
    HealthState, HttpCheck, HttpCheckFields, HttpMethod, LoadBalancer, LoadBalancerSpec, LoadBalancerUpdate,
    Monitor, MonitorCheck, MonitorHeader, MonitorSpec, MonitorType, MonitorUpdate, Origin,
    OriginSpec, Pool, PoolHealth, PoolSpec, PoolUpdate, VsiDescriptor,
};
pub use record::{RecordFilter, RecordSpec, RecordUpdate, ResourceRecord};
pub use resolver::{
    CustomResolver, ForwardingRule, ForwardingRuleSpec, ForwardingRuleUpdate, ForwardingTargets,
    Location, LocationSpec, LocationUpdate, ResolverHealth, ResolverProfile, ResolverSpec,
    ResolverUpdate, RuleType, View, ViewSpec,
};
pub use zone::{Zone, ZoneSpec, ZoneState, ZoneUpdate};

/// Timestamp type used on every entity
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a new entity identifier
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
