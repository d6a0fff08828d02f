//! Wire shape of control-plane operations
//!
//! ```json
//! {
//!   "instance_id": "inst-1",
//!   "account_id": "acct-1",
//!   "correlation_id": "req-42",
//!   "operation": "list_records",
//!   "params": { "zone_id": "…", "filter": { "type": "A" }, "page": { "limit": 50 } }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::model::{
    AccessAction, ForwardingRuleSpec, ForwardingRuleUpdate, HealthState, LinkedZoneSpec,
    LinkedZoneUpdate, LoadBalancerSpec, LoadBalancerUpdate, LocationSpec, LocationUpdate,
    MonitorSpec, MonitorUpdate, PermittedNetworkSpec, PoolSpec, PoolUpdate, RecordFilter,
    RecordSpec, RecordUpdate, ResolverSpec, ResolverUpdate, ZoneSpec, ZoneUpdate,
};
use crate::pagination::PageRequest;

/// One request to the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub instance_id: String,
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub operation: Operation,
}

impl ApiRequest {
    pub fn new(ctx: &RequestContext, operation: Operation) -> Self {
        Self {
            instance_id: ctx.instance_id.clone(),
            account_id: ctx.account_id.clone(),
            correlation_id: ctx.correlation_id.clone(),
            operation,
        }
    }

    pub fn context(&self) -> RequestContext {
        RequestContext {
            instance_id: self.instance_id.clone(),
            account_id: self.account_id.clone(),
            correlation_id: self.correlation_id.clone(),
        }
    }
}

/// Every operation the control plane exposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "params", rename_all = "snake_case")]
pub enum Operation {
    // Zones
    CreateZone {
        zone: ZoneSpec,
    },
    GetZone {
        zone_id: String,
    },
    ListZones {
        #[serde(default)]
        page: PageRequest,
    },
    UpdateZone {
        zone_id: String,
        update: ZoneUpdate,
    },
    DeleteZone {
        zone_id: String,
    },

    // Resource records
    CreateRecord {
        zone_id: String,
        record: RecordSpec,
    },
    GetRecord {
        zone_id: String,
        record_id: String,
    },
    ListRecords {
        zone_id: String,
        #[serde(default)]
        filter: RecordFilter,
        #[serde(default)]
        page: PageRequest,
    },
    UpdateRecord {
        zone_id: String,
        record_id: String,
        update: RecordUpdate,
    },
    DeleteRecord {
        zone_id: String,
        record_id: String,
    },
    ImportZoneFile {
        zone_id: String,
        content_type: String,
        content: String,
    },
    ExportZoneFile {
        zone_id: String,
    },

    // Monitors
    CreateMonitor {
        monitor: MonitorSpec,
    },
    GetMonitor {
        monitor_id: String,
    },
    ListMonitors {
        #[serde(default)]
        page: PageRequest,
    },
    UpdateMonitor {
        monitor_id: String,
        update: MonitorUpdate,
    },
    DeleteMonitor {
        monitor_id: String,
    },

    // Pools
    CreatePool {
        pool: PoolSpec,
    },
    GetPool {
        pool_id: String,
    },
    ListPools {
        #[serde(default)]
        page: PageRequest,
    },
    UpdatePool {
        pool_id: String,
        update: PoolUpdate,
    },
    DeletePool {
        pool_id: String,
    },
    ReportOriginHealth {
        pool_id: String,
        origin: String,
        health: HealthState,
        #[serde(default)]
        failure_reason: Option<String>,
    },

    // Load balancers
    CreateLoadBalancer {
        zone_id: String,
        load_balancer: LoadBalancerSpec,
    },
    GetLoadBalancer {
        zone_id: String,
        lb_id: String,
    },
    ListLoadBalancers {
        zone_id: String,
        #[serde(default)]
        page: PageRequest,
    },
    UpdateLoadBalancer {
        zone_id: String,
        lb_id: String,
        update: LoadBalancerUpdate,
    },
    DeleteLoadBalancer {
        zone_id: String,
        lb_id: String,
    },

    // Custom resolvers
    CreateResolver {
        resolver: ResolverSpec,
    },
    GetResolver {
        resolver_id: String,
    },
    ListResolvers {
        #[serde(default)]
        page: PageRequest,
    },
    UpdateResolver {
        resolver_id: String,
        update: ResolverUpdate,
    },
    DeleteResolver {
        resolver_id: String,
    },
    AddLocation {
        resolver_id: String,
        location: LocationSpec,
    },
    UpdateLocation {
        resolver_id: String,
        location_id: String,
        update: LocationUpdate,
    },
    DeleteLocation {
        resolver_id: String,
        location_id: String,
    },
    ReorderLocations {
        resolver_id: String,
        locations: Vec<String>,
    },

    // Forwarding rules
    CreateForwardingRule {
        resolver_id: String,
        rule: ForwardingRuleSpec,
    },
    GetForwardingRule {
        resolver_id: String,
        rule_id: String,
    },
    ListForwardingRules {
        resolver_id: String,
        #[serde(default)]
        page: PageRequest,
    },
    UpdateForwardingRule {
        resolver_id: String,
        rule_id: String,
        update: ForwardingRuleUpdate,
    },
    DeleteForwardingRule {
        resolver_id: String,
        rule_id: String,
    },

    // Permitted networks
    CreatePermittedNetwork {
        zone_id: String,
        permitted_network: PermittedNetworkSpec,
    },
    GetPermittedNetwork {
        zone_id: String,
        permitted_network_id: String,
    },
    ListPermittedNetworks {
        zone_id: String,
        #[serde(default)]
        page: PageRequest,
    },
    DeletePermittedNetwork {
        zone_id: String,
        permitted_network_id: String,
    },

    // Linked zones
    CreateLinkedZone {
        linked_zone: LinkedZoneSpec,
    },
    GetLinkedZone {
        linked_zone_id: String,
    },
    ListLinkedZones {
        #[serde(default)]
        page: PageRequest,
    },
    UpdateLinkedZone {
        linked_zone_id: String,
        update: LinkedZoneUpdate,
    },
    DeleteLinkedZone {
        linked_zone_id: String,
    },
    ListLinkedZoneRecords {
        linked_zone_id: String,
        #[serde(default)]
        filter: RecordFilter,
        #[serde(default)]
        page: PageRequest,
    },

    // Access requests (owner side)
    GetAccessRequest {
        zone_id: String,
        access_request_id: String,
    },
    ListAccessRequests {
        zone_id: String,
        #[serde(default)]
        page: PageRequest,
    },
    UpdateAccessRequest {
        zone_id: String,
        access_request_id: String,
        action: AccessAction,
    },
}

impl Operation {
    /// Snake-case operation name, as used on the wire and in log spans
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateZone { .. } => "create_zone",
            Operation::GetZone { .. } => "get_zone",
            Operation::ListZones { .. } => "list_zones",
            Operation::UpdateZone { .. } => "update_zone",
            Operation::DeleteZone { .. } => "delete_zone",
            Operation::CreateRecord { .. } => "create_record",
            Operation::GetRecord { .. } => "get_record",
            Operation::ListRecords { .. } => "list_records",
            Operation::UpdateRecord { .. } => "update_record",
            Operation::DeleteRecord { .. } => "delete_record",
            Operation::ImportZoneFile { .. } => "import_zone_file",
            Operation::ExportZoneFile { .. } => "export_zone_file",
            Operation::CreateMonitor { .. } => "create_monitor",
            Operation::GetMonitor { .. } => "get_monitor",
            Operation::ListMonitors { .. } => "list_monitors",
            Operation::UpdateMonitor { .. } => "update_monitor",
            Operation::DeleteMonitor { .. } => "delete_monitor",
            Operation::CreatePool { .. } => "create_pool",
            Operation::GetPool { .. } => "get_pool",
            Operation::ListPools { .. } => "list_pools",
            Operation::UpdatePool { .. } => "update_pool",
            Operation::DeletePool { .. } => "delete_pool",
            Operation::ReportOriginHealth { .. } => "report_origin_health",
            Operation::CreateLoadBalancer { .. } => "create_load_balancer",
            Operation::GetLoadBalancer { .. } => "get_load_balancer",
            Operation::ListLoadBalancers { .. } => "list_load_balancers",
            Operation::UpdateLoadBalancer { .. } => "update_load_balancer",
            Operation::DeleteLoadBalancer { .. } => "delete_load_balancer",
            Operation::CreateResolver { .. } => "create_resolver",
            Operation::GetResolver { .. } => "get_resolver",
            Operation::ListResolvers { .. } => "list_resolvers",
            Operation::UpdateResolver { .. } => "update_resolver",
            Operation::DeleteResolver { .. } => "delete_resolver",
            Operation::AddLocation { .. } => "add_location",
            Operation::UpdateLocation { .. } => "update_location",
            Operation::DeleteLocation { .. } => "delete_location",
            Operation::ReorderLocations { .. } => "reorder_locations",
            Operation::CreateForwardingRule { .. } => "create_forwarding_rule",
            Operation::GetForwardingRule { .. } => "get_forwarding_rule",
            Operation::ListForwardingRules { .. } => "list_forwarding_rules",
            Operation::UpdateForwardingRule { .. } => "update_forwarding_rule",
            Operation::DeleteForwardingRule { .. } => "delete_forwarding_rule",
            Operation::CreatePermittedNetwork { .. } => "create_permitted_network",
            Operation::GetPermittedNetwork { .. } => "get_permitted_network",
            Operation::ListPermittedNetworks { .. } => "list_permitted_networks",
            Operation::DeletePermittedNetwork { .. } => "delete_permitted_network",
            Operation::CreateLinkedZone { .. } => "create_linked_zone",
            Operation::GetLinkedZone { .. } => "get_linked_zone",
            Operation::ListLinkedZones { .. } => "list_linked_zones",
            Operation::UpdateLinkedZone { .. } => "update_linked_zone",
            Operation::DeleteLinkedZone { .. } => "delete_linked_zone",
            Operation::ListLinkedZoneRecords { .. } => "list_linked_zone_records",
            Operation::GetAccessRequest { .. } => "get_access_request",
            Operation::ListAccessRequests { .. } => "list_access_requests",
            Operation::UpdateAccessRequest { .. } => "update_access_request",
        }
    }

    /// Whether this operation changes state
    pub fn is_mutation(&self) -> bool {
        let name = self.name();
        !(name.starts_with("get_") || name.starts_with("list_") || name == "export_zone_file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecordType;

    #[test]
    fn parses_tagged_request() {
        let raw = serde_json::json!({
            "instance_id": "inst",
            "account_id": "acct",
            "correlation_id": "req-1",
            "operation": "list_records",
            "params": { "zone_id": "z1", "filter": { "type": "A" } }
        });
        let request: ApiRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.context().correlation(), "req-1");
        match &request.operation {
            Operation::ListRecords { zone_id, filter, page } => {
                assert_eq!(zone_id, "z1");
                assert_eq!(filter.record_type, Some(RecordType::A));
                assert_eq!(*page, PageRequest::default());
            }
            other => panic!("unexpected operation {other:?}"),
        }
        assert!(!request.operation.is_mutation());
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let raw = serde_json::json!({
            "instance_id": "inst",
            "account_id": "acct",
            "operation": "drop_everything",
            "params": {}
        });
        assert!(serde_json::from_value::<ApiRequest>(raw).is_err());
    }
}
