//! Control-plane API boundary
//!
//! Turns [`ApiRequest`]s into service calls and results into
//! [`ApiResponse`]s. Framing (HTTP, queues) belongs to whoever embeds the
//! dispatcher.
//!
//! ## Status codes
//!
//! | Outcome                                         | Status |
//! |-------------------------------------------------|--------|
//! | reads, creates, updates, import, export         | 200    |
//! | delete of permitted network or linked zone      | 202    |
//! | any other delete                                | 204    |
//! | errors                                          | [`Error::status_code`] |

pub mod operation;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{Instrument, debug, info_span, warn};

pub use operation::{ApiRequest, Operation};

use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::service::ControlPlane;

/// Response handed back to the transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    /// JSON body; `Null` for 204
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: impl Serialize) -> Result<Self> {
        Ok(Self {
            status: 200,
            body: serde_json::to_value(body)?,
        })
    }

    fn accepted(body: impl Serialize) -> Result<Self> {
        Ok(Self {
            status: 202,
            body: serde_json::to_value(body)?,
        })
    }

    fn no_content() -> Result<Self> {
        Ok(Self {
            status: 204,
            body: Value::Null,
        })
    }

    /// Error body `{code, message, status, correlation_id}`
    pub fn from_error(err: &Error, ctx: &RequestContext) -> Self {
        let status = err.status_code();
        Self {
            status,
            body: json!({
                "code": err.code(),
                "message": err.to_string(),
                "status": status,
                "correlation_id": ctx.correlation_id,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request dispatcher over a shared [`ControlPlane`]
#[derive(Clone)]
pub struct ControlPlaneApi {
    plane: Arc<ControlPlane>,
}

impl ControlPlaneApi {
    pub fn new(plane: Arc<ControlPlane>) -> Self {
        Self { plane }
    }

    pub fn plane(&self) -> &Arc<ControlPlane> {
        &self.plane
    }

    /// Handle a raw JSON request; malformed requests get a 400
    pub async fn handle_json(&self, raw: Value) -> ApiResponse {
        match serde_json::from_value::<ApiRequest>(raw.clone()) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                let ctx = RequestContext {
                    instance_id: string_field(&raw, "instance_id"),
                    account_id: string_field(&raw, "account_id"),
                    correlation_id: raw
                        .get("correlation_id")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                };
                ApiResponse::from_error(&Error::validation(format!("malformed request: {e}")), &ctx)
            }
        }
    }

    /// Handle one request
    ///
    /// Runs inside a `request` span carrying the operation, instance and
    /// correlation ID, so every log line of the call can be traced back.
    pub async fn handle(&self, request: ApiRequest) -> ApiResponse {
        let ctx = request.context();
        let operation = request.operation.name();
        let span = info_span!(
            "request",
            operation,
            instance_id = %ctx.instance_id,
            correlation_id = %ctx.correlation(),
        );

        async {
            match self.dispatch(&ctx, request.operation).await {
                Ok(response) => {
                    debug!(status = response.status, "request handled");
                    response
                }
                Err(err) => {
                    let response = ApiResponse::from_error(&err, &ctx);
                    if response.status >= 500 {
                        warn!(status = response.status, "request failed: {}", err);
                    } else {
                        debug!(status = response.status, "request rejected: {}", err);
                    }
                    response
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, ctx: &RequestContext, operation: Operation) -> Result<ApiResponse> {
        let plane = &self.plane;
        match operation {
            Operation::CreateZone { zone } => ApiResponse::ok(plane.create_zone(ctx, zone).await?),
            Operation::GetZone { zone_id } => ApiResponse::ok(plane.get_zone(ctx, &zone_id).await?),
            Operation::ListZones { page } => ApiResponse::ok(plane.list_zones(ctx, &page).await?),
            Operation::UpdateZone { zone_id, update } => {
                ApiResponse::ok(plane.update_zone(ctx, &zone_id, update).await?)
            }
            Operation::DeleteZone { zone_id } => {
                plane.delete_zone(ctx, &zone_id).await?;
                ApiResponse::no_content()
            }

            Operation::CreateRecord { zone_id, record } => {
                ApiResponse::ok(plane.create_record(ctx, &zone_id, record).await?)
            }
            Operation::GetRecord { zone_id, record_id } => {
                ApiResponse::ok(plane.get_record(ctx, &zone_id, &record_id).await?)
            }
            Operation::ListRecords {
                zone_id,
                filter,
                page,
            } => ApiResponse::ok(plane.list_records(ctx, &zone_id, &filter, &page).await?),
            Operation::UpdateRecord {
                zone_id,
                record_id,
                update,
            } => ApiResponse::ok(plane.update_record(ctx, &zone_id, &record_id, update).await?),
            Operation::DeleteRecord { zone_id, record_id } => {
                plane.delete_record(ctx, &zone_id, &record_id).await?;
                ApiResponse::no_content()
            }
            Operation::ImportZoneFile {
                zone_id,
                content_type,
                content,
            } => ApiResponse::ok(
                plane
                    .import_zone_file(ctx, &zone_id, &content_type, &content)
                    .await?,
            ),
            Operation::ExportZoneFile { zone_id } => {
                ApiResponse::ok(plane.export_zone_file(ctx, &zone_id).await?)
            }

            Operation::CreateMonitor { monitor } => {
                ApiResponse::ok(plane.create_monitor(ctx, monitor).await?)
            }
            Operation::GetMonitor { monitor_id } => {
                ApiResponse::ok(plane.get_monitor(ctx, &monitor_id).await?)
            }
            Operation::ListMonitors { page } => {
                ApiResponse::ok(plane.list_monitors(ctx, &page).await?)
            }
            Operation::UpdateMonitor { monitor_id, update } => {
                ApiResponse::ok(plane.update_monitor(ctx, &monitor_id, update).await?)
            }
            Operation::DeleteMonitor { monitor_id } => {
                plane.delete_monitor(ctx, &monitor_id).await?;
                ApiResponse::no_content()
            }

            Operation::CreatePool { pool } => ApiResponse::ok(plane.create_pool(ctx, pool).await?),
            Operation::GetPool { pool_id } => ApiResponse::ok(plane.get_pool(ctx, &pool_id).await?),
            Operation::ListPools { page } => ApiResponse::ok(plane.list_pools(ctx, &page).await?),
            Operation::UpdatePool { pool_id, update } => {
                ApiResponse::ok(plane.update_pool(ctx, &pool_id, update).await?)
            }
            Operation::DeletePool { pool_id } => {
                plane.delete_pool(ctx, &pool_id).await?;
                ApiResponse::no_content()
            }
            Operation::ReportOriginHealth {
                pool_id,
                origin,
                health,
                failure_reason,
            } => ApiResponse::ok(
                plane
                    .report_origin_health(ctx, &pool_id, &origin, health, failure_reason)
                    .await?,
            ),

            Operation::CreateLoadBalancer {
                zone_id,
                load_balancer,
            } => ApiResponse::ok(plane.create_load_balancer(ctx, &zone_id, load_balancer).await?),
            Operation::GetLoadBalancer { zone_id, lb_id } => {
                ApiResponse::ok(plane.get_load_balancer(ctx, &zone_id, &lb_id).await?)
            }
            Operation::ListLoadBalancers { zone_id, page } => {
                ApiResponse::ok(plane.list_load_balancers(ctx, &zone_id, &page).await?)
            }
            Operation::UpdateLoadBalancer {
                zone_id,
                lb_id,
                update,
            } => ApiResponse::ok(
                plane
                    .update_load_balancer(ctx, &zone_id, &lb_id, update)
                    .await?,
            ),
            Operation::DeleteLoadBalancer { zone_id, lb_id } => {
                plane.delete_load_balancer(ctx, &zone_id, &lb_id).await?;
                ApiResponse::no_content()
            }

            Operation::CreateResolver { resolver } => {
                ApiResponse::ok(plane.create_resolver(ctx, resolver).await?)
            }
            Operation::GetResolver { resolver_id } => {
                ApiResponse::ok(plane.get_resolver(ctx, &resolver_id).await?)
            }
            Operation::ListResolvers { page } => {
                ApiResponse::ok(plane.list_resolvers(ctx, &page).await?)
            }
            Operation::UpdateResolver {
                resolver_id,
                update,
            } => ApiResponse::ok(plane.update_resolver(ctx, &resolver_id, update).await?),
            Operation::DeleteResolver { resolver_id } => {
                plane.delete_resolver(ctx, &resolver_id).await?;
                ApiResponse::no_content()
            }
            Operation::AddLocation {
                resolver_id,
                location,
            } => ApiResponse::ok(plane.add_location(ctx, &resolver_id, location).await?),
            Operation::UpdateLocation {
                resolver_id,
                location_id,
                update,
            } => ApiResponse::ok(
                plane
                    .update_location(ctx, &resolver_id, &location_id, update)
                    .await?,
            ),
            Operation::DeleteLocation {
                resolver_id,
                location_id,
            } => {
                plane.delete_location(ctx, &resolver_id, &location_id).await?;
                ApiResponse::no_content()
            }
            Operation::ReorderLocations {
                resolver_id,
                locations,
            } => ApiResponse::ok(plane.reorder_locations(ctx, &resolver_id, locations).await?),

            Operation::CreateForwardingRule { resolver_id, rule } => {
                ApiResponse::ok(plane.create_forwarding_rule(ctx, &resolver_id, rule).await?)
            }
            Operation::GetForwardingRule {
                resolver_id,
                rule_id,
            } => ApiResponse::ok(plane.get_forwarding_rule(ctx, &resolver_id, &rule_id).await?),
            Operation::ListForwardingRules { resolver_id, page } => {
                ApiResponse::ok(plane.list_forwarding_rules(ctx, &resolver_id, &page).await?)
            }
            Operation::UpdateForwardingRule {
                resolver_id,
                rule_id,
                update,
            } => ApiResponse::ok(
                plane
                    .update_forwarding_rule(ctx, &resolver_id, &rule_id, update)
                    .await?,
            ),
            Operation::DeleteForwardingRule {
                resolver_id,
                rule_id,
            } => {
                plane
                    .delete_forwarding_rule(ctx, &resolver_id, &rule_id)
                    .await?;
                ApiResponse::no_content()
            }

            Operation::CreatePermittedNetwork {
                zone_id,
                permitted_network,
            } => ApiResponse::ok(
                plane
                    .create_permitted_network(ctx, &zone_id, permitted_network)
                    .await?,
            ),
            Operation::GetPermittedNetwork {
                zone_id,
                permitted_network_id,
            } => ApiResponse::ok(
                plane
                    .get_permitted_network(ctx, &zone_id, &permitted_network_id)
                    .await?,
            ),
            Operation::ListPermittedNetworks { zone_id, page } => {
                ApiResponse::ok(plane.list_permitted_networks(ctx, &zone_id, &page).await?)
            }
            Operation::DeletePermittedNetwork {
                zone_id,
                permitted_network_id,
            } => ApiResponse::accepted(
                plane
                    .delete_permitted_network(ctx, &zone_id, &permitted_network_id)
                    .await?,
            ),

            Operation::CreateLinkedZone { linked_zone } => {
                ApiResponse::ok(plane.create_linked_zone(ctx, linked_zone).await?)
            }
            Operation::GetLinkedZone { linked_zone_id } => {
                ApiResponse::ok(plane.get_linked_zone(ctx, &linked_zone_id).await?)
            }
            Operation::ListLinkedZones { page } => {
                ApiResponse::ok(plane.list_linked_zones(ctx, &page).await?)
            }
            Operation::UpdateLinkedZone {
                linked_zone_id,
                update,
            } => ApiResponse::ok(plane.update_linked_zone(ctx, &linked_zone_id, update).await?),
            Operation::DeleteLinkedZone { linked_zone_id } => {
                ApiResponse::accepted(plane.delete_linked_zone(ctx, &linked_zone_id).await?)
            }
            Operation::ListLinkedZoneRecords {
                linked_zone_id,
                filter,
                page,
            } => ApiResponse::ok(
                plane
                    .list_linked_zone_records(ctx, &linked_zone_id, &filter, &page)
                    .await?,
            ),

            Operation::GetAccessRequest {
                zone_id,
                access_request_id,
            } => ApiResponse::ok(
                plane
                    .get_access_request(ctx, &zone_id, &access_request_id)
                    .await?,
            ),
            Operation::ListAccessRequests { zone_id, page } => {
                ApiResponse::ok(plane.list_access_requests(ctx, &zone_id, &page).await?)
            }
            Operation::UpdateAccessRequest {
                zone_id,
                access_request_id,
                action,
            } => ApiResponse::ok(
                plane
                    .update_access_request(ctx, &zone_id, &access_request_id, action)
                    .await?,
            ),
        }
    }
}

fn string_field(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
