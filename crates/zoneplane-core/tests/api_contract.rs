//! Contract: the JSON operation boundary
//!
//! Status codes, error bodies and a zone-file round trip driven entirely
//! through `ControlPlaneApi::handle_json`.

mod common;

use common::*;
use serde_json::{Value, json};
use zoneplane_core::{ApiRequest, ControlPlaneApi, Operation};

const ZONE_FILE: &str = "$ORIGIN example.com.
$TTL 3600
@ IN A 10.0.0.1
www IN CNAME example.com.
www IN A 10.0.0.2
";

fn api() -> ControlPlaneApi {
    let (plane, _rx) = plane();
    ControlPlaneApi::new(plane)
}

fn request(instance: &str, account: &str, operation: &str, params: Value) -> Value {
    json!({
        "instance_id": instance,
        "account_id": account,
        "correlation_id": format!("req-{operation}"),
        "operation": operation,
        "params": params,
    })
}

fn as_owner(operation: &str, params: Value) -> Value {
    request("instance-owner", "account-owner", operation, params)
}

async fn create_zone(api: &ControlPlaneApi, name: &str) -> String {
    let response = api
        .handle_json(as_owner("create_zone", json!({ "zone": { "name": name } })))
        .await;
    assert_eq!(response.status, 200, "{:?}", response.body);
    response.body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn asynchronous_deletes_answer_202() {
    let api = api();
    let zone_id = create_zone(&api, "example.com").await;

    let created = api
        .handle_json(as_owner(
            "create_permitted_network",
            json!({
                "zone_id": zone_id,
                "permitted_network": { "type": "vpc", "permitted_network": { "vpc_crn": VPC_A } }
            }),
        ))
        .await;
    assert_eq!(created.status, 200, "{:?}", created.body);
    assert_eq!(created.body["state"], "ACTIVE");
    let network_id = created.body["id"].as_str().unwrap().to_string();

    let deleted = api
        .handle_json(as_owner(
            "delete_permitted_network",
            json!({ "zone_id": zone_id, "permitted_network_id": network_id }),
        ))
        .await;
    assert_eq!(deleted.status, 202);
    assert_eq!(deleted.body["state"], "REMOVAL_IN_PROGRESS");

    let zone = api
        .handle_json(as_owner("get_zone", json!({ "zone_id": zone_id })))
        .await;
    assert_eq!(zone.body["state"], "PENDING_NETWORK_ADD");
}

#[tokio::test]
async fn errors_carry_code_status_and_correlation() {
    let api = api();
    create_zone(&api, "example.com").await;

    let duplicate = api
        .handle_json(as_owner("create_zone", json!({ "zone": { "name": "example.com" } })))
        .await;
    assert_eq!(duplicate.status, 409);
    assert_eq!(duplicate.body["code"], "conflict");
    assert_eq!(duplicate.body["status"], 409);
    assert_eq!(duplicate.body["correlation_id"], "req-create_zone");
    assert!(!duplicate.is_success());

    let bad_limit = api
        .handle_json(as_owner("list_zones", json!({ "page": { "limit": 0 } })))
        .await;
    assert_eq!(bad_limit.status, 400);
    assert_eq!(bad_limit.body["code"], "validation_failed");

    let unknown = api
        .handle_json(as_owner("get_pool", json!({ "pool_id": "missing" })))
        .await;
    assert_eq!(unknown.status, 404);

    let garbage = api.handle_json(json!("not an object")).await;
    assert_eq!(garbage.status, 400);
    assert_eq!(garbage.body["correlation_id"], Value::Null);
}

#[tokio::test]
async fn owner_only_actions_answer_403() {
    let api = api();
    let zone_id = create_zone(&api, "example.com").await;
    let linked = api
        .handle_json(request(
            "instance-consumer",
            "account-consumer",
            "create_linked_zone",
            json!({
                "linked_zone": {
                    "owner_instance_id": "instance-owner",
                    "owner_zone_id": zone_id,
                }
            }),
        ))
        .await;
    assert_eq!(linked.status, 200, "{:?}", linked.body);
    assert_eq!(linked.body["state"], "PENDING_APPROVAL");
    let access_request_id = linked.body["access_request_id"].as_str().unwrap().to_string();

    let params = json!({
        "zone_id": zone_id,
        "access_request_id": access_request_id,
        "action": "APPROVE",
    });
    let denied = api
        .handle_json(request(
            "instance-consumer",
            "account-consumer",
            "update_access_request",
            params.clone(),
        ))
        .await;
    assert_eq!(denied.status, 403);
    assert_eq!(denied.body["code"], "not_authorized");

    let approved = api.handle_json(as_owner("update_access_request", params)).await;
    assert_eq!(approved.status, 200);
    assert_eq!(approved.body["state"], "ACTIVE");
}

#[tokio::test]
async fn zone_file_round_trip() {
    let api = api();
    let zone_id = create_zone(&api, "example.com").await;

    let imported = api
        .handle_json(as_owner(
            "import_zone_file",
            json!({ "zone_id": zone_id, "content_type": "text/plain", "content": ZONE_FILE }),
        ))
        .await;
    assert_eq!(imported.status, 200, "{:?}", imported.body);
    assert_eq!(imported.body["total_records_parsed"], 3);
    assert_eq!(imported.body["records_added"], 2);
    assert_eq!(imported.body["records_failed"], 1);
    assert_eq!(imported.body["messages"][0]["line"], 5);

    let rejected = api
        .handle_json(as_owner(
            "import_zone_file",
            json!({ "zone_id": zone_id, "content_type": "application/json", "content": "{}" }),
        ))
        .await;
    assert_eq!(rejected.status, 400);

    let exported = api
        .handle_json(as_owner("export_zone_file", json!({ "zone_id": zone_id })))
        .await;
    assert_eq!(exported.status, 200);
    let text = exported.body.as_str().expect("export body is zone-file text");
    assert!(text.starts_with("$ORIGIN example.com.\n"));
    assert!(text.contains("www.example.com. 3600 IN CNAME"));

    // The exported text imports cleanly into a fresh zone.
    let copy = api
        .handle_json(request(
            "instance-consumer",
            "account-consumer",
            "create_zone",
            json!({ "zone": { "name": "example.com" } }),
        ))
        .await;
    let copy_id = copy.body["id"].as_str().unwrap();
    let reimported = api
        .handle(
            serde_json::from_value::<ApiRequest>(request(
                "instance-consumer",
                "account-consumer",
                "import_zone_file",
                json!({ "zone_id": copy_id, "content_type": "text/dns", "content": text }),
            ))
            .unwrap(),
        )
        .await;
    assert_eq!(reimported.body["records_added"], 2);
    assert_eq!(reimported.body["records_failed"], 0);
}

#[tokio::test]
async fn typed_requests_match_the_wire_shape() {
    let api = api();
    let request = ApiRequest::new(
        &owner().with_correlation_id("typed-1"),
        Operation::ListZones {
            page: Default::default(),
        },
    );
    let wire = serde_json::to_value(&request).unwrap();
    assert_eq!(wire["operation"], "list_zones");
    let response = api.handle_json(wire).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body["total_count"], 0);
    assert!(
        response.body["first"]["href"]
            .as_str()
            .unwrap()
            .starts_with("/instances/instance-owner/zones?")
    );
}
