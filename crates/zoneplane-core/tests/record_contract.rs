//! Contract: zone store and record codec behavior
//!
//! Verifies record validation per type, read-time name projection,
//! exact-match filtering and the zone cascade rules.

mod common;

use common::*;
use zoneplane_core::codec::{RdataFields, RecordType};
use zoneplane_core::model::{
    LoadBalancerSpec, OriginSpec, PoolSpec, RecordFilter, RecordSpec, RecordUpdate, ZoneSpec,
    ZoneState, ZoneUpdate,
};
use zoneplane_core::{ControlPlaneEvent, Error, PageRequest, RequestContext};

#[tokio::test]
async fn srv_requires_service_and_protocol() {
    let (plane, _rx) = plane();
    let ctx = owner();
    let zone = plane.create_zone(&ctx, ZoneSpec::new("example.com")).await.unwrap();

    let bare = RecordSpec::new("srv", RecordType::Srv, RdataFields::srv(10, 5, 8080, "host.example.com"));
    let err = plane
        .create_record(&ctx, &zone.id, bare.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "got {err:?}");

    let created = plane
        .create_record(&ctx, &zone.id, bare.with_service("_sip", "_udp"))
        .await
        .unwrap();
    let fetched = plane.get_record(&ctx, &zone.id, &created.id).await.unwrap();
    assert_eq!(fetched.service.as_deref(), Some("_sip"));
    assert_eq!(fetched.protocol.as_deref(), Some("_udp"));
    assert_eq!(fetched.name, "_sip._udp.srv.example.com");
}

#[tokio::test]
async fn name_and_type_filters_select_the_same_subset() {
    let (plane, _rx) = plane();
    let ctx = owner();
    let zone = plane.create_zone(&ctx, ZoneSpec::new("example.com")).await.unwrap();

    for (name, record_type, fields) in [
        ("atest", RecordType::A, RdataFields::ip("10.0.0.1")),
        ("atest", RecordType::A, RdataFields::ip("10.0.0.2")),
        ("ptr", RecordType::Ptr, RdataFields::ptr("atest.example.com")),
        ("v6", RecordType::Aaaa, RdataFields::ip("2001:db8::1")),
    ] {
        plane
            .create_record(&ctx, &zone.id, RecordSpec::new(name, record_type, fields))
            .await
            .unwrap();
    }

    let count = |filter: RecordFilter| {
        let plane = plane.clone();
        let ctx = ctx.clone();
        let zone_id = zone.id.clone();
        async move {
            plane
                .list_records(&ctx, &zone_id, &filter, &PageRequest::default())
                .await
                .unwrap()
                .total_count
        }
    };

    assert_eq!(count(RecordFilter::by_name("atest.example.com")).await, 2);
    assert_eq!(count(RecordFilter::by_name("atest")).await, 2);
    assert_eq!(count(RecordFilter::by_type(RecordType::A)).await, 2);
    assert_eq!(
        count(RecordFilter::by_name("atest.example.com").with_type(RecordType::A)).await,
        2
    );
    assert_eq!(count(RecordFilter::by_type(RecordType::Ptr)).await, 1);
    assert_eq!(count(RecordFilter::by_type(RecordType::Aaaa)).await, 1);
    assert_eq!(count(RecordFilter::default()).await, 4);
}

#[tokio::test]
async fn per_type_rules_are_enforced() {
    let (plane, _rx) = plane();
    let ctx = owner();
    let zone = plane.create_zone(&ctx, ZoneSpec::new("example.com")).await.unwrap();

    let rejected = [
        RecordSpec::new("a", RecordType::A, RdataFields::ip("2001:db8::1")),
        RecordSpec::new("aaaa", RecordType::Aaaa, RdataFields::ip("10.0.0.1")),
        RecordSpec::new("mx", RecordType::Mx, RdataFields::mx("mail.example.com", 70_000)),
        RecordSpec::new("srv", RecordType::Srv, RdataFields::srv(1, 1, 65_536, "t.example.com"))
            .with_service("_x", "_tcp"),
        RecordSpec::new("cn", RecordType::Cname, RdataFields::cname("not a host")),
        RecordSpec::new("ptr", RecordType::Ptr, RdataFields::ptr("host.elsewhere.org")),
        RecordSpec::new("ttl", RecordType::A, RdataFields::ip("10.0.0.1")).with_ttl(10),
        RecordSpec::new("a", RecordType::A, RdataFields::txt("10.0.0.1")),
    ];
    for spec in rejected {
        let err = plane.create_record(&ctx, &zone.id, spec.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{spec:?} gave {err:?}");
    }

    let txt = plane
        .create_record(
            &ctx,
            &zone.id,
            RecordSpec::new("txt", RecordType::Txt, RdataFields::txt("v=spf1 ünïcode -all")),
        )
        .await
        .unwrap();
    assert_eq!(txt.ttl, 900);
}

#[tokio::test]
async fn cname_owner_holds_nothing_else() {
    let (plane, _rx) = plane();
    let ctx = owner();
    let zone = plane.create_zone(&ctx, ZoneSpec::new("example.com")).await.unwrap();

    plane
        .create_record(
            &ctx,
            &zone.id,
            RecordSpec::new("www", RecordType::Cname, RdataFields::cname("web.example.com")),
        )
        .await
        .unwrap();
    let err = plane
        .create_record(
            &ctx,
            &zone.id,
            RecordSpec::new("www.example.com", RecordType::A, RdataFields::ip("10.0.0.1")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let a = RecordSpec::new("api", RecordType::A, RdataFields::ip("10.0.0.1"));
    plane.create_record(&ctx, &zone.id, a.clone()).await.unwrap();
    let err = plane.create_record(&ctx, &zone.id, a).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "identical records are rejected");
}

#[tokio::test]
async fn partial_update_revalidates_and_keeps_type() {
    let (plane, _rx) = plane();
    let ctx = owner();
    let zone = plane.create_zone(&ctx, ZoneSpec::new("example.com")).await.unwrap();
    let mx = plane
        .create_record(
            &ctx,
            &zone.id,
            RecordSpec::new("@", RecordType::Mx, RdataFields::mx("mail.example.com", 10)),
        )
        .await
        .unwrap();
    assert_eq!(mx.name, "example.com");

    let patch = RecordUpdate {
        rdata: Some(RdataFields {
            preference: Some(20),
            ..Default::default()
        }),
        ttl: Some(3600),
        ..Default::default()
    };
    let updated = plane.update_record(&ctx, &zone.id, &mx.id, patch).await.unwrap();
    assert_eq!(updated.record_type(), RecordType::Mx);
    assert_eq!(updated.ttl, 3600);
    assert_eq!(
        updated.rdata.to_zone_text(),
        "20 mail.example.com."
    );

    let bad = RecordUpdate {
        rdata: Some(RdataFields {
            preference: Some(-1),
            ..Default::default()
        }),
        ..Default::default()
    };
    let err = plane.update_record(&ctx, &zone.id, &mx.id, bad).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    let unchanged = plane.get_record(&ctx, &zone.id, &mx.id).await.unwrap();
    assert_eq!(unchanged, updated);
}

#[tokio::test]
async fn zone_names_are_unique_per_instance() {
    let (plane, _rx) = plane();
    plane.create_zone(&owner(), ZoneSpec::new("example.com")).await.unwrap();
    let err = plane
        .create_zone(&owner(), ZoneSpec::new("Example.COM."))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // Another instance may reuse the name.
    plane.create_zone(&consumer(), ZoneSpec::new("example.com")).await.unwrap();
}

#[tokio::test]
async fn zone_update_touches_only_label_and_description() {
    let (plane, _rx) = plane();
    let ctx = owner();
    let zone = plane
        .create_zone(&ctx, ZoneSpec::new("example.com").with_label("old"))
        .await
        .unwrap();
    let updated = plane
        .update_zone(
            &ctx,
            &zone.id,
            ZoneUpdate {
                description: Some("private zone".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.label, "old");
    assert_eq!(updated.description, "private zone");
    assert_eq!(updated.name, zone.name);
    assert_eq!(updated.state, ZoneState::PendingNetworkAdd);
}

#[tokio::test]
async fn zone_delete_cascades_records_but_not_load_balancers() {
    let (plane, mut rx) = plane();
    let ctx = owner();
    let zone = plane.create_zone(&ctx, ZoneSpec::new("example.com")).await.unwrap();
    plane
        .create_record(
            &ctx,
            &zone.id,
            RecordSpec::new("a", RecordType::A, RdataFields::ip("10.0.0.1")),
        )
        .await
        .unwrap();

    let pool = plane
        .create_pool(&ctx, PoolSpec::new("pool", vec![OriginSpec::new("o1", "10.1.0.1")]))
        .await
        .unwrap();
    let lb = plane
        .create_load_balancer(
            &ctx,
            &zone.id,
            LoadBalancerSpec::new("glb", &pool.id, vec![pool.id.clone()]),
        )
        .await
        .unwrap();

    let err = plane.delete_zone(&ctx, &zone.id).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    plane.delete_load_balancer(&ctx, &zone.id, &lb.id).await.unwrap();
    let deleted = plane.delete_zone(&ctx, &zone.id).await.unwrap();
    assert_eq!(deleted.state, ZoneState::Deleted);

    let err = plane.get_zone(&ctx, &zone.id).await.unwrap_err();
    assert!(err.is_not_found());
    let err = plane
        .list_records(&ctx, &zone.id, &RecordFilter::default(), &PageRequest::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let deleted_event = drain(&mut rx).into_iter().find_map(|e| match e {
        ControlPlaneEvent::ZoneDeleted { records_removed, .. } => Some(records_removed),
        _ => None,
    });
    assert_eq!(deleted_event, Some(1));
}

#[tokio::test]
async fn zones_are_invisible_to_other_instances() {
    let (plane, _rx) = plane();
    let zone = plane.create_zone(&owner(), ZoneSpec::new("example.com")).await.unwrap();
    let err = plane.get_zone(&consumer(), &zone.id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn exported_zone_reimports_every_record_type() {
    let (plane, _rx) = plane();
    let zone = plane.create_zone(&owner(), ZoneSpec::new("example.com")).await.unwrap();
    let specs = [
        RecordSpec::new("www", RecordType::A, RdataFields::ip("10.0.0.1")),
        RecordSpec::new("www", RecordType::Aaaa, RdataFields::ip("2001:db8::1")),
        RecordSpec::new("alias", RecordType::Cname, RdataFields::cname("www.example.com")),
        RecordSpec::new("@", RecordType::Mx, RdataFields::mx("mail.example.com", 10)),
        RecordSpec::new("sip", RecordType::Srv, RdataFields::srv(1, 2, 5060, "www.example.com"))
            .with_service("_sip", "_udp"),
        RecordSpec::new(
            "txt",
            RecordType::Txt,
            RdataFields::txt("v=1 (note); say \"hi\" \\ bye\nline2\ttab"),
        ),
        RecordSpec::new("rev", RecordType::Ptr, RdataFields::ptr("www.example.com")),
    ];
    for spec in specs {
        plane.create_record(&owner(), &zone.id, spec).await.unwrap();
    }

    let exported = plane.export_zone_file(&owner(), &zone.id).await.unwrap();
    assert_eq!(exported.lines().count(), 2 + 7, "one line per record:\n{exported}");

    let copy = plane.create_zone(&consumer(), ZoneSpec::new("example.com")).await.unwrap();
    let summary = plane
        .import_zone_file(&consumer(), &copy.id, "text/dns", &exported)
        .await
        .unwrap();
    assert!(summary.messages.is_empty(), "{:?}", summary.messages);
    assert_eq!(summary.records_added, 7);

    let project = |ctx: RequestContext, zone_id: String| {
        let plane = plane.clone();
        async move {
            let mut records: Vec<_> = plane
                .list_records(&ctx, &zone_id, &RecordFilter::default(), &PageRequest::default())
                .await
                .unwrap()
                .items
                .into_iter()
                .map(|r| (r.name, r.ttl, r.rdata, r.service, r.protocol))
                .collect();
            records.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));
            records
        }
    };
    assert_eq!(
        project(owner(), zone.id.clone()).await,
        project(consumer(), copy.id.clone()).await
    );
}
