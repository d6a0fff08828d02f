//! Contract: monitors, pools and load balancers

mod common;

use std::sync::Arc;

use common::*;
use zoneplane_core::model::{
    HealthState, LoadBalancerSpec, LoadBalancerUpdate, MonitorSpec, MonitorType, MonitorUpdate,
    OriginSpec, PoolHealth, PoolSpec, PoolUpdate, ZoneSpec,
};
use zoneplane_core::{Error, MemoryStore, PageRequest};

fn origins() -> Vec<OriginSpec> {
    vec![
        OriginSpec::new("app-1", "10.1.0.1"),
        OriginSpec::new("app-2", "10.1.0.2"),
    ]
}

#[tokio::test]
async fn monitor_type_switch_keeps_or_drops_http_settings() {
    let (plane, _rx) = plane();
    let ctx = owner();
    let monitor = plane
        .create_monitor(&ctx, MonitorSpec::new("web", MonitorType::Http).with_path("/health"))
        .await
        .unwrap();
    assert_eq!(monitor.port, 80);

    let https = plane
        .update_monitor(
            &ctx,
            &monitor.id,
            MonitorUpdate {
                monitor_type: Some(MonitorType::Https),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(https.monitor_type(), MonitorType::Https);
    assert_eq!(https.port, 443);
    assert_eq!(https.check.http().unwrap().path, "/health");

    let tcp = plane
        .update_monitor(
            &ctx,
            &monitor.id,
            MonitorUpdate {
                monitor_type: Some(MonitorType::Tcp),
                port: Some(8443),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(tcp.check.http().is_none());
    assert_eq!(tcp.port, 8443);

    let err = plane
        .create_monitor(&ctx, MonitorSpec::new("tcp", MonitorType::Tcp))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "TCP needs a port");
}

#[tokio::test]
async fn references_guard_deletes() {
    let (plane, _rx) = plane();
    let ctx = owner();
    let zone = plane.create_zone(&ctx, ZoneSpec::new("example.com")).await.unwrap();
    let monitor = plane
        .create_monitor(&ctx, MonitorSpec::new("web", MonitorType::Http))
        .await
        .unwrap();
    let pool = plane
        .create_pool(&ctx, PoolSpec::new("web", origins()).with_monitor(&monitor.id))
        .await
        .unwrap();
    let lb = plane
        .create_load_balancer(
            &ctx,
            &zone.id,
            LoadBalancerSpec::new("www", &pool.id, vec![pool.id.clone()]),
        )
        .await
        .unwrap();
    assert_eq!(lb.ttl, 120);
    assert_eq!(lb.name, "www.example.com");

    let err = plane.delete_monitor(&ctx, &monitor.id).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    let err = plane.delete_pool(&ctx, &pool.id).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    plane.delete_load_balancer(&ctx, &zone.id, &lb.id).await.unwrap();
    plane.delete_pool(&ctx, &pool.id).await.unwrap();
    plane.delete_monitor(&ctx, &monitor.id).await.unwrap();
    assert_eq!(
        plane.list_monitors(&ctx, &PageRequest::default()).await.unwrap().total_count,
        0
    );
}

#[tokio::test]
async fn load_balancer_needs_existing_pools() {
    let (plane, _rx) = plane();
    let ctx = owner();
    let zone = plane.create_zone(&ctx, ZoneSpec::new("example.com")).await.unwrap();
    let pool = plane.create_pool(&ctx, PoolSpec::new("web", origins())).await.unwrap();

    let err = plane
        .create_load_balancer(
            &ctx,
            &zone.id,
            LoadBalancerSpec::new("www", &pool.id, vec!["missing".into()]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // Pools of another instance are just as missing.
    let foreign = plane.create_pool(&consumer(), PoolSpec::new("web", origins())).await.unwrap();
    let err = plane
        .create_load_balancer(
            &ctx,
            &zone.id,
            LoadBalancerSpec::new("www", &foreign.id, vec![pool.id.clone()]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let lb = plane
        .create_load_balancer(
            &ctx,
            &zone.id,
            LoadBalancerSpec::new("www", &pool.id, vec![pool.id.clone()]),
        )
        .await
        .unwrap();
    let err = plane
        .create_load_balancer(
            &ctx,
            &zone.id,
            LoadBalancerSpec::new("www.example.com", &pool.id, vec![pool.id.clone()]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "names are unique per zone");

    let err = plane
        .update_load_balancer(
            &ctx,
            &zone.id,
            &lb.id,
            LoadBalancerUpdate {
                ttl: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    let updated = plane
        .update_load_balancer(
            &ctx,
            &zone.id,
            &lb.id,
            LoadBalancerUpdate {
                ttl: Some(300),
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.ttl, 300);
    assert!(!updated.enabled);
}

#[tokio::test]
async fn origin_reports_drive_pool_health() {
    let (plane, _rx) = plane();
    let ctx = owner();
    let pool = plane.create_pool(&ctx, PoolSpec::new("web", origins())).await.unwrap();
    assert_eq!(pool.health, PoolHealth::Unknown);

    let pool = plane
        .report_origin_health(&ctx, &pool.id, "app-1", HealthState::Healthy, None)
        .await
        .unwrap();
    assert_eq!(pool.health, PoolHealth::Degraded);

    let pool = plane
        .report_origin_health(&ctx, &pool.id, "app-2", HealthState::Healthy, None)
        .await
        .unwrap();
    assert_eq!(pool.health, PoolHealth::Healthy);

    let pool = plane
        .report_origin_health(
            &ctx,
            &pool.id,
            "app-1",
            HealthState::Unhealthy,
            Some("connection refused".into()),
        )
        .await
        .unwrap();
    assert_eq!(pool.health, PoolHealth::Degraded);
    assert_eq!(
        pool.origins[0].health_failure_reason.as_deref(),
        Some("connection refused")
    );

    let err = plane
        .report_origin_health(&ctx, &pool.id, "app-9", HealthState::Healthy, None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn pool_updates() {
    let (plane, _rx) = plane();
    let ctx = owner();
    let monitor = plane
        .create_monitor(&ctx, MonitorSpec::new("web", MonitorType::Http))
        .await
        .unwrap();
    let pool = plane
        .create_pool(&ctx, PoolSpec::new("web", origins()).with_monitor(&monitor.id))
        .await
        .unwrap();
    plane
        .report_origin_health(&ctx, &pool.id, "app-1", HealthState::Healthy, None)
        .await
        .unwrap();

    let updated = plane
        .update_pool(
            &ctx,
            &pool.id,
            PoolUpdate {
                monitor: Some(String::new()),
                origins: Some(vec![
                    OriginSpec::new("app-1", "10.1.0.1"),
                    OriginSpec::new("app-3", "10.1.0.3"),
                ]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.monitor, None, "empty monitor detaches");
    assert_eq!(updated.origins[0].health, HealthState::Healthy);
    assert_eq!(updated.origins[1].health, HealthState::Unknown);

    let err = plane
        .update_pool(
            &ctx,
            &pool.id,
            PoolUpdate {
                healthy_origins_threshold: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = plane
        .update_pool(
            &ctx,
            &pool.id,
            PoolUpdate {
                monitor: Some("missing".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn healthcheck_subnets_resolve_once_per_crn() {
    let fabric = Arc::new(CountingFabric::new());
    let (plane, _rx) = plane_with(Arc::new(MemoryStore::new()), fabric.clone(), fast_config());
    let ctx = owner();

    for name in ["east", "west"] {
        let pool = plane
            .create_pool(
                &ctx,
                PoolSpec::new(name, origins()).with_healthcheck("us-south", vec![SUBNET_1.into()]),
            )
            .await
            .unwrap();
        assert_eq!(pool.healthcheck_vsis.len(), 1);
        assert_eq!(pool.healthcheck_vsis[0].subnet_crn, SUBNET_1);
    }
    assert_eq!(fabric.resolve_calls(), 1);
    assert_eq!(fabric.provision_calls(), 0);

    let err = plane
        .create_pool(
            &ctx,
            PoolSpec::new("bad", origins()).with_healthcheck("us-south", vec!["nope".into()]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = plane
        .create_pool(
            &ctx,
            PoolSpec {
                healthcheck_subnets: vec![SUBNET_2.into()],
                ..PoolSpec::new("no-region", origins())
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}
