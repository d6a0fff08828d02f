// # Load Balancing
//
// Monitors and pools belong to an instance, load balancers to a zone.
//
// ```text
// LoadBalancer --fallback_pool/default_pools--> Pool --monitor--> Monitor
// ```
//
// References are checked on write and guarded on delete: a monitor in use
// by a pool, or a pool in use by a load balancer, cannot be deleted.

use tracing::{debug, info};

use super::{ControlPlane, instance_path, now, set_text};
use crate::codec::name;
use crate::context::RequestContext;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::model::load_balancing::{
    build_origins, required_name, resolve_lb_ttl, validate_default_pools,
};
use crate::model::{
    Crn, HealthState, LoadBalancer, LoadBalancerSpec, LoadBalancerUpdate, Monitor, MonitorSpec,
    MonitorUpdate, Pool, PoolSpec, PoolUpdate, VsiDescriptor, new_id,
};
use crate::pagination::{Page, PageRequest};

impl ControlPlane {
    pub async fn create_monitor(&self, ctx: &RequestContext, spec: MonitorSpec) -> Result<Monitor> {
        let monitor = Monitor::from_spec(new_id(), ctx.instance_id.clone(), spec, now())?;
        let monitor = self
            .mutate(|data| {
                data.monitors.push(monitor.clone());
                Ok(monitor.clone())
            })
            .await?;
        info!(monitor_id = %monitor.id, monitor_type = ?monitor.monitor_type(), "monitor created");
        Ok(monitor)
    }

    pub async fn get_monitor(&self, ctx: &RequestContext, monitor_id: &str) -> Result<Monitor> {
        let data = self.read().await?;
        let i = data.monitor_index(&ctx.instance_id, monitor_id)?;
        Ok(data.monitors[i].clone())
    }

    pub async fn list_monitors(
        &self,
        ctx: &RequestContext,
        page: &PageRequest,
    ) -> Result<Page<Monitor>> {
        let data = self.read().await?;
        let monitors: Vec<Monitor> = data
            .monitors
            .iter()
            .filter(|m| m.instance_id == ctx.instance_id)
            .cloned()
            .collect();
        self.page(
            monitors,
            page,
            &format!("{}/monitors", instance_path(&ctx.instance_id)),
        )
    }

    /// Update a monitor, including its type
    ///
    /// Switching between HTTP and HTTPS keeps the HTTP settings; switching
    /// to TCP drops them, and switching away from TCP starts from the HTTP
    /// defaults. A port still at the old type's default follows the new
    /// type's default.
    pub async fn update_monitor(
        &self,
        ctx: &RequestContext,
        monitor_id: &str,
        update: MonitorUpdate,
    ) -> Result<Monitor> {
        let modified = now();
        self.mutate(|data| {
            let i = data.monitor_index(&ctx.instance_id, monitor_id)?;
            data.monitors[i].apply_update(update.clone(), modified)?;
            Ok(data.monitors[i].clone())
        })
        .await
    }

    pub async fn delete_monitor(&self, ctx: &RequestContext, monitor_id: &str) -> Result<()> {
        self.mutate(|data| {
            let i = data.monitor_index(&ctx.instance_id, monitor_id)?;
            if let Some(pool) = data
                .pools
                .iter()
                .find(|p| p.monitor.as_deref() == Some(monitor_id))
            {
                return Err(Error::conflict(format!(
                    "monitor {monitor_id} is used by pool {}",
                    pool.id
                )));
            }
            data.monitors.remove(i);
            Ok(())
        })
        .await?;
        debug!(monitor_id, "monitor deleted");
        Ok(())
    }

    /// Create an origin pool
    ///
    /// Health-check subnets are resolved through the network fabric before
    /// anything is written.
    pub async fn create_pool(&self, ctx: &RequestContext, spec: PoolSpec) -> Result<Pool> {
        let pool_name = required_name(&spec.name, "pool")?;
        let origins = build_origins(spec.origins.clone(), &[])?;
        let healthcheck_vsis = self.resolve_healthcheck_subnets(&spec.healthcheck_subnets).await?;
        let monitor = non_empty(spec.monitor.clone());
        let created = now();

        let mut pool = Pool {
            id: new_id(),
            instance_id: ctx.instance_id.clone(),
            name: pool_name,
            description: spec.description.clone().unwrap_or_default(),
            enabled: spec.enabled.unwrap_or(true),
            healthy_origins_threshold: spec.healthy_origins_threshold.unwrap_or(1),
            origins,
            monitor,
            healthcheck_region: non_empty(spec.healthcheck_region.clone()),
            healthcheck_subnets: spec.healthcheck_subnets.clone(),
            healthcheck_vsis,
            health: Default::default(),
            created_on: created,
            modified_on: created,
        };
        pool.validate()?;
        pool.recompute_health();

        let pool = self
            .mutate(|data| {
                if let Some(monitor_id) = &pool.monitor {
                    data.monitor_index(&ctx.instance_id, monitor_id)?;
                }
                data.pools.push(pool.clone());
                Ok(pool.clone())
            })
            .await?;
        info!(pool_id = %pool.id, origins = pool.origins.len(), "pool created");
        Ok(pool)
    }

    pub async fn get_pool(&self, ctx: &RequestContext, pool_id: &str) -> Result<Pool> {
        let data = self.read().await?;
        let i = data.pool_index(&ctx.instance_id, pool_id)?;
        Ok(data.pools[i].clone())
    }

    pub async fn list_pools(&self, ctx: &RequestContext, page: &PageRequest) -> Result<Page<Pool>> {
        let data = self.read().await?;
        let pools: Vec<Pool> = data
            .pools
            .iter()
            .filter(|p| p.instance_id == ctx.instance_id)
            .cloned()
            .collect();
        self.page(pools, page, &format!("{}/pools", instance_path(&ctx.instance_id)))
    }

    /// Update a pool
    ///
    /// An empty `monitor` detaches the monitor. Replacing the origins keeps
    /// the last reported health of origins whose name and address survive.
    pub async fn update_pool(
        &self,
        ctx: &RequestContext,
        pool_id: &str,
        update: PoolUpdate,
    ) -> Result<Pool> {
        let healthcheck_vsis = match &update.healthcheck_subnets {
            Some(subnets) => Some(self.resolve_healthcheck_subnets(subnets).await?),
            None => None,
        };
        let modified = now();

        self.mutate(|data| {
            let i = data.pool_index(&ctx.instance_id, pool_id)?;
            let mut pool = data.pools[i].clone();
            if let Some(pool_name) = &update.name {
                pool.name = required_name(pool_name, "pool")?;
            }
            set_text(&mut pool.description, update.description.clone());
            if let Some(enabled) = update.enabled {
                pool.enabled = enabled;
            }
            if let Some(threshold) = update.healthy_origins_threshold {
                pool.healthy_origins_threshold = threshold;
            }
            if let Some(origins) = &update.origins {
                pool.origins = build_origins(origins.clone(), &pool.origins)?;
            }
            if let Some(monitor) = &update.monitor {
                pool.monitor = non_empty(Some(monitor.clone()));
                if let Some(monitor_id) = &pool.monitor {
                    data.monitor_index(&ctx.instance_id, monitor_id)?;
                }
            }
            if let Some(region) = &update.healthcheck_region {
                pool.healthcheck_region = non_empty(Some(region.clone()));
            }
            if let (Some(subnets), Some(vsis)) = (&update.healthcheck_subnets, &healthcheck_vsis) {
                pool.healthcheck_subnets = subnets.clone();
                pool.healthcheck_vsis = vsis.clone();
            }
            pool.validate()?;
            pool.recompute_health();
            pool.modified_on = modified;
            data.pools[i] = pool.clone();
            Ok(pool)
        })
        .await
    }

    pub async fn delete_pool(&self, ctx: &RequestContext, pool_id: &str) -> Result<()> {
        self.mutate(|data| {
            let i = data.pool_index(&ctx.instance_id, pool_id)?;
            if let Some(lb) = data.load_balancers.iter().find(|lb| lb.references_pool(pool_id)) {
                return Err(Error::conflict(format!(
                    "pool {pool_id} is referenced by load balancer {}",
                    lb.id
                )));
            }
            data.pools.remove(i);
            Ok(())
        })
        .await?;
        debug!(pool_id, "pool deleted");
        Ok(())
    }

    /// Record a health observation for one origin and recompute the pool
    pub async fn report_origin_health(
        &self,
        ctx: &RequestContext,
        pool_id: &str,
        origin_name: &str,
        health: HealthState,
        failure_reason: Option<String>,
    ) -> Result<Pool> {
        let modified = now();
        let pool = self
            .mutate(|data| {
                let i = data.pool_index(&ctx.instance_id, pool_id)?;
                let pool = &mut data.pools[i];
                let origin = pool
                    .origins
                    .iter_mut()
                    .find(|o| o.name == origin_name)
                    .ok_or_else(|| {
                        Error::not_found(format!("origin {origin_name} not found in pool {pool_id}"))
                    })?;
                origin.health = health;
                origin.health_failure_reason = match health {
                    HealthState::Unhealthy => failure_reason.clone(),
                    _ => None,
                };
                pool.recompute_health();
                pool.modified_on = modified;
                Ok(pool.clone())
            })
            .await?;
        debug!(pool_id, origin = origin_name, ?health, pool_health = ?pool.health, "origin health reported");
        Ok(pool)
    }

    /// Create a load balancer in a zone
    ///
    /// The name is qualified into the zone and must be unique there.
    pub async fn create_load_balancer(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        spec: LoadBalancerSpec,
    ) -> Result<LoadBalancer> {
        name::validate_record_name(&spec.name)?;
        validate_default_pools(&spec.default_pools)?;
        let ttl = resolve_lb_ttl(spec.ttl)?;
        let id = new_id();
        let created = now();

        let lb = self
            .mutate(|data| {
                let zone_name = data.zone(&ctx.instance_id, zone_id)?.name.clone();
                let lb = LoadBalancer {
                    id: id.clone(),
                    zone_id: zone_id.to_string(),
                    instance_id: ctx.instance_id.clone(),
                    name: name::qualify(&spec.name, &zone_name),
                    description: spec.description.clone().unwrap_or_default(),
                    enabled: spec.enabled.unwrap_or(true),
                    ttl,
                    fallback_pool: spec.fallback_pool.clone(),
                    default_pools: spec.default_pools.clone(),
                    created_on: created,
                    modified_on: created,
                };
                check_load_balancer(data, &lb)?;
                data.load_balancers.push(lb.clone());
                Ok(lb)
            })
            .await?;
        info!(zone_id, lb_id = %lb.id, name = %lb.name, "load balancer created");
        Ok(lb)
    }

    pub async fn get_load_balancer(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        lb_id: &str,
    ) -> Result<LoadBalancer> {
        let data = self.read().await?;
        data.zone(&ctx.instance_id, zone_id)?;
        let i = data.load_balancer_index(zone_id, lb_id)?;
        Ok(data.load_balancers[i].clone())
    }

    pub async fn list_load_balancers(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        page: &PageRequest,
    ) -> Result<Page<LoadBalancer>> {
        let data = self.read().await?;
        data.zone(&ctx.instance_id, zone_id)?;
        let lbs: Vec<LoadBalancer> = data
            .load_balancers
            .iter()
            .filter(|lb| lb.zone_id == zone_id)
            .cloned()
            .collect();
        let base = format!(
            "{}/zones/{zone_id}/load_balancers",
            instance_path(&ctx.instance_id)
        );
        self.page(lbs, page, &base)
    }

    pub async fn update_load_balancer(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        lb_id: &str,
        update: LoadBalancerUpdate,
    ) -> Result<LoadBalancer> {
        if let Some(lb_name) = &update.name {
            name::validate_record_name(lb_name)?;
        }
        if let Some(pools) = &update.default_pools {
            validate_default_pools(pools)?;
        }
        let ttl = match update.ttl {
            Some(ttl) => Some(resolve_lb_ttl(Some(ttl))?),
            None => None,
        };
        let modified = now();

        self.mutate(|data| {
            let zone_name = data.zone(&ctx.instance_id, zone_id)?.name.clone();
            let i = data.load_balancer_index(zone_id, lb_id)?;
            let mut lb = data.load_balancers[i].clone();
            if let Some(lb_name) = &update.name {
                lb.name = name::qualify(lb_name, &zone_name);
            }
            set_text(&mut lb.description, update.description.clone());
            if let Some(enabled) = update.enabled {
                lb.enabled = enabled;
            }
            if let Some(ttl) = ttl {
                lb.ttl = ttl;
            }
            if let Some(fallback) = &update.fallback_pool {
                lb.fallback_pool = fallback.clone();
            }
            if let Some(pools) = &update.default_pools {
                lb.default_pools = pools.clone();
            }
            lb.modified_on = modified;
            check_load_balancer(data, &lb)?;
            data.load_balancers[i] = lb.clone();
            Ok(lb)
        })
        .await
    }

    pub async fn delete_load_balancer(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        lb_id: &str,
    ) -> Result<()> {
        self.mutate(|data| {
            data.zone(&ctx.instance_id, zone_id)?;
            let i = data.load_balancer_index(zone_id, lb_id)?;
            data.load_balancers.remove(i);
            Ok(())
        })
        .await?;
        debug!(zone_id, lb_id, "load balancer deleted");
        Ok(())
    }

    async fn resolve_healthcheck_subnets(&self, subnets: &[String]) -> Result<Vec<VsiDescriptor>> {
        let mut vsis = Vec::with_capacity(subnets.len());
        for (i, subnet) in subnets.iter().enumerate() {
            Crn::subnet(subnet)?;
            if subnets[..i].contains(subnet) {
                return Err(Error::validation(format!(
                    "health-check subnet {subnet} listed twice"
                )));
            }
            let vsi = self
                .retry_transient("resolve subnet", || self.fabric().resolve_subnet(subnet))
                .await?;
            vsis.push(vsi);
        }
        Ok(vsis)
    }
}

/// Name unique in the zone, every referenced pool in the same instance
fn check_load_balancer(data: &Dataset, lb: &LoadBalancer) -> Result<()> {
    if data
        .load_balancers
        .iter()
        .any(|other| other.zone_id == lb.zone_id && other.id != lb.id && other.name == lb.name)
    {
        return Err(Error::conflict(format!(
            "load balancer {} already exists in zone {}",
            lb.name, lb.zone_id
        )));
    }
    for pool_id in std::iter::once(&lb.fallback_pool).chain(&lb.default_pools) {
        data.pool_index(&lb.instance_id, pool_id).map_err(|_| {
            Error::validation(format!(
                "pool {pool_id} does not exist in instance {}",
                lb.instance_id
            ))
        })?;
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
