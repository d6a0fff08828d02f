// # Custom Resolvers
//
// A resolver's profile bounds how many locations and forwarding rules it
// may hold. Locations are provisioned through the network fabric before
// the resolver is written, so every stored location carries its DNS server
// address.
//
// A resolver starts disabled. Enabling it needs at least one enabled
// location, and while it is enabled its last enabled location can be
// neither disabled nor deleted.

use tracing::{debug, info};

use super::{ControlPlane, instance_path, now, set_text};
use crate::context::RequestContext;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::model::load_balancing::required_name;
use crate::model::resolver::validate_match;
use crate::model::{
    Crn, CustomResolver, ForwardingRule, ForwardingRuleSpec, ForwardingRuleUpdate,
    ForwardingTargets, Location, LocationSpec, LocationUpdate, ResolverHealth, ResolverSpec,
    ResolverUpdate, new_id,
};
use crate::pagination::{Page, PageRequest};

impl ControlPlane {
    pub async fn create_resolver(
        &self,
        ctx: &RequestContext,
        spec: ResolverSpec,
    ) -> Result<CustomResolver> {
        let resolver_name = required_name(&spec.name, "custom resolver")?;
        let profile = spec.profile.unwrap_or_default();
        let quota = self.config().quotas.for_profile(profile);
        if spec.locations.len() > quota.max_locations {
            return Err(Error::quota_exceeded(format!(
                "{profile:?} resolvers allow at most {} locations, requested {}",
                quota.max_locations,
                spec.locations.len()
            )));
        }
        for (i, location) in spec.locations.iter().enumerate() {
            if spec.locations[..i]
                .iter()
                .any(|l| l.subnet_crn == location.subnet_crn)
            {
                return Err(Error::conflict(format!(
                    "subnet {} listed twice",
                    location.subnet_crn
                )));
            }
        }

        let mut locations = Vec::with_capacity(spec.locations.len());
        for location in &spec.locations {
            locations.push(self.provision_location(new_id(), location).await?);
        }

        let created = now();
        let mut resolver = CustomResolver {
            id: new_id(),
            instance_id: ctx.instance_id.clone(),
            name: resolver_name,
            description: spec.description.clone().unwrap_or_default(),
            enabled: false,
            profile,
            health: ResolverHealth::Critical,
            locations,
            created_on: created,
            modified_on: created,
        };
        resolver.recompute_health();

        let resolver = self
            .mutate(|data| {
                data.resolvers.push(resolver.clone());
                Ok(resolver.clone())
            })
            .await?;
        info!(resolver_id = %resolver.id, locations = resolver.locations.len(), "custom resolver created");
        Ok(resolver)
    }

    pub async fn get_resolver(
        &self,
        ctx: &RequestContext,
        resolver_id: &str,
    ) -> Result<CustomResolver> {
        let data = self.read().await?;
        let i = data.resolver_index(&ctx.instance_id, resolver_id)?;
        Ok(data.resolvers[i].clone())
    }

    pub async fn list_resolvers(
        &self,
        ctx: &RequestContext,
        page: &PageRequest,
    ) -> Result<Page<CustomResolver>> {
        let data = self.read().await?;
        let resolvers: Vec<CustomResolver> = data
            .resolvers
            .iter()
            .filter(|r| r.instance_id == ctx.instance_id)
            .cloned()
            .collect();
        self.page(
            resolvers,
            page,
            &format!("{}/custom_resolvers", instance_path(&ctx.instance_id)),
        )
    }

    /// Update name, description, enabled flag or profile
    ///
    /// A profile change must fit the resolver's current locations and rules.
    pub async fn update_resolver(
        &self,
        ctx: &RequestContext,
        resolver_id: &str,
        update: ResolverUpdate,
    ) -> Result<CustomResolver> {
        let modified = now();
        let quotas = self.config().quotas.clone();
        self.mutate(|data| {
            let i = data.resolver_index(&ctx.instance_id, resolver_id)?;
            let rules = rule_count(data, resolver_id);
            let resolver = &mut data.resolvers[i];
            let mut next = resolver.clone();
            if let Some(resolver_name) = &update.name {
                next.name = required_name(resolver_name, "custom resolver")?;
            }
            set_text(&mut next.description, update.description.clone());
            if let Some(profile) = update.profile {
                let quota = quotas.for_profile(profile);
                if next.locations.len() > quota.max_locations
                    || rules > quota.max_forwarding_rules
                {
                    return Err(Error::quota_exceeded(format!(
                        "resolver has {} locations and {rules} forwarding rules; {profile:?} allows {} and {}",
                        next.locations.len(),
                        quota.max_locations,
                        quota.max_forwarding_rules
                    )));
                }
                next.profile = profile;
            }
            if let Some(enabled) = update.enabled {
                if enabled && next.enabled_locations() == 0 {
                    return Err(Error::conflict(
                        "a custom resolver needs an enabled location before it can be enabled",
                    ));
                }
                next.enabled = enabled;
            }
            next.modified_on = modified;
            *resolver = next.clone();
            Ok(next)
        })
        .await
    }

    /// Delete a resolver and its forwarding rules
    pub async fn delete_resolver(&self, ctx: &RequestContext, resolver_id: &str) -> Result<()> {
        let rules_removed = self
            .mutate(|data| {
                let i = data.resolver_index(&ctx.instance_id, resolver_id)?;
                data.resolvers.remove(i);
                let before = data.forwarding_rules.len();
                data.forwarding_rules.retain(|r| r.resolver_id != resolver_id);
                Ok(before - data.forwarding_rules.len())
            })
            .await?;
        info!(resolver_id, rules_removed, "custom resolver deleted");
        Ok(())
    }

    pub async fn add_location(
        &self,
        ctx: &RequestContext,
        resolver_id: &str,
        spec: LocationSpec,
    ) -> Result<Location> {
        // Checked again at commit; this only avoids reserving an address for
        // a request that cannot succeed.
        {
            let data = self.read().await?;
            let i = data.resolver_index(&ctx.instance_id, resolver_id)?;
            self.check_new_location(&data.resolvers[i], &spec.subnet_crn)?;
        }
        let location = self.provision_location(new_id(), &spec).await?;
        let modified = now();

        self.mutate(|data| {
            let i = data.resolver_index(&ctx.instance_id, resolver_id)?;
            self.check_new_location(&data.resolvers[i], &location.subnet_crn)?;
            let resolver = &mut data.resolvers[i];
            resolver.locations.push(location.clone());
            resolver.recompute_health();
            resolver.modified_on = modified;
            Ok(location.clone())
        })
        .await
    }

    /// Update a location; a new subnet is provisioned again
    pub async fn update_location(
        &self,
        ctx: &RequestContext,
        resolver_id: &str,
        location_id: &str,
        update: LocationUpdate,
    ) -> Result<Location> {
        let reprovisioned = {
            let data = self.read().await?;
            let i = data.resolver_index(&ctx.instance_id, resolver_id)?;
            let current = find_location(&data.resolvers[i], location_id)?;
            match &update.subnet_crn {
                Some(subnet) if *subnet != current.subnet_crn => {
                    let spec = LocationSpec {
                        subnet_crn: subnet.clone(),
                        enabled: Some(update.enabled.unwrap_or(current.enabled)),
                    };
                    Some(self.provision_location(location_id.to_string(), &spec).await?)
                }
                _ => None,
            }
        };
        let modified = now();

        self.mutate(|data| {
            let i = data.resolver_index(&ctx.instance_id, resolver_id)?;
            let resolver = &mut data.resolvers[i];
            let j = resolver
                .locations
                .iter()
                .position(|l| l.id == location_id)
                .ok_or_else(|| location_not_found(location_id))?;

            let mut location = match &reprovisioned {
                Some(fresh) => {
                    if resolver
                        .locations
                        .iter()
                        .any(|l| l.id != location_id && l.subnet_crn == fresh.subnet_crn)
                    {
                        return Err(Error::conflict(format!(
                            "subnet {} is already a location of this resolver",
                            fresh.subnet_crn
                        )));
                    }
                    fresh.clone()
                }
                None => resolver.locations[j].clone(),
            };
            if let Some(enabled) = update.enabled {
                location.enabled = enabled;
            }
            if resolver.enabled
                && resolver.locations[j].enabled
                && !location.enabled
                && resolver.enabled_locations() == 1
            {
                return Err(Error::conflict(
                    "cannot disable the last enabled location of an enabled resolver",
                ));
            }
            resolver.locations[j] = location.clone();
            resolver.recompute_health();
            resolver.modified_on = modified;
            Ok(location)
        })
        .await
    }

    pub async fn delete_location(
        &self,
        ctx: &RequestContext,
        resolver_id: &str,
        location_id: &str,
    ) -> Result<()> {
        let modified = now();
        self.mutate(|data| {
            let i = data.resolver_index(&ctx.instance_id, resolver_id)?;
            let resolver = &mut data.resolvers[i];
            let j = resolver
                .locations
                .iter()
                .position(|l| l.id == location_id)
                .ok_or_else(|| location_not_found(location_id))?;
            if resolver.enabled && resolver.locations[j].enabled && resolver.enabled_locations() == 1 {
                return Err(Error::conflict(
                    "cannot delete the last enabled location of an enabled resolver",
                ));
            }
            resolver.locations.remove(j);
            resolver.recompute_health();
            resolver.modified_on = modified;
            Ok(())
        })
        .await?;
        debug!(resolver_id, location_id, "location deleted");
        Ok(())
    }

    /// Reorder locations; `order` must name every location exactly once
    pub async fn reorder_locations(
        &self,
        ctx: &RequestContext,
        resolver_id: &str,
        order: Vec<String>,
    ) -> Result<CustomResolver> {
        let modified = now();
        self.mutate(|data| {
            let i = data.resolver_index(&ctx.instance_id, resolver_id)?;
            let resolver = &mut data.resolvers[i];
            if order.len() != resolver.locations.len() {
                return Err(Error::validation(format!(
                    "reorder must list all {} locations, got {}",
                    resolver.locations.len(),
                    order.len()
                )));
            }
            let mut reordered = Vec::with_capacity(order.len());
            for (k, id) in order.iter().enumerate() {
                if order[..k].contains(id) {
                    return Err(Error::validation(format!("location {id} listed twice")));
                }
                let location = find_location(resolver, id)?;
                reordered.push(location.clone());
            }
            resolver.locations = reordered;
            resolver.modified_on = modified;
            Ok(resolver.clone())
        })
        .await
    }

    pub async fn create_forwarding_rule(
        &self,
        ctx: &RequestContext,
        resolver_id: &str,
        spec: ForwardingRuleSpec,
    ) -> Result<ForwardingRule> {
        let match_pattern = validate_match(&spec.match_pattern)?;
        let targets = ForwardingTargets::from_request(spec.forward_to.clone(), spec.views.clone())?;
        let id = new_id();
        let created = now();
        let quotas = self.config().quotas.clone();

        let rule = self
            .mutate(|data| {
                let i = data.resolver_index(&ctx.instance_id, resolver_id)?;
                let quota = quotas.for_profile(data.resolvers[i].profile);
                if rule_count(data, resolver_id) >= quota.max_forwarding_rules {
                    return Err(Error::quota_exceeded(format!(
                        "resolver {resolver_id} already has the maximum of {} forwarding rules",
                        quota.max_forwarding_rules
                    )));
                }
                check_unique_match(data, resolver_id, &id, &match_pattern)?;
                let rule = ForwardingRule {
                    id: id.clone(),
                    resolver_id: resolver_id.to_string(),
                    description: spec.description.clone().unwrap_or_default(),
                    rule_type: spec.rule_type,
                    match_pattern: match_pattern.clone(),
                    targets: targets.clone(),
                    created_on: created,
                    modified_on: created,
                };
                data.forwarding_rules.push(rule.clone());
                Ok(rule)
            })
            .await?;
        info!(resolver_id, rule_id = %rule.id, pattern = %rule.match_pattern, "forwarding rule created");
        Ok(rule)
    }

    pub async fn get_forwarding_rule(
        &self,
        ctx: &RequestContext,
        resolver_id: &str,
        rule_id: &str,
    ) -> Result<ForwardingRule> {
        let data = self.read().await?;
        data.resolver_index(&ctx.instance_id, resolver_id)?;
        let i = data.forwarding_rule_index(resolver_id, rule_id)?;
        Ok(data.forwarding_rules[i].clone())
    }

    pub async fn list_forwarding_rules(
        &self,
        ctx: &RequestContext,
        resolver_id: &str,
        page: &PageRequest,
    ) -> Result<Page<ForwardingRule>> {
        let data = self.read().await?;
        data.resolver_index(&ctx.instance_id, resolver_id)?;
        let rules: Vec<ForwardingRule> = data
            .forwarding_rules
            .iter()
            .filter(|r| r.resolver_id == resolver_id)
            .cloned()
            .collect();
        let base = format!(
            "{}/custom_resolvers/{resolver_id}/forwarding_rules",
            instance_path(&ctx.instance_id)
        );
        self.page(rules, page, &base)
    }

    pub async fn update_forwarding_rule(
        &self,
        ctx: &RequestContext,
        resolver_id: &str,
        rule_id: &str,
        update: ForwardingRuleUpdate,
    ) -> Result<ForwardingRule> {
        let modified = now();
        self.mutate(|data| {
            data.resolver_index(&ctx.instance_id, resolver_id)?;
            let i = data.forwarding_rule_index(resolver_id, rule_id)?;
            let mut rule = data.forwarding_rules[i].clone();
            rule.apply_update(update.clone(), modified)?;
            check_unique_match(data, resolver_id, rule_id, &rule.match_pattern)?;
            data.forwarding_rules[i] = rule.clone();
            Ok(rule)
        })
        .await
    }

    pub async fn delete_forwarding_rule(
        &self,
        ctx: &RequestContext,
        resolver_id: &str,
        rule_id: &str,
    ) -> Result<()> {
        self.mutate(|data| {
            data.resolver_index(&ctx.instance_id, resolver_id)?;
            let i = data.forwarding_rule_index(resolver_id, rule_id)?;
            data.forwarding_rules.remove(i);
            Ok(())
        })
        .await?;
        debug!(resolver_id, rule_id, "forwarding rule deleted");
        Ok(())
    }

    /// Resolve the subnet and reserve a DNS server address in it
    async fn provision_location(&self, id: String, spec: &LocationSpec) -> Result<Location> {
        let subnet = spec.subnet_crn.trim();
        Crn::subnet(subnet)?;
        self.retry_transient("resolve subnet", || self.fabric().resolve_subnet(subnet))
            .await?;
        let ip = self
            .retry_transient("provision DNS server address", || {
                self.fabric().provision_dns_server_ip(subnet)
            })
            .await?;
        debug!(subnet_crn = subnet, %ip, "location provisioned");
        Ok(Location {
            id,
            subnet_crn: subnet.to_string(),
            enabled: spec.enabled.unwrap_or(true),
            healthy: true,
            dns_server_ip: Some(ip),
        })
    }

    fn check_new_location(&self, resolver: &CustomResolver, subnet_crn: &str) -> Result<()> {
        let quota = self.config().quotas.for_profile(resolver.profile);
        if resolver.locations.len() >= quota.max_locations {
            return Err(Error::quota_exceeded(format!(
                "resolver {} already has the maximum of {} locations",
                resolver.id, quota.max_locations
            )));
        }
        if resolver
            .locations
            .iter()
            .any(|l| l.subnet_crn == subnet_crn.trim())
        {
            return Err(Error::conflict(format!(
                "subnet {subnet_crn} is already a location of this resolver"
            )));
        }
        Ok(())
    }
}

fn rule_count(data: &Dataset, resolver_id: &str) -> usize {
    data.forwarding_rules
        .iter()
        .filter(|r| r.resolver_id == resolver_id)
        .count()
}

fn check_unique_match(data: &Dataset, resolver_id: &str, rule_id: &str, pattern: &str) -> Result<()> {
    if data
        .forwarding_rules
        .iter()
        .any(|r| r.resolver_id == resolver_id && r.id != rule_id && r.match_pattern == pattern)
    {
        return Err(Error::conflict(format!(
            "a forwarding rule for {pattern} already exists on resolver {resolver_id}"
        )));
    }
    Ok(())
}

fn find_location<'a>(resolver: &'a CustomResolver, location_id: &str) -> Result<&'a Location> {
    resolver
        .location(location_id)
        .ok_or_else(|| location_not_found(location_id))
}

fn location_not_found(location_id: &str) -> Error {
    Error::not_found(format!("location {location_id} not found"))
}
