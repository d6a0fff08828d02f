//! Versioned collection of every control-plane entity
//!
//! A [`Dataset`] is the unit a [`Store`](crate::traits::Store) hands out and
//! accepts back. Collections keep insertion order, which is the order list
//! endpoints paginate over.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    AccessRequest, CustomResolver, ForwardingRule, LinkedZone, LoadBalancer, Monitor,
    PermittedNetwork, Pool, ResourceRecord, Zone,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Bumped by the store on every successful commit
    pub revision: u64,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub records: Vec<ResourceRecord>,
    #[serde(default)]
    pub permitted_networks: Vec<PermittedNetwork>,
    #[serde(default)]
    pub monitors: Vec<Monitor>,
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default)]
    pub load_balancers: Vec<LoadBalancer>,
    #[serde(default)]
    pub resolvers: Vec<CustomResolver>,
    #[serde(default)]
    pub forwarding_rules: Vec<ForwardingRule>,
    #[serde(default)]
    pub linked_zones: Vec<LinkedZone>,
    #[serde(default)]
    pub access_requests: Vec<AccessRequest>,
}

/// Position of an instance-scoped entity, or not-found
fn position<T>(items: &[T], what: &str, id: &str, pred: impl Fn(&T) -> bool) -> Result<usize> {
    items
        .iter()
        .position(pred)
        .ok_or_else(|| Error::not_found(format!("{what} {id} not found")))
}

impl Dataset {
    pub fn zone(&self, instance_id: &str, zone_id: &str) -> Result<&Zone> {
        let i = self.zone_index(instance_id, zone_id)?;
        Ok(&self.zones[i])
    }

    pub fn zone_index(&self, instance_id: &str, zone_id: &str) -> Result<usize> {
        position(&self.zones, "zone", zone_id, |z| {
            z.id == zone_id && z.instance_id == instance_id
        })
    }

    /// Zone by id alone; used when following cross-instance references
    pub fn zone_by_id(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == zone_id)
    }

    pub fn record_index(&self, zone_id: &str, record_id: &str) -> Result<usize> {
        position(&self.records, "resource record", record_id, |r| {
            r.id == record_id && r.zone_id == zone_id
        })
    }

    pub fn zone_records<'a>(&'a self, zone_id: &'a str) -> impl Iterator<Item = &'a ResourceRecord> + 'a {
        self.records.iter().filter(move |r| r.zone_id == zone_id)
    }

    pub fn permitted_network_index(&self, zone_id: &str, network_id: &str) -> Result<usize> {
        position(&self.permitted_networks, "permitted network", network_id, |p| {
            p.id == network_id && p.zone_id == zone_id
        })
    }

    pub fn zone_networks<'a>(
        &'a self,
        zone_id: &'a str,
    ) -> impl Iterator<Item = &'a PermittedNetwork> + 'a {
        self.permitted_networks
            .iter()
            .filter(move |p| p.zone_id == zone_id)
    }

    pub fn monitor_index(&self, instance_id: &str, monitor_id: &str) -> Result<usize> {
        position(&self.monitors, "monitor", monitor_id, |m| {
            m.id == monitor_id && m.instance_id == instance_id
        })
    }

    pub fn pool_index(&self, instance_id: &str, pool_id: &str) -> Result<usize> {
        position(&self.pools, "pool", pool_id, |p| {
            p.id == pool_id && p.instance_id == instance_id
        })
    }

    pub fn load_balancer_index(&self, zone_id: &str, lb_id: &str) -> Result<usize> {
        position(&self.load_balancers, "load balancer", lb_id, |lb| {
            lb.id == lb_id && lb.zone_id == zone_id
        })
    }

    pub fn resolver_index(&self, instance_id: &str, resolver_id: &str) -> Result<usize> {
        position(&self.resolvers, "custom resolver", resolver_id, |r| {
            r.id == resolver_id && r.instance_id == instance_id
        })
    }

    pub fn forwarding_rule_index(&self, resolver_id: &str, rule_id: &str) -> Result<usize> {
        position(&self.forwarding_rules, "forwarding rule", rule_id, |r| {
            r.id == rule_id && r.resolver_id == resolver_id
        })
    }

    pub fn linked_zone_index(&self, instance_id: &str, linked_zone_id: &str) -> Result<usize> {
        position(&self.linked_zones, "linked zone", linked_zone_id, |lz| {
            lz.id == linked_zone_id && lz.instance_id == instance_id
        })
    }

    pub fn access_request_index(&self, access_request_id: &str) -> Result<usize> {
        position(&self.access_requests, "access request", access_request_id, |ar| {
            ar.id == access_request_id
        })
    }

    /// Re-derive a zone's state from its permitted networks
    pub fn refresh_zone_state(&mut self, zone_id: &str, now: crate::model::Timestamp) {
        use crate::model::ZoneState;

        let has_active = self
            .permitted_networks
            .iter()
            .any(|p| p.zone_id == zone_id && p.lifecycle.is_active());
        if let Some(zone) = self.zones.iter_mut().find(|z| z.id == zone_id) {
            let next = if has_active {
                ZoneState::Active
            } else {
                ZoneState::PendingNetworkAdd
            };
            if zone.state != next && zone.state != ZoneState::Deleted {
                tracing::debug!(zone_id, from = ?zone.state, to = ?next, "zone state changed");
                zone.state = next;
                zone.modified_on = now;
            }
        }
    }
}
