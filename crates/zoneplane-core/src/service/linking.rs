// # Cross-Account Linking
//
// ```text
// consumer instance                      owner instance
// ─────────────────                      ──────────────
// LinkedZone ──access_request_id──▶ AccessRequest ──zone_id──▶ Zone
//     state mirrors ◀──────────────── APPROVE / REJECT / REVOKE
//
// Zone ◀── PermittedNetwork (ACTIVE ─▶ REMOVAL_IN_PROGRESS ─▶ gone)
// ```
//
// References across instances are by id only; deleting an owner zone does
// not touch the consumer's linked zones. Deletion of permitted networks and
// linked zones is asynchronous: the call moves the entity into
// `REMOVAL_IN_PROGRESS` and the reconciler removes it later.

use tracing::{debug, info, warn};

use super::{ControlPlane, instance_path, now, set_text};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::events::ControlPlaneEvent;
use crate::model::{
    AccessAction, AccessRequest, AccessRequestState, Crn, LinkedZone, LinkedZoneSpec,
    LinkedZoneState, LinkedZoneUpdate, OwnerZoneRef, PermittedNetwork, PermittedNetworkSpec,
    RecordFilter, RemovalLifecycle, RemovalTransition, Requestor, ResourceRecord, VpcReference,
    new_id,
};
use crate::pagination::{Page, PageRequest};

impl ControlPlane {
    /// Permit a VPC to resolve a zone
    ///
    /// The zone becomes `ACTIVE` once it has an active permitted network.
    pub async fn create_permitted_network(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        spec: PermittedNetworkSpec,
    ) -> Result<PermittedNetwork> {
        let vpc_crn = spec.permitted_network.vpc_crn.trim().to_string();
        Crn::vpc(&vpc_crn)?;
        let id = new_id();
        let created = now();
        let max = self.config().quotas.max_permitted_networks_per_zone;

        let network = self
            .mutate(|data| {
                let zone = data.zone(&ctx.instance_id, zone_id)?;
                let zone_name = zone.name.clone();

                let existing: Vec<&PermittedNetwork> = data.zone_networks(zone_id).collect();
                if existing
                    .iter()
                    .any(|p| p.permitted_network.vpc_crn == vpc_crn)
                {
                    return Err(Error::conflict(format!(
                        "VPC {vpc_crn} is already permitted on zone {zone_id}"
                    )));
                }
                if existing.len() >= max {
                    return Err(Error::quota_exceeded(format!(
                        "zone {zone_id} already has the maximum of {max} permitted networks"
                    )));
                }
                // Zone names are unique per instance, so a clash can only
                // come from another instance.
                let same_name_elsewhere = data.permitted_networks.iter().any(|p| {
                    p.zone_id != zone_id
                        && p.permitted_network.vpc_crn == vpc_crn
                        && data
                            .zone_by_id(&p.zone_id)
                            .is_some_and(|z| z.name == zone_name)
                });
                if same_name_elsewhere {
                    return Err(Error::conflict(format!(
                        "VPC {vpc_crn} is already permitted on another zone named {zone_name}"
                    )));
                }

                let network = PermittedNetwork {
                    id: id.clone(),
                    zone_id: zone_id.to_string(),
                    instance_id: ctx.instance_id.clone(),
                    network_type: spec.network_type,
                    permitted_network: VpcReference {
                        vpc_crn: vpc_crn.clone(),
                    },
                    lifecycle: RemovalLifecycle::new(),
                    created_on: created,
                    modified_on: created,
                };
                data.permitted_networks.push(network.clone());
                data.refresh_zone_state(zone_id, created);
                Ok(network)
            })
            .await?;
        info!(zone_id, permitted_network_id = %network.id, vpc_crn = %vpc_crn, "permitted network added");
        Ok(network)
    }

    /// Get a permitted network; not found once the reconciler removed it
    pub async fn get_permitted_network(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        network_id: &str,
    ) -> Result<PermittedNetwork> {
        let data = self.read().await?;
        data.zone(&ctx.instance_id, zone_id)?;
        let i = data.permitted_network_index(zone_id, network_id)?;
        Ok(data.permitted_networks[i].clone())
    }

    pub async fn list_permitted_networks(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        page: &PageRequest,
    ) -> Result<Page<PermittedNetwork>> {
        let data = self.read().await?;
        data.zone(&ctx.instance_id, zone_id)?;
        let networks: Vec<PermittedNetwork> = data.zone_networks(zone_id).cloned().collect();
        let base = format!(
            "{}/zones/{zone_id}/permitted_networks",
            instance_path(&ctx.instance_id)
        );
        self.page(networks, page, &base)
    }

    /// Start removing a permitted network
    ///
    /// Returns immediately with the network in `REMOVAL_IN_PROGRESS`.
    /// Repeating the call while removal is underway returns the same state.
    pub async fn delete_permitted_network(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        network_id: &str,
    ) -> Result<PermittedNetwork> {
        let requested = now();
        let (network, transition) = self
            .mutate(|data| {
                data.zone(&ctx.instance_id, zone_id)?;
                let i = data.permitted_network_index(zone_id, network_id)?;
                let network = &mut data.permitted_networks[i];
                let transition = network.lifecycle.request_removal(requested);
                if transition == RemovalTransition::Started {
                    network.modified_on = requested;
                }
                let network = network.clone();
                data.refresh_zone_state(zone_id, requested);
                Ok((network, transition))
            })
            .await?;

        match transition {
            RemovalTransition::Started => {
                info!(zone_id, permitted_network_id = network_id, "permitted network removal requested");
                self.emit(ControlPlaneEvent::PermittedNetworkRemovalRequested {
                    zone_id: zone_id.to_string(),
                    permitted_network_id: network_id.to_string(),
                });
            }
            RemovalTransition::AlreadyInProgress => {
                debug!(zone_id, permitted_network_id = network_id, "removal already in progress");
            }
        }
        Ok(network)
    }

    /// Link to a zone owned by another instance
    ///
    /// Files a `PENDING` access request on the owner side.
    pub async fn create_linked_zone(
        &self,
        ctx: &RequestContext,
        spec: LinkedZoneSpec,
    ) -> Result<LinkedZone> {
        if spec.owner_instance_id == ctx.instance_id {
            return Err(Error::validation(
                "a linked zone must point at a zone in another instance",
            ));
        }
        let linked_zone_id = new_id();
        let access_request_id = new_id();
        let created = now();

        let linked = self
            .mutate(|data| {
                let owner_zone = data.zone(&spec.owner_instance_id, &spec.owner_zone_id)?.clone();
                let live = data.linked_zones.iter().any(|lz| {
                    lz.instance_id == ctx.instance_id
                        && lz.linked_to.zone_id == owner_zone.id
                        && matches!(
                            lz.state,
                            LinkedZoneState::PendingApproval | LinkedZoneState::Approved
                        )
                });
                if live {
                    return Err(Error::conflict(format!(
                        "instance {} already has a linked zone for zone {}",
                        ctx.instance_id, owner_zone.id
                    )));
                }

                let request = AccessRequest {
                    id: access_request_id.clone(),
                    instance_id: owner_zone.instance_id.clone(),
                    owner_account_id: owner_zone.account_id.clone(),
                    zone_id: owner_zone.id.clone(),
                    requestor: Requestor {
                        instance_id: ctx.instance_id.clone(),
                        account_id: ctx.account_id.clone(),
                        linked_zone_id: linked_zone_id.clone(),
                    },
                    state: AccessRequestState::Pending,
                    history: Vec::new(),
                    created_on: created,
                    modified_on: created,
                };
                let linked = LinkedZone {
                    id: linked_zone_id.clone(),
                    instance_id: ctx.instance_id.clone(),
                    account_id: ctx.account_id.clone(),
                    name: owner_zone.name.clone(),
                    label: spec.label.clone().unwrap_or_default(),
                    description: spec.description.clone().unwrap_or_default(),
                    linked_to: OwnerZoneRef {
                        instance_id: owner_zone.instance_id.clone(),
                        zone_id: owner_zone.id.clone(),
                    },
                    access_request_id: access_request_id.clone(),
                    state: LinkedZoneState::PendingApproval,
                    removal_requested_on: None,
                    created_on: created,
                    modified_on: created,
                };
                data.access_requests.push(request);
                data.linked_zones.push(linked.clone());
                Ok(linked)
            })
            .await?;
        info!(
            linked_zone_id = %linked.id,
            owner_zone_id = %linked.linked_to.zone_id,
            access_request_id = %linked.access_request_id,
            "linked zone created, access requested"
        );
        Ok(linked)
    }

    pub async fn get_linked_zone(
        &self,
        ctx: &RequestContext,
        linked_zone_id: &str,
    ) -> Result<LinkedZone> {
        let data = self.read().await?;
        let i = data.linked_zone_index(&ctx.instance_id, linked_zone_id)?;
        Ok(data.linked_zones[i].clone())
    }

    pub async fn list_linked_zones(
        &self,
        ctx: &RequestContext,
        page: &PageRequest,
    ) -> Result<Page<LinkedZone>> {
        let data = self.read().await?;
        let linked: Vec<LinkedZone> = data
            .linked_zones
            .iter()
            .filter(|lz| lz.instance_id == ctx.instance_id)
            .cloned()
            .collect();
        self.page(
            linked,
            page,
            &format!("{}/linked_dnszones", instance_path(&ctx.instance_id)),
        )
    }

    pub async fn update_linked_zone(
        &self,
        ctx: &RequestContext,
        linked_zone_id: &str,
        update: LinkedZoneUpdate,
    ) -> Result<LinkedZone> {
        let modified = now();
        self.mutate(|data| {
            let i = data.linked_zone_index(&ctx.instance_id, linked_zone_id)?;
            let linked = &mut data.linked_zones[i];
            if linked.is_removing() {
                return Err(Error::conflict(format!(
                    "linked zone {linked_zone_id} is being removed"
                )));
            }
            set_text(&mut linked.label, update.label.clone());
            set_text(&mut linked.description, update.description.clone());
            linked.modified_on = modified;
            Ok(linked.clone())
        })
        .await
    }

    /// Start removing a linked zone
    ///
    /// An access request that is still `PENDING` or `ACTIVE` is revoked on
    /// the owner's side as part of the same commit, recorded in its history
    /// as a cascade.
    pub async fn delete_linked_zone(
        &self,
        ctx: &RequestContext,
        linked_zone_id: &str,
    ) -> Result<LinkedZone> {
        let requested = now();
        let (linked, started, revoked) = self
            .mutate(|data| {
                let i = data.linked_zone_index(&ctx.instance_id, linked_zone_id)?;
                let access_request_id = data.linked_zones[i].access_request_id.clone();

                let mut revoked = None;
                if let Ok(j) = data.access_request_index(&access_request_id) {
                    let request = &mut data.access_requests[j];
                    if request.is_open() {
                        let (from, to) = request.apply(
                            AccessAction::Revoke,
                            &ctx.account_id,
                            requested,
                            true,
                        )?;
                        revoked = Some((access_request_id.clone(), from, to));
                    }
                }

                let linked = &mut data.linked_zones[i];
                if let Some((_, _, to)) = &revoked {
                    linked.sync_with(*to, requested);
                }
                let started = linked.request_removal(requested);
                Ok((linked.clone(), started, revoked))
            })
            .await?;

        if let Some((access_request_id, from, to)) = revoked {
            warn!(
                linked_zone_id,
                access_request_id = %access_request_id,
                ?from,
                "linked zone deleted with open access request; revoked it"
            );
            self.emit(ControlPlaneEvent::AccessRequestTransitioned {
                access_request_id,
                action: AccessAction::Revoke,
                from,
                to,
                cascade: true,
            });
        }
        if started {
            info!(linked_zone_id, "linked zone removal requested");
            self.emit(ControlPlaneEvent::LinkedZoneRemovalRequested {
                linked_zone_id: linked_zone_id.to_string(),
            });
        }
        Ok(linked)
    }

    /// Read the owner zone's records through an approved linked zone
    pub async fn list_linked_zone_records(
        &self,
        ctx: &RequestContext,
        linked_zone_id: &str,
        filter: &RecordFilter,
        page: &PageRequest,
    ) -> Result<Page<ResourceRecord>> {
        let data = self.read().await?;
        let i = data.linked_zone_index(&ctx.instance_id, linked_zone_id)?;
        let linked = &data.linked_zones[i];
        let granted = linked.state == LinkedZoneState::Approved
            && data
                .access_request_index(&linked.access_request_id)
                .is_ok_and(|j| data.access_requests[j].state == AccessRequestState::Active);
        if !granted {
            return Err(Error::unauthorized(format!(
                "linked zone {linked_zone_id} is {:?}; records are readable only once access is approved",
                linked.state
            )));
        }
        let zone = data
            .zone_by_id(&linked.linked_to.zone_id)
            .ok_or_else(|| Error::not_found(format!("zone {} not found", linked.linked_to.zone_id)))?;
        let records: Vec<ResourceRecord> = data
            .zone_records(&zone.id)
            .filter(|r| filter.matches(r, &zone.name))
            .map(|r| r.projected(&zone.name))
            .collect();
        let base = format!(
            "{}/linked_dnszones/{linked_zone_id}/resource_records",
            instance_path(&ctx.instance_id)
        );
        self.page(records, page, &base)
    }

    pub async fn get_access_request(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        access_request_id: &str,
    ) -> Result<AccessRequest> {
        let data = self.read().await?;
        data.zone(&ctx.instance_id, zone_id)?;
        let i = data.access_request_index(access_request_id)?;
        let request = &data.access_requests[i];
        if request.zone_id != zone_id {
            return Err(Error::not_found(format!(
                "access request {access_request_id} not found"
            )));
        }
        Ok(request.clone())
    }

    pub async fn list_access_requests(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        page: &PageRequest,
    ) -> Result<Page<AccessRequest>> {
        let data = self.read().await?;
        data.zone(&ctx.instance_id, zone_id)?;
        let requests: Vec<AccessRequest> = data
            .access_requests
            .iter()
            .filter(|ar| ar.zone_id == zone_id)
            .cloned()
            .collect();
        let base = format!(
            "{}/zones/{zone_id}/access_requests",
            instance_path(&ctx.instance_id)
        );
        self.page(requests, page, &base)
    }

    /// Approve, reject or revoke an access request
    ///
    /// Only the owner (instance and account) may act. Illegal transitions
    /// fail with Conflict and leave the request unchanged. The consumer's
    /// linked zone follows the new state.
    pub async fn update_access_request(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        access_request_id: &str,
        action: AccessAction,
    ) -> Result<AccessRequest> {
        let modified = now();
        let (request, from, to) = self
            .mutate(|data| {
                let i = data.access_request_index(access_request_id)?;
                let request = &mut data.access_requests[i];
                if request.instance_id != ctx.instance_id
                    || request.owner_account_id != ctx.account_id
                {
                    return Err(Error::unauthorized(format!(
                        "only the owner of zone {} may {:?} access request {access_request_id}",
                        request.zone_id, action
                    )));
                }
                if request.zone_id != zone_id {
                    return Err(Error::not_found(format!(
                        "access request {access_request_id} not found"
                    )));
                }
                let (from, to) = request.apply(action, &ctx.account_id, modified, false)?;
                let request = request.clone();

                if let Some(linked) = data
                    .linked_zones
                    .iter_mut()
                    .find(|lz| lz.id == request.requestor.linked_zone_id)
                {
                    linked.sync_with(to, modified);
                }
                Ok((request, from, to))
            })
            .await?;

        info!(access_request_id, ?action, ?from, ?to, "access request updated");
        self.emit(ControlPlaneEvent::AccessRequestTransitioned {
            access_request_id: access_request_id.to_string(),
            action,
            from,
            to,
            cascade: false,
        });
        Ok(request)
    }
}
