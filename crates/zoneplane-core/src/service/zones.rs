// # Zone Store
//
// Zones and their resource records, plus zone-file import and export.
//
// Record names are stored as supplied (normalized) and projected onto the
// zone when read, so `atest` and `atest.example.com` are the same owner.
// Two records may not be identical, and a CNAME owner may hold nothing else.

use tracing::{debug, info, warn};

use super::{ControlPlane, instance_path, now, set_text};
use crate::codec::name;
use crate::codec::rdata::{self, Rdata, RecordType};
use crate::codec::zonefile::{self, ImportSummary, LineError};
use crate::context::RequestContext;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::events::ControlPlaneEvent;
use crate::model::record::{resolve_ttl, validate_service_fields};
use crate::model::{
    RecordFilter, RecordSpec, RecordUpdate, ResourceRecord, Zone, ZoneSpec, ZoneState, ZoneUpdate,
    new_id,
};
use crate::pagination::{Page, PageRequest};

impl ControlPlane {
    /// Create a zone; names are unique per instance
    pub async fn create_zone(&self, ctx: &RequestContext, spec: ZoneSpec) -> Result<Zone> {
        name::validate_zone_name(&spec.name)?;
        let zone_name = name::normalize(&spec.name);
        let id = new_id();
        let created = now();

        let zone = self
            .mutate(|data| {
                if data
                    .zones
                    .iter()
                    .any(|z| z.instance_id == ctx.instance_id && z.name == zone_name)
                {
                    return Err(Error::conflict(format!(
                        "zone {zone_name} already exists in instance {}",
                        ctx.instance_id
                    )));
                }
                let zone = Zone {
                    id: id.clone(),
                    instance_id: ctx.instance_id.clone(),
                    account_id: ctx.account_id.clone(),
                    name: zone_name.clone(),
                    label: spec.label.clone().unwrap_or_default(),
                    description: spec.description.clone().unwrap_or_default(),
                    state: ZoneState::PendingNetworkAdd,
                    created_on: created,
                    modified_on: created,
                };
                data.zones.push(zone.clone());
                Ok(zone)
            })
            .await?;

        info!(zone_id = %zone.id, name = %zone.name, "zone created");
        self.emit(ControlPlaneEvent::ZoneCreated {
            zone_id: zone.id.clone(),
            name: zone.name.clone(),
        });
        Ok(zone)
    }

    pub async fn get_zone(&self, ctx: &RequestContext, zone_id: &str) -> Result<Zone> {
        let data = self.read().await?;
        data.zone(&ctx.instance_id, zone_id).cloned()
    }

    pub async fn list_zones(&self, ctx: &RequestContext, page: &PageRequest) -> Result<Page<Zone>> {
        let data = self.read().await?;
        let zones: Vec<Zone> = data
            .zones
            .iter()
            .filter(|z| z.instance_id == ctx.instance_id)
            .cloned()
            .collect();
        self.page(zones, page, &format!("{}/zones", instance_path(&ctx.instance_id)))
    }

    /// Update label and description
    pub async fn update_zone(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        update: ZoneUpdate,
    ) -> Result<Zone> {
        let modified = now();
        self.mutate(|data| {
            let i = data.zone_index(&ctx.instance_id, zone_id)?;
            let zone = &mut data.zones[i];
            set_text(&mut zone.label, update.label.clone());
            set_text(&mut zone.description, update.description.clone());
            zone.modified_on = modified;
            Ok(zone.clone())
        })
        .await
    }

    /// Delete a zone with its records and permitted networks
    ///
    /// Fails with Conflict while load balancers exist in the zone. Returns
    /// the removed zone in state `DELETED`.
    pub async fn delete_zone(&self, ctx: &RequestContext, zone_id: &str) -> Result<Zone> {
        let deleted_on = now();
        let (zone, records_removed) = self
            .mutate(|data| {
                let i = data.zone_index(&ctx.instance_id, zone_id)?;
                let lbs = data
                    .load_balancers
                    .iter()
                    .filter(|lb| lb.zone_id == zone_id)
                    .count();
                if lbs > 0 {
                    return Err(Error::conflict(format!(
                        "zone {zone_id} still has {lbs} load balancer(s); delete them first"
                    )));
                }
                let mut zone = data.zones.remove(i);
                let before = data.records.len();
                data.records.retain(|r| r.zone_id != zone_id);
                let records_removed = before - data.records.len();
                data.permitted_networks.retain(|p| p.zone_id != zone_id);
                data.access_requests
                    .retain(|ar| ar.zone_id != zone_id || ar.instance_id != ctx.instance_id);
                zone.state = ZoneState::Deleted;
                zone.modified_on = deleted_on;
                Ok((zone, records_removed))
            })
            .await?;

        info!(zone_id, records_removed, "zone deleted");
        self.emit(ControlPlaneEvent::ZoneDeleted {
            zone_id: zone_id.to_string(),
            records_removed,
        });
        Ok(zone)
    }

    pub async fn create_record(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        spec: RecordSpec,
    ) -> Result<ResourceRecord> {
        let id = new_id();
        let created = now();
        let (record, zone_name) = self
            .mutate(|data| {
                let zone_name = data.zone(&ctx.instance_id, zone_id)?.name.clone();
                let record = build_record(id.clone(), zone_id, &zone_name, &spec, created)?;
                check_record_conflicts(data, &record, &zone_name)?;
                data.records.push(record.clone());
                Ok((record, zone_name))
            })
            .await?;

        debug!(zone_id, record_id = %record.id, record_type = %record.record_type(), "record created");
        Ok(record.projected(&zone_name))
    }

    pub async fn get_record(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        record_id: &str,
    ) -> Result<ResourceRecord> {
        let data = self.read().await?;
        let zone = data.zone(&ctx.instance_id, zone_id)?;
        let i = data.record_index(zone_id, record_id)?;
        Ok(data.records[i].projected(&zone.name))
    }

    /// List records, optionally filtered by exact name and/or type
    pub async fn list_records(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        filter: &RecordFilter,
        page: &PageRequest,
    ) -> Result<Page<ResourceRecord>> {
        let data = self.read().await?;
        let zone = data.zone(&ctx.instance_id, zone_id)?;
        let records: Vec<ResourceRecord> = data
            .zone_records(zone_id)
            .filter(|r| filter.matches(r, &zone.name))
            .map(|r| r.projected(&zone.name))
            .collect();
        let base = format!(
            "{}/zones/{zone_id}/resource_records",
            instance_path(&ctx.instance_id)
        );
        self.page(records, page, &base)
    }

    /// Update a record; its type cannot change
    ///
    /// Supplied rdata fields are overlaid on the current ones and the result
    /// is revalidated as a whole.
    pub async fn update_record(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        record_id: &str,
        update: RecordUpdate,
    ) -> Result<ResourceRecord> {
        let modified = now();
        let (record, zone_name) = self
            .mutate(|data| {
                let zone_name = data.zone(&ctx.instance_id, zone_id)?.name.clone();
                let i = data.record_index(zone_id, record_id)?;
                let current = &data.records[i];

                let (record_type, fields) = rdata::decode(&current.rdata);
                let fields = match update.rdata.clone() {
                    Some(patch) => fields.merged_with(patch),
                    None => fields,
                };
                let spec = RecordSpec {
                    name: update.name.clone().unwrap_or_else(|| current.name.clone()),
                    record_type,
                    ttl: Some(update.ttl.unwrap_or(current.ttl)),
                    rdata: fields,
                    service: update.service.clone().or_else(|| current.service.clone()),
                    protocol: update.protocol.clone().or_else(|| current.protocol.clone()),
                };
                let mut record =
                    build_record(current.id.clone(), zone_id, &zone_name, &spec, current.created_on)?;
                record.modified_on = modified;

                let removed = data.records.remove(i);
                if let Err(e) = check_record_conflicts(data, &record, &zone_name) {
                    data.records.insert(i, removed);
                    return Err(e);
                }
                data.records.insert(i, record.clone());
                Ok((record, zone_name))
            })
            .await?;
        Ok(record.projected(&zone_name))
    }

    pub async fn delete_record(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        record_id: &str,
    ) -> Result<()> {
        self.mutate(|data| {
            data.zone(&ctx.instance_id, zone_id)?;
            let i = data.record_index(zone_id, record_id)?;
            data.records.remove(i);
            Ok(())
        })
        .await?;
        debug!(zone_id, record_id, "record deleted");
        Ok(())
    }

    /// Import zone-file text into a zone
    ///
    /// Bad lines are reported in the summary and do not stop the import;
    /// everything that validates is committed together.
    pub async fn import_zone_file(
        &self,
        ctx: &RequestContext,
        zone_id: &str,
        content_type: &str,
        content: &str,
    ) -> Result<ImportSummary> {
        zonefile::check_content_type(content_type)?;
        let zone_name = self.get_zone(ctx, zone_id).await?.name;
        let parsed = zonefile::parse(content, &zone_name);
        let created = now();

        let summary = self
            .mutate(|data| {
                data.zone(&ctx.instance_id, zone_id)?;
                let mut messages: Vec<LineError> = parsed.errors.clone();
                let mut added = 0;
                for entry in &parsed.records {
                    let outcome = build_record(new_id(), zone_id, &zone_name, &entry.spec, created)
                        .and_then(|record| {
                            check_record_conflicts(data, &record, &zone_name)?;
                            Ok(record)
                        });
                    match outcome {
                        Ok(record) => {
                            data.records.push(record);
                            added += 1;
                        }
                        Err(e) => messages.push(LineError {
                            line: entry.line,
                            message: e.to_string(),
                        }),
                    }
                }
                messages.sort_by_key(|m| m.line);
                Ok(ImportSummary {
                    total_records_parsed: parsed.record_lines,
                    records_added: added,
                    records_failed: parsed.record_lines - added,
                    messages,
                })
            })
            .await?;

        if summary.records_failed > 0 {
            warn!(
                zone_id,
                failed = summary.records_failed,
                "zone import skipped lines"
            );
        }
        info!(zone_id, added = summary.records_added, "zone file imported");
        self.emit(ControlPlaneEvent::ZoneImported {
            zone_id: zone_id.to_string(),
            records_added: summary.records_added,
            records_failed: summary.records_failed,
        });
        Ok(summary)
    }

    /// Render every record of a zone as zone-file text
    pub async fn export_zone_file(&self, ctx: &RequestContext, zone_id: &str) -> Result<String> {
        let data = self.read().await?;
        let zone = data.zone(&ctx.instance_id, zone_id)?;
        let records: Vec<ResourceRecord> = data.zone_records(zone_id).cloned().collect();
        Ok(zonefile::export(&zone.name, &records))
    }
}

/// Validate a record request against its zone
fn build_record(
    id: String,
    zone_id: &str,
    zone_name: &str,
    spec: &RecordSpec,
    created: crate::model::Timestamp,
) -> Result<ResourceRecord> {
    name::validate_record_name(&spec.name)?;
    let owner = if spec.name == "@" {
        "@".to_string()
    } else {
        name::normalize(&spec.name)
    };
    validate_service_fields(
        spec.record_type,
        spec.service.as_deref(),
        spec.protocol.as_deref(),
    )?;
    let ttl = resolve_ttl(spec.ttl)?;
    let rdata = rdata::encode(spec.record_type, &spec.rdata)?;

    if let Rdata::Ptr { ptrdname } = &rdata
        && !name::is_within_zone(ptrdname, zone_name)
    {
        return Err(Error::validation(format!(
            "PTR target {ptrdname} must be a hostname inside zone {zone_name}"
        )));
    }

    let lower = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_ascii_lowercase());
    Ok(ResourceRecord {
        id,
        zone_id: zone_id.to_string(),
        name: owner,
        rdata,
        ttl,
        service: lower(&spec.service),
        protocol: lower(&spec.protocol),
        created_on: created,
        modified_on: created,
    })
}

/// Reject exact duplicates and CNAME coexistence at one owner
fn check_record_conflicts(data: &Dataset, record: &ResourceRecord, zone_name: &str) -> Result<()> {
    let owner = record.qualified_name(zone_name);
    for other in data.zone_records(&record.zone_id) {
        if other.id == record.id || other.qualified_name(zone_name) != owner {
            continue;
        }
        if other.rdata == record.rdata {
            return Err(Error::conflict(format!(
                "an identical {} record already exists at {owner}",
                record.record_type()
            )));
        }
        let cname = RecordType::Cname;
        if record.record_type() == cname || other.record_type() == cname {
            return Err(Error::conflict(format!(
                "{owner} has a CNAME record; a CNAME owner cannot hold other records"
            )));
        }
    }
    Ok(())
}
