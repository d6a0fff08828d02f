//! DNS resource records

use serde::{Deserialize, Serialize};

use super::Timestamp;
use crate::codec::name;
use crate::codec::rdata::{Rdata, RdataFields, RecordType};
use crate::error::{Error, Result};

/// Smallest accepted record TTL (seconds)
pub const MIN_TTL: u32 = 60;
/// Largest accepted record TTL (seconds)
pub const MAX_TTL: u32 = 86_400;
/// TTL applied when the caller omits one
pub const DEFAULT_TTL: u32 = 900;

/// A resource record inside a zone
///
/// `name` is stored as supplied; callers see the zone-qualified projection
/// produced by [`ResourceRecord::projected`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    pub zone_id: String,
    pub name: String,
    #[serde(flatten)]
    pub rdata: Rdata,
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    pub created_on: Timestamp,
    pub modified_on: Timestamp,
}

impl ResourceRecord {
    pub fn record_type(&self) -> RecordType {
        self.rdata.record_type()
    }

    /// Canonical absolute owner name within `zone_name`
    ///
    /// SRV owners are prefixed with `<service>.<protocol>`.
    pub fn qualified_name(&self, zone_name: &str) -> String {
        let base = name::qualify(&self.name, zone_name);
        match (&self.rdata, &self.service, &self.protocol) {
            (Rdata::Srv { .. }, Some(service), Some(protocol)) => {
                let prefix = format!("{}.{}", service.to_ascii_lowercase(), protocol.to_ascii_lowercase());
                if base.starts_with(&format!("{prefix}.")) {
                    base
                } else {
                    format!("{prefix}.{base}")
                }
            }
            _ => base,
        }
    }

    /// Copy of this record with its name projected onto the zone
    pub fn projected(&self, zone_name: &str) -> Self {
        Self {
            name: self.qualified_name(zone_name),
            ..self.clone()
        }
    }
}

/// Input for creating a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(default)]
    pub ttl: Option<u32>,
    pub rdata: RdataFields,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl RecordSpec {
    pub fn new(name: impl Into<String>, record_type: RecordType, rdata: RdataFields) -> Self {
        Self {
            name: name.into(),
            record_type,
            ttl: None,
            rdata,
            service: None,
            protocol: None,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_service(mut self, service: impl Into<String>, protocol: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self.protocol = Some(protocol.into());
        self
    }
}

/// Partial record update; the record type is immutable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ttl: Option<u32>,
    /// Fields overlaid on the current rdata before revalidation
    #[serde(default)]
    pub rdata: Option<RdataFields>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

/// Exact-match filters for listing records; both set means AND
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub record_type: Option<RecordType>,
}

impl RecordFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            record_type: None,
        }
    }

    pub fn by_type(record_type: RecordType) -> Self {
        Self {
            name: None,
            record_type: Some(record_type),
        }
    }

    pub fn with_type(mut self, record_type: RecordType) -> Self {
        self.record_type = Some(record_type);
        self
    }

    /// Whether a record (already projected onto `zone_name`) matches
    pub fn matches(&self, record: &ResourceRecord, zone_name: &str) -> bool {
        let name_ok = self
            .name
            .as_deref()
            .is_none_or(|wanted| name::qualify(wanted, zone_name) == record.qualified_name(zone_name));
        let type_ok = self.record_type.is_none_or(|t| t == record.record_type());
        name_ok && type_ok
    }
}

/// Validate a TTL or apply the default
pub fn resolve_ttl(ttl: Option<u32>) -> Result<u32> {
    match ttl {
        None => Ok(DEFAULT_TTL),
        Some(ttl) if (MIN_TTL..=MAX_TTL).contains(&ttl) => Ok(ttl),
        Some(ttl) => Err(Error::validation(format!(
            "ttl must be between {MIN_TTL} and {MAX_TTL} seconds, got {ttl}"
        ))),
    }
}

/// SRV records need both service and protocol; other types take neither
pub fn validate_service_fields(
    record_type: RecordType,
    service: Option<&str>,
    protocol: Option<&str>,
) -> Result<()> {
    let non_empty = |v: Option<&str>| v.is_some_and(|s| !s.trim().is_empty());
    if record_type == RecordType::Srv {
        if !non_empty(service) || !non_empty(protocol) {
            return Err(Error::validation(
                "SRV records require non-empty service and protocol",
            ));
        }
        for label in [service, protocol].into_iter().flatten() {
            name::validate_target(label).map_err(|_| {
                Error::validation(format!("SRV service/protocol is not a valid label: '{label}'"))
            })?;
            if label.contains('.') {
                return Err(Error::validation(format!(
                    "SRV service/protocol must be a single label: '{label}'"
                )));
            }
        }
        Ok(())
    } else if service.is_some() || protocol.is_some() {
        Err(Error::validation(format!(
            "service and protocol are only valid on SRV records, not {record_type}"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::rdata::encode;

    fn record(name: &str, rdata: Rdata) -> ResourceRecord {
        let now = chrono::Utc::now();
        ResourceRecord {
            id: "r1".to_string(),
            zone_id: "z1".to_string(),
            name: name.to_string(),
            rdata,
            ttl: DEFAULT_TTL,
            service: None,
            protocol: None,
            created_on: now,
            modified_on: now,
        }
    }

    #[test]
    fn srv_name_carries_service_and_protocol() {
        let rdata = encode(RecordType::Srv, &RdataFields::srv(1, 1, 443, "web.example.com")).unwrap();
        let mut srv = record("svc", rdata);
        srv.service = Some("_https".to_string());
        srv.protocol = Some("_tcp".to_string());
        assert_eq!(srv.qualified_name("example.com"), "_https._tcp.svc.example.com");
        assert_eq!(
            srv.projected("example.com").qualified_name("example.com"),
            "_https._tcp.svc.example.com"
        );
    }

    #[test]
    fn filter_matches_relative_and_absolute_names() {
        let a = record("atest", encode(RecordType::A, &RdataFields::ip("10.0.0.1")).unwrap());
        assert!(RecordFilter::by_name("atest.example.com").matches(&a, "example.com"));
        assert!(RecordFilter::by_name("atest").matches(&a, "example.com"));
        assert!(!RecordFilter::by_name("atest").with_type(RecordType::Ptr).matches(&a, "example.com"));
    }

    #[test]
    fn service_fields_only_on_srv() {
        assert!(validate_service_fields(RecordType::Srv, None, Some("_tcp")).is_err());
        assert!(validate_service_fields(RecordType::Srv, Some(""), Some("_tcp")).is_err());
        assert!(validate_service_fields(RecordType::Srv, Some("_sip"), Some("_udp")).is_ok());
        assert!(validate_service_fields(RecordType::A, Some("_sip"), None).is_err());
    }

    #[test]
    fn ttl_bounds() {
        assert_eq!(resolve_ttl(None).unwrap(), DEFAULT_TTL);
        assert!(resolve_ttl(Some(59)).is_err());
        assert!(resolve_ttl(Some(86_401)).is_err());
    }
}
