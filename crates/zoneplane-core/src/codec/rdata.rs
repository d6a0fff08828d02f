// # Record Data Codec
//
// Converts between the loose wire representation of record data
// ([`RdataFields`], one optional field per possible attribute) and the typed
// sum [`Rdata`], whose variant always matches the record type.
//
// ## Contract
//
// - `encode(type, fields)` validates the per-type rules and yields `Rdata`
// - `decode(rdata)` yields the record type and the populated fields
//
// Decoding then re-encoding is lossless for every record type.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::name;
use crate::error::{Error, Result};

/// Maximum TXT payload after splitting into 255-byte character strings
const MAX_TXT_WIRE_LEN: usize = 65_535;

/// Closed set of supported record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Srv,
    Txt,
    Ptr,
}

impl RecordType {
    pub const ALL: [RecordType; 7] = [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Cname,
        RecordType::Mx,
        RecordType::Srv,
        RecordType::Txt,
        RecordType::Ptr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Srv => "SRV",
            RecordType::Txt => "TXT",
            RecordType::Ptr => "PTR",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::validation(format!("unsupported record type: '{s}'")))
    }
}

/// Typed record data
///
/// Serialized adjacently tagged so a record carries `"type": "MX"` next to
/// `"rdata": {"exchange": ..., "preference": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "rdata", rename_all = "UPPERCASE")]
pub enum Rdata {
    A { ip: Ipv4Addr },
    Aaaa { ip: Ipv6Addr },
    Cname { cname: String },
    Mx { exchange: String, preference: u16 },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Txt { text: String },
    Ptr { ptrdname: String },
}

impl Rdata {
    pub fn record_type(&self) -> RecordType {
        match self {
            Rdata::A { .. } => RecordType::A,
            Rdata::Aaaa { .. } => RecordType::Aaaa,
            Rdata::Cname { .. } => RecordType::Cname,
            Rdata::Mx { .. } => RecordType::Mx,
            Rdata::Srv { .. } => RecordType::Srv,
            Rdata::Txt { .. } => RecordType::Txt,
            Rdata::Ptr { .. } => RecordType::Ptr,
        }
    }

    /// Presentation format used in zone files
    pub fn to_zone_text(&self) -> String {
        match self {
            Rdata::A { ip } => ip.to_string(),
            Rdata::Aaaa { ip } => ip.to_string(),
            Rdata::Cname { cname } => absolute(cname),
            Rdata::Mx {
                exchange,
                preference,
            } => format!("{preference} {}", absolute(exchange)),
            Rdata::Srv {
                priority,
                weight,
                port,
                target,
            } => format!("{priority} {weight} {port} {}", absolute(target)),
            Rdata::Txt { text } => quote_txt(text),
            Rdata::Ptr { ptrdname } => absolute(ptrdname),
        }
    }
}

/// Wire representation of record data: every attribute optional
///
/// Integer fields are wide so out-of-range input reaches validation instead
/// of failing deserialization with an opaque message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdataFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preference: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptrdname: Option<String>,
}

impl RdataFields {
    pub fn ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            ..Self::default()
        }
    }

    pub fn cname(cname: impl Into<String>) -> Self {
        Self {
            cname: Some(cname.into()),
            ..Self::default()
        }
    }

    pub fn mx(exchange: impl Into<String>, preference: i64) -> Self {
        Self {
            exchange: Some(exchange.into()),
            preference: Some(preference),
            ..Self::default()
        }
    }

    pub fn srv(priority: i64, weight: i64, port: i64, target: impl Into<String>) -> Self {
        Self {
            priority: Some(priority),
            weight: Some(weight),
            port: Some(port),
            target: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn txt(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn ptr(ptrdname: impl Into<String>) -> Self {
        Self {
            ptrdname: Some(ptrdname.into()),
            ..Self::default()
        }
    }

    /// Overlay the populated fields of `patch` onto `self`
    pub fn merged_with(self, patch: RdataFields) -> Self {
        Self {
            ip: patch.ip.or(self.ip),
            cname: patch.cname.or(self.cname),
            exchange: patch.exchange.or(self.exchange),
            preference: patch.preference.or(self.preference),
            priority: patch.priority.or(self.priority),
            weight: patch.weight.or(self.weight),
            port: patch.port.or(self.port),
            target: patch.target.or(self.target),
            text: patch.text.or(self.text),
            ptrdname: patch.ptrdname.or(self.ptrdname),
        }
    }
}

/// Validate `fields` against the rules of `record_type`
pub fn encode(record_type: RecordType, fields: &RdataFields) -> Result<Rdata> {
    match record_type {
        RecordType::A => {
            let raw = required(&fields.ip, "ip", record_type)?;
            let ip = raw.parse::<Ipv4Addr>().map_err(|_| {
                Error::validation(format!("A record requires an IPv4 address, got '{raw}'"))
            })?;
            Ok(Rdata::A { ip })
        }
        RecordType::Aaaa => {
            let raw = required(&fields.ip, "ip", record_type)?;
            let ip = raw.parse::<Ipv6Addr>().map_err(|_| {
                Error::validation(format!("AAAA record requires an IPv6 address, got '{raw}'"))
            })?;
            Ok(Rdata::Aaaa { ip })
        }
        RecordType::Cname => Ok(Rdata::Cname {
            cname: target_field(&fields.cname, "cname", record_type)?,
        }),
        RecordType::Mx => Ok(Rdata::Mx {
            exchange: target_field(&fields.exchange, "exchange", record_type)?,
            preference: u16_field(fields.preference, "preference", record_type)?,
        }),
        RecordType::Srv => Ok(Rdata::Srv {
            priority: u16_field(fields.priority, "priority", record_type)?,
            weight: u16_field(fields.weight, "weight", record_type)?,
            port: u16_field(fields.port, "port", record_type)?,
            target: target_field(&fields.target, "target", record_type)?,
        }),
        RecordType::Txt => {
            let text = required(&fields.text, "text", record_type)?;
            let wire_len = text.len() + text.len().div_ceil(255).max(1);
            if wire_len > MAX_TXT_WIRE_LEN {
                return Err(Error::validation(format!(
                    "TXT data exceeds wire limit of {MAX_TXT_WIRE_LEN} bytes"
                )));
            }
            Ok(Rdata::Txt {
                text: text.to_string(),
            })
        }
        RecordType::Ptr => Ok(Rdata::Ptr {
            ptrdname: target_field(&fields.ptrdname, "ptrdname", record_type)?,
        }),
    }
}

/// Recover the record type and populated wire fields
pub fn decode(rdata: &Rdata) -> (RecordType, RdataFields) {
    let fields = match rdata {
        Rdata::A { ip } => RdataFields::ip(ip.to_string()),
        Rdata::Aaaa { ip } => RdataFields::ip(ip.to_string()),
        Rdata::Cname { cname } => RdataFields::cname(cname.clone()),
        Rdata::Mx {
            exchange,
            preference,
        } => RdataFields::mx(exchange.clone(), i64::from(*preference)),
        Rdata::Srv {
            priority,
            weight,
            port,
            target,
        } => RdataFields::srv(
            i64::from(*priority),
            i64::from(*weight),
            i64::from(*port),
            target.clone(),
        ),
        Rdata::Txt { text } => RdataFields::txt(text.clone()),
        Rdata::Ptr { ptrdname } => RdataFields::ptr(ptrdname.clone()),
    };
    (rdata.record_type(), fields)
}

fn required<'a>(value: &'a Option<String>, field: &str, record_type: RecordType) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| Error::validation(format!("{record_type} record requires rdata.{field}")))
}

fn target_field(value: &Option<String>, field: &str, record_type: RecordType) -> Result<String> {
    let raw = required(value, field, record_type)?;
    if record_type == RecordType::Srv && raw == "." {
        return Ok(".".to_string());
    }
    name::validate_target(raw).map_err(|e| {
        Error::validation(format!("{record_type} rdata.{field} is not a valid domain: {e}"))
    })?;
    Ok(name::normalize(raw))
}

fn u16_field(value: Option<i64>, field: &str, record_type: RecordType) -> Result<u16> {
    let raw = value
        .ok_or_else(|| Error::validation(format!("{record_type} record requires rdata.{field}")))?;
    u16::try_from(raw).map_err(|_| {
        Error::validation(format!(
            "{record_type} rdata.{field} must be in [0, 65535], got {raw}"
        ))
    })
}

fn absolute(name: &str) -> String {
    if name == "." || name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Quote TXT data, splitting into 255-byte character strings
///
/// ASCII control characters become `\DDD` escapes so each record stays on
/// one line.
fn quote_txt(text: &str) -> String {
    let escaped: Vec<String> = chunk_utf8(text, 255)
        .into_iter()
        .map(|chunk| {
            let mut quoted = String::with_capacity(chunk.len() + 2);
            quoted.push('"');
            for c in chunk.chars() {
                match c {
                    '\\' | '"' => {
                        quoted.push('\\');
                        quoted.push(c);
                    }
                    c if c.is_ascii_control() => quoted.push_str(&format!("\\{:03}", c as u32)),
                    c => quoted.push(c),
                }
            }
            quoted.push('"');
            quoted
        })
        .collect();
    if escaped.is_empty() {
        "\"\"".to_string()
    } else {
        escaped.join(" ")
    }
}

fn chunk_utf8(text: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut end = rest.len().min(max);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }
    chunks
}
