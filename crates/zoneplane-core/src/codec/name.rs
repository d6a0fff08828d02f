// # Domain Name Rules
//
// Syntax checks for zone names, record owner names and rdata targets, and
// the read-time projection of relative record names onto their zone.
//
// All names are handled without the trailing root dot and compared
// case-insensitively (stored lowercase).

use crate::error::{Error, Result};

/// RFC 1035 total length limit (without trailing dot)
const MAX_NAME_LEN: usize = 253;
/// RFC 1035 label length limit
const MAX_LABEL_LEN: usize = 63;

/// Strip a single trailing dot and lowercase
pub fn normalize(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_ascii_lowercase()
}

/// Validate a zone name: hostname labels, no wildcard, no underscores
pub fn validate_zone_name(name: &str) -> Result<()> {
    validate_labels(name, LabelRules::HOSTNAME).map_err(|e| match e {
        Error::Validation(msg) => Error::validation(format!("invalid zone name: {msg}")),
        other => other,
    })
}

/// Validate a domain used as rdata target (CNAME, MX, SRV, PTR)
///
/// Underscore labels are accepted since targets such as DKIM selectors
/// legitimately carry them.
pub fn validate_target(name: &str) -> Result<()> {
    validate_labels(name, LabelRules::TARGET)
}

/// Validate a record owner name, relative or absolute
///
/// `@` denotes the zone apex; a leading `*` label is a wildcard.
pub fn validate_record_name(name: &str) -> Result<()> {
    if name == "@" {
        return Ok(());
    }
    let normalized = normalize(name);
    match normalized.strip_prefix("*.") {
        Some(rest) => validate_labels(rest, LabelRules::TARGET),
        None if normalized == "*" => Ok(()),
        None => validate_labels(&normalized, LabelRules::TARGET),
    }
}

/// Whether `name` is the zone apex or a subdomain of `zone`
pub fn is_within_zone(name: &str, zone: &str) -> bool {
    let name = normalize(name);
    let zone = normalize(zone);
    name == zone || name.ends_with(&format!(".{zone}"))
}

/// Project a possibly-relative record name onto its zone
///
/// Names already inside the zone are returned normalized; anything else
/// gets `.` + zone appended.
pub fn qualify(name: &str, zone: &str) -> String {
    let zone = normalize(zone);
    let name = normalize(name);
    if name.is_empty() || name == "@" {
        return zone;
    }
    if is_within_zone(&name, &zone) {
        name
    } else {
        format!("{name}.{zone}")
    }
}

/// Owner name relative to the zone, `@` for the apex
pub fn relativize(name: &str, zone: &str) -> String {
    let zone = normalize(zone);
    let name = normalize(name);
    if name == zone {
        return "@".to_string();
    }
    match name.strip_suffix(&format!(".{zone}")) {
        Some(relative) => relative.to_string(),
        None => name,
    }
}

#[derive(Clone, Copy)]
struct LabelRules {
    allow_underscore: bool,
}

impl LabelRules {
    const HOSTNAME: Self = Self {
        allow_underscore: false,
    };
    const TARGET: Self = Self {
        allow_underscore: true,
    };
}

fn validate_labels(name: &str, rules: LabelRules) -> Result<()> {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() {
        return Err(Error::validation("domain name cannot be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::validation(format!(
            "domain name too long: {} chars (max {MAX_NAME_LEN})",
            name.len()
        )));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(Error::validation(format!("domain name has empty label: '{name}'")));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(Error::validation(format!(
                "domain label too long: {} chars (max {MAX_LABEL_LEN}). Label: '{label}'",
                label.len()
            )));
        }
        let valid_char =
            |c: char| c.is_ascii_alphanumeric() || c == '-' || (rules.allow_underscore && c == '_');
        if !label.chars().all(valid_char) {
            return Err(Error::validation(format!(
                "domain label contains invalid characters: '{label}'"
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::validation(format!(
                "domain label cannot start or end with hyphen: '{label}'"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualify_relative_and_absolute() {
        assert_eq!(qualify("atest", "example.com"), "atest.example.com");
        assert_eq!(qualify("atest.example.com", "example.com"), "atest.example.com");
        assert_eq!(qualify("ATest.Example.com.", "example.com"), "atest.example.com");
        assert_eq!(qualify("@", "example.com"), "example.com");
        assert_eq!(qualify("example.com", "example.com"), "example.com");
    }

    #[test]
    fn relativize_roundtrip() {
        assert_eq!(relativize("www.example.com", "example.com"), "www");
        assert_eq!(relativize("example.com", "example.com"), "@");
    }

    #[test]
    fn zone_names() {
        assert!(validate_zone_name("example.com").is_ok());
        assert!(validate_zone_name("example.com.").is_ok());
        assert!(validate_zone_name("-bad.com").is_err());
        assert!(validate_zone_name("under_score.com").is_err());
        assert!(validate_zone_name("a..com").is_err());
        assert!(validate_zone_name(&format!("{}.com", "a".repeat(64))).is_err());
    }

    #[test]
    fn record_names() {
        assert!(validate_record_name("@").is_ok());
        assert!(validate_record_name("*").is_ok());
        assert!(validate_record_name("*.dev").is_ok());
        assert!(validate_record_name("_sip._udp").is_ok());
        assert!(validate_record_name("10.1.1.1").is_ok());
        assert!(validate_record_name("bad name").is_err());
        assert!(validate_record_name("dev.*").is_err());
    }
}
