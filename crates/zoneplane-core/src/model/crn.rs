// # Cloud Resource Names
//
// VPCs and subnets are referenced by CRN:
//
// ```text
// crn:v1:bluemix:public:is:us-south:a/<account>::vpc:<id>
//  0   1    2      3    4     5        6       7  8    9
// ```
//
// Only the structural fields the control plane relies on are checked; the
// network fabric owns the authoritative meaning of a CRN.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const SEGMENTS: usize = 10;

/// A parsed cloud resource name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Crn {
    segments: Vec<String>,
}

impl Crn {
    pub fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<String> = raw.split(':').map(str::to_string).collect();
        if segments.len() != SEGMENTS {
            return Err(Error::validation(format!(
                "CRN must have {SEGMENTS} colon-separated segments, got {}: '{raw}'",
                segments.len()
            )));
        }
        if segments[0] != "crn" {
            return Err(Error::validation(format!("CRN must start with 'crn:': '{raw}'")));
        }
        if segments[1].is_empty() || segments[4].is_empty() {
            return Err(Error::validation(format!(
                "CRN version and service name are required: '{raw}'"
            )));
        }
        if segments[9].is_empty() {
            return Err(Error::validation(format!("CRN resource is empty: '{raw}'")));
        }
        Ok(Self { segments })
    }

    /// Parse and require a specific service name and resource type
    pub fn parse_typed(raw: &str, service: &str, resource_type: &str) -> Result<Self> {
        let crn = Self::parse(raw)?;
        if crn.service_name() != service || crn.resource_type() != resource_type {
            return Err(Error::validation(format!(
                "expected a '{service}' {resource_type} CRN, got '{raw}'"
            )));
        }
        Ok(crn)
    }

    /// Parse a VPC CRN
    pub fn vpc(raw: &str) -> Result<Self> {
        Self::parse_typed(raw, "is", "vpc")
    }

    /// Parse a subnet CRN
    pub fn subnet(raw: &str) -> Result<Self> {
        Self::parse_typed(raw, "is", "subnet")
    }

    pub fn service_name(&self) -> &str {
        &self.segments[4]
    }

    pub fn location(&self) -> &str {
        &self.segments[5]
    }

    pub fn resource_type(&self) -> &str {
        &self.segments[8]
    }

    pub fn resource(&self) -> &str {
        &self.segments[9]
    }

    /// Same CRN with a different resource type and resource
    pub fn with_resource(&self, resource_type: &str, resource: &str) -> Self {
        let mut segments = self.segments.clone();
        segments[8] = resource_type.to_string();
        segments[9] = resource.to_string();
        Self { segments }
    }
}

impl fmt::Display for Crn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join(":"))
    }
}

impl FromStr for Crn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VPC: &str = "crn:v1:bluemix:public:is:us-south:a/abc123::vpc:r006-1234";

    #[test]
    fn parses_vpc_crn() {
        let crn = Crn::vpc(VPC).unwrap();
        assert_eq!(crn.resource(), "r006-1234");
        assert_eq!(crn.location(), "us-south");
        assert_eq!(crn.to_string(), VPC);
    }

    #[test]
    fn rejects_wrong_resource_type() {
        assert!(Crn::subnet(VPC).is_err());
        assert!(Crn::vpc("crn:v1:vpc").is_err());
        assert!(Crn::vpc("urn:v1:bluemix:public:is:us-south:a/abc::vpc:x").is_err());
    }
}
