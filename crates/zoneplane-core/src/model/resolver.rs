//! Custom resolvers, their locations and forwarding rules

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::Timestamp;
use crate::codec::name;
use crate::error::{Error, Result};

/// Resolver tier; bounds location and forwarding-rule counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverProfile {
    #[default]
    Essential,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolverHealth {
    Healthy,
    Degraded,
    Critical,
}

/// A subnet hosting one of the resolver's DNS servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub subnet_crn: String,
    pub enabled: bool,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_server_ip: Option<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSpec {
    pub subnet_crn: String,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl LocationSpec {
    pub fn new(subnet_crn: impl Into<String>) -> Self {
        Self {
            subnet_crn: subnet_crn.into(),
            enabled: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = Some(false);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationUpdate {
    #[serde(default)]
    pub subnet_crn: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomResolver {
    pub id: String,
    pub instance_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub profile: ResolverProfile,
    pub health: ResolverHealth,
    pub locations: Vec<Location>,
    pub created_on: Timestamp,
    pub modified_on: Timestamp,
}

impl CustomResolver {
    pub fn enabled_locations(&self) -> usize {
        self.locations.iter().filter(|l| l.enabled).count()
    }

    pub fn location(&self, location_id: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == location_id)
    }

    pub fn recompute_health(&mut self) {
        let enabled = self.enabled_locations();
        let healthy = self.locations.iter().filter(|l| l.enabled && l.healthy).count();
        self.health = if enabled == 0 || healthy == 0 {
            ResolverHealth::Critical
        } else if healthy == enabled {
            ResolverHealth::Healthy
        } else {
            ResolverHealth::Degraded
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub profile: Option<ResolverProfile>,
    #[serde(default)]
    pub locations: Vec<LocationSpec>,
}

impl ResolverSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            profile: None,
            locations: Vec::new(),
        }
    }

    pub fn with_profile(mut self, profile: ResolverProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_location(mut self, location: LocationSpec) -> Self {
        self.locations.push(location);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub profile: Option<ResolverProfile>,
}

/// What a forwarding rule's match pattern names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    #[default]
    Zone,
    Hostname,
}

/// Source-conditioned forwarding target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Boolean predicate over the query source, e.g. `ipInRange('10.0.0.0/8', source.ip)`
    pub expression: String,
    pub forward_to: Vec<IpAddr>,
}

/// View as supplied by a caller, before address parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub expression: String,
    pub forward_to: Vec<String>,
}

impl ViewSpec {
    pub fn new(name: impl Into<String>, expression: impl Into<String>, forward_to: Vec<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            expression: expression.into(),
            forward_to,
        }
    }
}

/// Where a forwarding rule sends matching queries
///
/// Exactly one of three shapes; a rule forwarding nowhere cannot be built.
/// On the wire the shape is implied by which of `forward_to` and `views`
/// are populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TargetParts", into = "TargetParts")]
pub enum ForwardingTargets {
    Forward(Vec<IpAddr>),
    Views(Vec<View>),
    ForwardAndViews {
        forward_to: Vec<IpAddr>,
        views: Vec<View>,
    },
}

impl ForwardingTargets {
    /// Validate caller-supplied targets and pick the matching shape
    pub fn from_request(forward_to: Vec<String>, views: Vec<ViewSpec>) -> Result<Self> {
        let forward_to = parse_addresses(&forward_to, "forward_to")?;
        let mut built: Vec<View> = Vec::with_capacity(views.len());
        for spec in views {
            let view_name = spec.name.trim().to_string();
            if view_name.is_empty() {
                return Err(Error::validation("view name cannot be empty"));
            }
            if built.iter().any(|v| v.name == view_name) {
                return Err(Error::validation(format!("duplicate view name '{view_name}'")));
            }
            validate_expression(&spec.expression)?;
            let targets = parse_addresses(&spec.forward_to, &format!("view '{view_name}' forward_to"))?;
            if targets.is_empty() {
                return Err(Error::validation(format!(
                    "view '{view_name}' requires at least one forward_to address"
                )));
            }
            built.push(View {
                name: view_name,
                description: spec.description.unwrap_or_default(),
                expression: spec.expression.trim().to_string(),
                forward_to: targets,
            });
        }
        Self::try_from(TargetParts {
            forward_to,
            views: built,
        })
        .map_err(Error::validation)
    }

    pub fn forward_to(&self) -> &[IpAddr] {
        match self {
            ForwardingTargets::Forward(forward_to)
            | ForwardingTargets::ForwardAndViews { forward_to, .. } => forward_to,
            ForwardingTargets::Views(_) => &[],
        }
    }

    pub fn views(&self) -> &[View] {
        match self {
            ForwardingTargets::Views(views) | ForwardingTargets::ForwardAndViews { views, .. } => {
                views
            }
            ForwardingTargets::Forward(_) => &[],
        }
    }

    fn to_request(&self) -> (Vec<String>, Vec<ViewSpec>) {
        let forward_to = self.forward_to().iter().map(IpAddr::to_string).collect();
        let views = self
            .views()
            .iter()
            .map(|v| ViewSpec {
                name: v.name.clone(),
                description: Some(v.description.clone()),
                expression: v.expression.clone(),
                forward_to: v.forward_to.iter().map(IpAddr::to_string).collect(),
            })
            .collect();
        (forward_to, views)
    }
}

/// Flat wire shape of [`ForwardingTargets`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetParts {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    forward_to: Vec<IpAddr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    views: Vec<View>,
}

impl TryFrom<TargetParts> for ForwardingTargets {
    type Error = String;

    fn try_from(parts: TargetParts) -> std::result::Result<Self, Self::Error> {
        match (parts.forward_to.is_empty(), parts.views.is_empty()) {
            (false, true) => Ok(ForwardingTargets::Forward(parts.forward_to)),
            (true, false) => Ok(ForwardingTargets::Views(parts.views)),
            (false, false) => Ok(ForwardingTargets::ForwardAndViews {
                forward_to: parts.forward_to,
                views: parts.views,
            }),
            (true, true) => Err("forwarding rule requires forward_to, views, or both".to_string()),
        }
    }
}

impl From<ForwardingTargets> for TargetParts {
    fn from(targets: ForwardingTargets) -> Self {
        match targets {
            ForwardingTargets::Forward(forward_to) => TargetParts {
                forward_to,
                views: Vec::new(),
            },
            ForwardingTargets::Views(views) => TargetParts {
                forward_to: Vec::new(),
                views,
            },
            ForwardingTargets::ForwardAndViews { forward_to, views } => {
                TargetParts { forward_to, views }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRule {
    pub id: String,
    pub resolver_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    #[serde(rename = "match")]
    pub match_pattern: String,
    #[serde(flatten)]
    pub targets: ForwardingTargets,
    pub created_on: Timestamp,
    pub modified_on: Timestamp,
}

impl ForwardingRule {
    /// Apply an update, revalidating the targets; `self` is untouched on error
    pub fn apply_update(&mut self, update: ForwardingRuleUpdate, now: Timestamp) -> Result<()> {
        let match_pattern = match update.match_pattern {
            Some(pattern) => validate_match(&pattern)?,
            None => self.match_pattern.clone(),
        };
        let targets = if update.forward_to.is_some() || update.views.is_some() {
            let (forward_to, views) = self.targets.to_request();
            ForwardingTargets::from_request(
                update.forward_to.unwrap_or(forward_to),
                update.views.unwrap_or(views),
            )?
        } else {
            self.targets.clone()
        };
        if let Some(description) = update.description {
            self.description = description;
        }
        self.match_pattern = match_pattern;
        self.targets = targets;
        self.modified_on = now;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRuleSpec {
    #[serde(rename = "match")]
    pub match_pattern: String,
    #[serde(default, rename = "type")]
    pub rule_type: RuleType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub forward_to: Vec<String>,
    #[serde(default)]
    pub views: Vec<ViewSpec>,
}

impl ForwardingRuleSpec {
    pub fn new(match_pattern: impl Into<String>) -> Self {
        Self {
            match_pattern: match_pattern.into(),
            rule_type: RuleType::Zone,
            description: None,
            forward_to: Vec::new(),
            views: Vec::new(),
        }
    }

    pub fn forward_to(mut self, targets: &[&str]) -> Self {
        self.forward_to = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_view(mut self, view: ViewSpec) -> Self {
        self.views.push(view);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRuleUpdate {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "match")]
    pub match_pattern: Option<String>,
    #[serde(default)]
    pub forward_to: Option<Vec<String>>,
    #[serde(default)]
    pub views: Option<Vec<ViewSpec>>,
}

/// Validate a rule's match pattern, returning it normalized
pub fn validate_match(pattern: &str) -> Result<String> {
    name::validate_target(pattern)
        .map_err(|e| Error::validation(format!("invalid forwarding rule match '{pattern}': {e}")))?;
    Ok(name::normalize(pattern))
}

fn parse_addresses(raw: &[String], field: &str) -> Result<Vec<IpAddr>> {
    let mut parsed: Vec<IpAddr> = Vec::with_capacity(raw.len());
    for value in raw {
        let ip = value.trim().parse::<IpAddr>().map_err(|_| {
            Error::validation(format!("{field} entries must be IP addresses, got '{value}'"))
        })?;
        if !parsed.contains(&ip) {
            parsed.push(ip);
        }
    }
    Ok(parsed)
}

fn validate_expression(expression: &str) -> Result<()> {
    if expression.trim().is_empty() {
        return Err(Error::validation("view expression cannot be empty"));
    }
    let mut depth: i32 = 0;
    for c in expression.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::validation(format!(
            "view expression has unbalanced parentheses: '{expression}'"
        )));
    }
    Ok(())
}
