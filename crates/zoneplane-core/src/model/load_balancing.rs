// # Global Load Balancing Model
//
// Health-check monitors, origin pools and load balancers.
//
// ## Monitor kinds
//
// The kind-specific settings of a monitor live in [`MonitorCheck`], an
// internally tagged variant keyed by `type`. HTTP and HTTPS share
// [`HttpCheck`]; TCP carries nothing beyond the common port/interval
// settings, so HTTP fields on a TCP monitor are unrepresentable.
//
// ## Changing a monitor's type
//
// `MonitorUpdate` may switch `type`. The rules applied by
// [`Monitor::apply_update`]:
//
// - HTTP <-> HTTPS keeps the HTTP settings, then revalidates them
//   (`allow_insecure` must be cleared when moving to HTTP)
// - HTTP(S) -> TCP drops the HTTP settings; supplying any in the same
//   update is rejected
// - TCP -> HTTP(S) starts from the HTTP defaults (`/`, `GET`, `200`)
//   overlaid with whatever the update supplies
// - the port follows the new kind's default only when the update has no
//   port and the old port was the old kind's default

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::Timestamp;
use crate::codec::name;
use crate::error::{Error, Result};

pub const DEFAULT_MONITOR_INTERVAL: u32 = 60;
pub const DEFAULT_MONITOR_RETRIES: u32 = 1;
pub const DEFAULT_MONITOR_TIMEOUT: u32 = 5;
pub const DEFAULT_LB_TTL: u32 = 120;
const LB_TTL_RANGE: std::ops::RangeInclusive<u32> = 30..=86_400;
const MONITOR_INTERVAL_RANGE: std::ops::RangeInclusive<u32> = 5..=3_600;
const MONITOR_RETRIES_RANGE: std::ops::RangeInclusive<u32> = 0..=5;
const MONITOR_TIMEOUT_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitorType {
    Http,
    Https,
    Tcp,
}

impl MonitorType {
    pub fn default_port(&self) -> Option<u16> {
        match self {
            MonitorType::Http => Some(80),
            MonitorType::Https => Some(443),
            MonitorType::Tcp => None,
        }
    }

    fn is_http(&self) -> bool {
        matches!(self, MonitorType::Http | MonitorType::Https)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorHeader {
    pub name: String,
    pub value: Vec<String>,
}

/// Settings shared by HTTP and HTTPS monitors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCheck {
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default = "default_expected_codes")]
    pub expected_codes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<MonitorHeader>,
    #[serde(default)]
    pub allow_insecure: bool,
}

impl Default for HttpCheck {
    fn default() -> Self {
        Self {
            path: default_path(),
            method: HttpMethod::Get,
            expected_codes: default_expected_codes(),
            expected_body: None,
            headers: Vec::new(),
            allow_insecure: false,
        }
    }
}

fn default_path() -> String {
    "/".to_string()
}

fn default_expected_codes() -> String {
    "200".to_string()
}

/// Kind-specific monitor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum MonitorCheck {
    Http(HttpCheck),
    Https(HttpCheck),
    Tcp,
}

impl MonitorCheck {
    pub fn monitor_type(&self) -> MonitorType {
        match self {
            MonitorCheck::Http(_) => MonitorType::Http,
            MonitorCheck::Https(_) => MonitorType::Https,
            MonitorCheck::Tcp => MonitorType::Tcp,
        }
    }

    pub fn http(&self) -> Option<&HttpCheck> {
        match self {
            MonitorCheck::Http(check) | MonitorCheck::Https(check) => Some(check),
            MonitorCheck::Tcp => None,
        }
    }

    fn from_parts(monitor_type: MonitorType, check: HttpCheck) -> Self {
        match monitor_type {
            MonitorType::Http => MonitorCheck::Http(check),
            MonitorType::Https => MonitorCheck::Https(check),
            MonitorType::Tcp => MonitorCheck::Tcp,
        }
    }

    fn validate(&self) -> Result<()> {
        let Some(check) = self.http() else {
            return Ok(());
        };
        if !check.path.starts_with('/') {
            return Err(Error::validation(format!(
                "monitor path must start with '/', got '{}'",
                check.path
            )));
        }
        validate_expected_codes(&check.expected_codes)?;
        if check.allow_insecure && self.monitor_type() != MonitorType::Https {
            return Err(Error::validation("allow_insecure is only valid for HTTPS monitors"));
        }
        if let Some(header) = check.headers.iter().find(|h| h.name.trim().is_empty()) {
            return Err(Error::validation(format!(
                "monitor header names cannot be empty (values {:?})",
                header.value
            )));
        }
        Ok(())
    }
}

/// Accepts a single status code (`200`) or a class (`2xx`)
pub fn validate_expected_codes(codes: &str) -> Result<()> {
    let bytes = codes.as_bytes();
    let valid = match bytes {
        [b'1'..=b'5', b'x', b'x'] | [b'1'..=b'5', b'0'..=b'9', b'0'..=b'9'] => true,
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "expected_codes must be a status code like '200' or a class like '2xx', got '{codes}'"
        )))
    }
}

/// Health-check monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: String,
    pub instance_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub check: MonitorCheck,
    pub port: u16,
    pub interval: u32,
    pub retries: u32,
    pub timeout: u32,
    pub created_on: Timestamp,
    pub modified_on: Timestamp,
}

impl Monitor {
    pub fn monitor_type(&self) -> MonitorType {
        self.check.monitor_type()
    }

    /// Build a monitor from a creation request
    pub fn from_spec(
        id: String,
        instance_id: String,
        spec: MonitorSpec,
        now: Timestamp,
    ) -> Result<Self> {
        let name = required_name(&spec.name, "monitor")?;
        let monitor_type = spec.monitor_type;
        let check = if monitor_type.is_http() {
            MonitorCheck::from_parts(monitor_type, spec.http.overlay(HttpCheck::default()))
        } else {
            spec.http.reject_for_tcp()?;
            MonitorCheck::Tcp
        };
        let port = spec
            .port
            .or(monitor_type.default_port())
            .ok_or_else(|| Error::validation("TCP monitors require an explicit port"))?;

        let monitor = Self {
            id,
            instance_id,
            name,
            description: spec.description.unwrap_or_default(),
            check,
            port,
            interval: spec.interval.unwrap_or(DEFAULT_MONITOR_INTERVAL),
            retries: spec.retries.unwrap_or(DEFAULT_MONITOR_RETRIES),
            timeout: spec.timeout.unwrap_or(DEFAULT_MONITOR_TIMEOUT),
            created_on: now,
            modified_on: now,
        };
        monitor.validate()?;
        Ok(monitor)
    }

    /// Apply an update; `self` is untouched on error
    pub fn apply_update(&mut self, update: MonitorUpdate, now: Timestamp) -> Result<()> {
        let mut next = self.clone();
        let old_type = self.monitor_type();
        let new_type = update.monitor_type.unwrap_or(old_type);

        next.check = match (self.check.http(), new_type.is_http()) {
            (Some(current), true) => {
                MonitorCheck::from_parts(new_type, update.http.overlay(current.clone()))
            }
            (None, true) => {
                MonitorCheck::from_parts(new_type, update.http.overlay(HttpCheck::default()))
            }
            (_, false) => {
                update.http.reject_for_tcp()?;
                MonitorCheck::Tcp
            }
        };

        next.port = match update.port {
            Some(port) => port,
            None if old_type != new_type && old_type.default_port() == Some(self.port) => {
                new_type.default_port().unwrap_or(self.port)
            }
            None => self.port,
        };

        if let Some(name) = update.name {
            next.name = required_name(&name, "monitor")?;
        }
        if let Some(description) = update.description {
            next.description = description;
        }
        if let Some(interval) = update.interval {
            next.interval = interval;
        }
        if let Some(retries) = update.retries {
            next.retries = retries;
        }
        if let Some(timeout) = update.timeout {
            next.timeout = timeout;
        }
        next.modified_on = now;
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        check_range(self.interval, &MONITOR_INTERVAL_RANGE, "interval")?;
        check_range(self.retries, &MONITOR_RETRIES_RANGE, "retries")?;
        check_range(self.timeout, &MONITOR_TIMEOUT_RANGE, "timeout")?;
        if self.timeout >= self.interval {
            return Err(Error::validation(format!(
                "monitor timeout ({}s) must be less than interval ({}s)",
                self.timeout, self.interval
            )));
        }
        if self.port == 0 {
            return Err(Error::validation("monitor port must be between 1 and 65535"));
        }
        self.check.validate()
    }
}

/// HTTP settings supplied on a create or update, all optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCheckFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_codes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<MonitorHeader>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_insecure: Option<bool>,
}

impl HttpCheckFields {
    fn overlay(self, base: HttpCheck) -> HttpCheck {
        HttpCheck {
            path: self.path.unwrap_or(base.path),
            method: self.method.unwrap_or(base.method),
            expected_codes: self.expected_codes.unwrap_or(base.expected_codes),
            expected_body: self.expected_body.or(base.expected_body),
            headers: self.headers.unwrap_or(base.headers),
            allow_insecure: self.allow_insecure.unwrap_or(base.allow_insecure),
        }
    }

    fn reject_for_tcp(&self) -> Result<()> {
        if *self == Self::default() {
            Ok(())
        } else {
            Err(Error::validation("HTTP settings are not valid on a TCP monitor"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: MonitorType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(flatten)]
    pub http: HttpCheckFields,
}

impl MonitorSpec {
    pub fn new(name: impl Into<String>, monitor_type: MonitorType) -> Self {
        Self {
            name: name.into(),
            monitor_type,
            description: None,
            port: None,
            interval: None,
            retries: None,
            timeout: None,
            http: HttpCheckFields::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.http.path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub monitor_type: Option<MonitorType>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(flatten)]
    pub http: HttpCheckFields,
}

/// Health of a single origin as last reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

/// Aggregate pool health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolHealth {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub address: String,
    pub enabled: bool,
    #[serde(default)]
    pub health: HealthState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginSpec {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl OriginSpec {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            description: None,
            enabled: None,
        }
    }
}

/// Build origins, keeping the health of origins that survive by name
pub fn build_origins(specs: Vec<OriginSpec>, previous: &[Origin]) -> Result<Vec<Origin>> {
    if specs.is_empty() {
        return Err(Error::validation("a pool requires at least one origin"));
    }
    let mut origins: Vec<Origin> = Vec::with_capacity(specs.len());
    for spec in specs {
        let origin_name = required_name(&spec.name, "origin")?;
        if origins.iter().any(|o| o.name == origin_name) {
            return Err(Error::validation(format!("duplicate origin name '{origin_name}'")));
        }
        let address = spec.address.trim().to_string();
        if address.parse::<IpAddr>().is_err() {
            name::validate_target(&address).map_err(|_| {
                Error::validation(format!(
                    "origin '{origin_name}' address must be an IP address or hostname, got '{address}'"
                ))
            })?;
        }
        let carried = previous
            .iter()
            .find(|o| o.name == origin_name && o.address == address);
        origins.push(Origin {
            name: origin_name,
            description: spec.description.unwrap_or_default(),
            address,
            enabled: spec.enabled.unwrap_or(true),
            health: carried.map(|o| o.health).unwrap_or_default(),
            health_failure_reason: carried.and_then(|o| o.health_failure_reason.clone()),
        });
    }
    Ok(origins)
}

/// VSI used to run health checks from a subnet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VsiDescriptor {
    pub subnet_crn: String,
    pub vpc_crn: String,
}

/// Origin pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub instance_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub healthy_origins_threshold: u32,
    pub origins: Vec<Origin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck_region: Option<String>,
    #[serde(default)]
    pub healthcheck_subnets: Vec<String>,
    #[serde(default)]
    pub healthcheck_vsis: Vec<VsiDescriptor>,
    #[serde(default)]
    pub health: PoolHealth,
    pub created_on: Timestamp,
    pub modified_on: Timestamp,
}

impl Pool {
    /// Validate invariants that span fields
    pub fn validate(&self) -> Result<()> {
        let origins = self.origins.len() as u32;
        if self.healthy_origins_threshold == 0 || self.healthy_origins_threshold > origins {
            return Err(Error::validation(format!(
                "healthy_origins_threshold must be between 1 and the number of origins ({origins}), got {}",
                self.healthy_origins_threshold
            )));
        }
        if !self.healthcheck_subnets.is_empty() && self.healthcheck_region.is_none() {
            return Err(Error::validation(
                "healthcheck_region is required when healthcheck_subnets are set",
            ));
        }
        Ok(())
    }

    /// Recompute aggregate health from the enabled origins
    pub fn recompute_health(&mut self) {
        let enabled: Vec<&Origin> = self.origins.iter().filter(|o| o.enabled).collect();
        let healthy = enabled
            .iter()
            .filter(|o| o.health == HealthState::Healthy)
            .count() as u32;
        self.health = if enabled.is_empty() {
            PoolHealth::Critical
        } else if enabled.iter().all(|o| o.health == HealthState::Unknown) {
            PoolHealth::Unknown
        } else if healthy as usize == enabled.len() {
            PoolHealth::Healthy
        } else if healthy >= self.healthy_origins_threshold {
            PoolHealth::Degraded
        } else {
            PoolHealth::Critical
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub name: String,
    pub origins: Vec<OriginSpec>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub healthy_origins_threshold: Option<u32>,
    #[serde(default)]
    pub monitor: Option<String>,
    #[serde(default)]
    pub healthcheck_region: Option<String>,
    #[serde(default)]
    pub healthcheck_subnets: Vec<String>,
}

impl PoolSpec {
    pub fn new(name: impl Into<String>, origins: Vec<OriginSpec>) -> Self {
        Self {
            name: name.into(),
            origins,
            description: None,
            enabled: None,
            healthy_origins_threshold: None,
            monitor: None,
            healthcheck_region: None,
            healthcheck_subnets: Vec::new(),
        }
    }

    pub fn with_monitor(mut self, monitor_id: impl Into<String>) -> Self {
        self.monitor = Some(monitor_id.into());
        self
    }

    pub fn with_healthcheck(mut self, region: impl Into<String>, subnets: Vec<String>) -> Self {
        self.healthcheck_region = Some(region.into());
        self.healthcheck_subnets = subnets;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub healthy_origins_threshold: Option<u32>,
    #[serde(default)]
    pub origins: Option<Vec<OriginSpec>>,
    #[serde(default)]
    pub monitor: Option<String>,
    #[serde(default)]
    pub healthcheck_region: Option<String>,
    #[serde(default)]
    pub healthcheck_subnets: Option<Vec<String>>,
}

/// Load balancer served under a zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub zone_id: String,
    pub instance_id: String,
    /// Absolute name inside the zone
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub ttl: u32,
    pub fallback_pool: String,
    pub default_pools: Vec<String>,
    pub created_on: Timestamp,
    pub modified_on: Timestamp,
}

impl LoadBalancer {
    pub fn references_pool(&self, pool_id: &str) -> bool {
        self.fallback_pool == pool_id || self.default_pools.iter().any(|p| p == pool_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub name: String,
    pub fallback_pool: String,
    pub default_pools: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub ttl: Option<u32>,
}

impl LoadBalancerSpec {
    pub fn new(
        name: impl Into<String>,
        fallback_pool: impl Into<String>,
        default_pools: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            fallback_pool: fallback_pool.into(),
            default_pools,
            description: None,
            enabled: None,
            ttl: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub fallback_pool: Option<String>,
    #[serde(default)]
    pub default_pools: Option<Vec<String>>,
}

/// Validate a load-balancer TTL or apply the default
pub fn resolve_lb_ttl(ttl: Option<u32>) -> Result<u32> {
    let ttl = ttl.unwrap_or(DEFAULT_LB_TTL);
    check_range(ttl, &LB_TTL_RANGE, "load balancer ttl")?;
    Ok(ttl)
}

/// Default pools must be non-empty and free of duplicates
pub fn validate_default_pools(pools: &[String]) -> Result<()> {
    if pools.is_empty() {
        return Err(Error::validation("default_pools cannot be empty"));
    }
    for (i, pool) in pools.iter().enumerate() {
        if pools[..i].contains(pool) {
            return Err(Error::validation(format!("pool '{pool}' listed twice in default_pools")));
        }
    }
    Ok(())
}

fn check_range(value: u32, range: &std::ops::RangeInclusive<u32>, field: &str) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{field} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        )))
    }
}

pub(crate) fn required_name(name: &str, what: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(Error::validation(format!("{what} name cannot be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}
