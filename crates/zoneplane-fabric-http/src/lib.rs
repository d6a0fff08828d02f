// # HTTP Network Fabric
//
// `NetworkFabric` implementation that talks to the network-fabric service
// over HTTP.
//
// ## Behaviour
//
// - One HTTP request per call
// - No retries and no backoff: the control plane owns its retry budget
// - No caching: `CachingFabric` in zoneplane-core handles subnet caching
// - The bearer token never appears in logs or `Debug` output
//
// ## API Reference
//
// - Resolve subnet: GET `{base}/v1/subnets/{subnet_crn}`
//   -> `{"subnet_crn": "...", "vpc_crn": "..."}`
// - Reserve address: POST `{base}/v1/subnets/{subnet_crn}/reserved_ips`
//   -> `{"address": "10.240.0.7"}`
//
// ## Status mapping
//
// | Status    | Error                                  |
// |-----------|----------------------------------------|
// | 404       | `Validation` (unknown subnet)          |
// | 401, 403  | `Authorization`                        |
// | 429, 5xx  | `Fabric` (transient, retried upstream) |
// | other     | `Fabric`                               |

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use zoneplane_core::config::FabricConfig;
use zoneplane_core::model::VsiDescriptor;
use zoneplane_core::registry::BackendRegistry;
use zoneplane_core::traits::{FabricFactory, NetworkFabric};
use zoneplane_core::{Error, Result};

#[derive(Debug, Deserialize)]
struct SubnetResponse {
    vpc_crn: String,
}

#[derive(Debug, Deserialize)]
struct ReservedIpResponse {
    address: IpAddr,
}

/// Network fabric reached over HTTP
pub struct HttpFabric {
    base_url: Url,
    /// ⚠️ NEVER log this value
    api_token: String,
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for HttpFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFabric")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &"<REDACTED>")
            .finish()
    }
}

impl HttpFabric {
    /// Create a new HTTP fabric
    ///
    /// # Errors
    ///
    /// - `Error::Config`: empty token, unparsable base URL, or the HTTP
    ///   client could not be built
    pub fn new(base_url: &str, api_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Fabric API token cannot be empty"));
        }
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid fabric base URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!("Fabric base URL cannot be a base: {base_url}")));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            api_token,
            client,
        })
    }

    /// URL for `v1/subnets/{crn}[/suffix]`, with the CRN percent-encoded
    /// as a single path segment
    fn subnet_url(&self, subnet_crn: &str, suffix: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::config("Fabric base URL cannot be a base"))?;
            segments.pop_if_empty().extend(["v1", "subnets", subnet_crn]);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder, subnet_crn: &str) -> Result<reqwest::Response> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::fabric(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(map_status(status, subnet_crn, &error_text))
    }
}

/// Map a non-success status to the control-plane error taxonomy
pub fn map_status(status: StatusCode, subnet_crn: &str, body: &str) -> Error {
    match status.as_u16() {
        404 => Error::validation(format!("Subnet not found: {subnet_crn}")),
        401 | 403 => Error::unauthorized(format!(
            "Fabric rejected credentials or permissions. Status: {status}"
        )),
        429 => Error::fabric(format!("Fabric rate limit exceeded. Status: {status}")),
        500..=599 => Error::fabric(format!("Fabric server error (transient): {status} - {body}")),
        _ => Error::fabric(format!("Fabric request failed: {status} - {body}")),
    }
}

#[async_trait]
impl NetworkFabric for HttpFabric {
    async fn resolve_subnet(&self, subnet_crn: &str) -> Result<VsiDescriptor> {
        tracing::debug!("Resolving subnet {}", subnet_crn);
        let url = self.subnet_url(subnet_crn, None)?;
        let response = self.send(self.client.get(url), subnet_crn).await?;
        let body: SubnetResponse = response
            .json()
            .await
            .map_err(|e| Error::fabric(format!("Failed to parse subnet response: {e}")))?;
        Ok(VsiDescriptor {
            subnet_crn: subnet_crn.to_string(),
            vpc_crn: body.vpc_crn,
        })
    }

    async fn provision_dns_server_ip(&self, subnet_crn: &str) -> Result<IpAddr> {
        tracing::info!("Reserving DNS server address in subnet {}", subnet_crn);
        let url = self.subnet_url(subnet_crn, Some("reserved_ips"))?;
        let request = self
            .client
            .post(url)
            .json(&serde_json::json!({ "purpose": "dns_resolver" }));
        let response = self.send(request, subnet_crn).await?;
        let body: ReservedIpResponse = response
            .json()
            .await
            .map_err(|e| Error::fabric(format!("Failed to parse reserved IP response: {e}")))?;
        Ok(body.address)
    }

    fn fabric_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP fabrics
pub struct HttpFabricFactory;

impl FabricFactory for HttpFabricFactory {
    fn create(&self, config: &serde_json::Value) -> Result<Arc<dyn NetworkFabric>> {
        match serde_json::from_value::<FabricConfig>(config.clone())? {
            FabricConfig::Http {
                base_url,
                api_token,
                timeout_secs,
            } => Ok(Arc::new(HttpFabric::new(
                &base_url,
                api_token,
                Duration::from_secs(timeout_secs),
            )?)),
            _ => Err(Error::config("Invalid config for HTTP fabric")),
        }
    }
}

/// Register the HTTP fabric with the registry
///
/// Call during daemon initialization:
///
/// ```rust,ignore
/// let registry = BackendRegistry::with_builtin()?;
/// zoneplane_fabric_http::register(&registry)?;
/// ```
pub fn register(registry: &BackendRegistry) -> Result<()> {
    registry.register_fabric("http", Box::new(HttpFabricFactory))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBNET: &str = "crn:v1:bluemix:public:is:us-south-1:a/abc::subnet:0717-aaaa";

    fn fabric() -> HttpFabric {
        HttpFabric::new("https://fabric.example.com/api", "secret", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, SUBNET, ""),
            Error::Validation(_)
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, SUBNET, ""),
            Error::Authorization(_)
        ));
        let throttled = map_status(StatusCode::TOO_MANY_REQUESTS, SUBNET, "");
        assert!(throttled.is_retryable());
        assert!(map_status(StatusCode::BAD_GATEWAY, SUBNET, "upstream").is_retryable());
    }

    #[test]
    fn crn_is_a_single_path_segment() {
        let url = fabric().subnet_url(SUBNET, Some("reserved_ips")).unwrap();
        assert!(url.path().starts_with("/api/v1/subnets/crn:v1:"));
        assert!(url.path().contains("a%2Fabc"));
        assert!(url.path().ends_with("/reserved_ips"));
    }

    #[test]
    fn token_is_redacted() {
        let debug = format!("{:?}", fabric());
        assert!(debug.contains("<REDACTED>"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn factory_rejects_other_configs() {
        let config = serde_json::to_value(FabricConfig::Static).unwrap();
        assert!(HttpFabricFactory.create(&config).is_err());

        let config = serde_json::to_value(FabricConfig::Http {
            base_url: "https://fabric.example.com".into(),
            api_token: "t".into(),
            timeout_secs: 10,
        })
        .unwrap();
        let fabric = HttpFabricFactory.create(&config).unwrap();
        assert_eq!(fabric.fabric_name(), "http");
    }

    #[tokio::test]
    async fn unreachable_fabric_is_transient() {
        // Port 9 (discard) is closed on test hosts; the connect fails fast.
        let fabric =
            HttpFabric::new("http://127.0.0.1:9", "secret", Duration::from_secs(2)).unwrap();
        let err = tokio_test::assert_err!(fabric.resolve_subnet(SUBNET).await);
        assert!(err.is_retryable());
    }

    #[test]
    fn registers_under_http() {
        let registry = BackendRegistry::with_builtin().unwrap();
        register(&registry).unwrap();
        assert!(registry.has_fabric("http"));
    }
}
