//! Delegated routing helpers: routing-type to native-system mapping, endpoint
//! URL construction and capability grouping of routing URLs.
use crate::document::SYSTEM_AMINO_DHT;
use indexmap::IndexMap;
use url::Url;

pub const ROUTING_V1_PROVIDERS_PATH: &str = "/routing/v1/providers";
pub const ROUTING_V1_PEERS_PATH: &str = "/routing/v1/peers";
pub const ROUTING_V1_IPNS_PATH: &str = "/routing/v1/ipns";

/// Read paths a node knows how to consume, in emission order.
pub const SUPPORTED_READ_PATHS: &[&str] = &[
    ROUTING_V1_PROVIDERS_PATH,
    ROUTING_V1_PEERS_PATH,
    ROUTING_V1_IPNS_PATH,
];

/// Write paths a node knows how to publish to.
pub const SUPPORTED_WRITE_PATHS: &[&str] = &[ROUTING_V1_IPNS_PATH];

pub const DEFAULT_ROUTING_TYPE: &str = "auto";

const AMINO_DHT_ONLY: &[&str] = &[SYSTEM_AMINO_DHT];

/// Systems a node runs itself for the given `Routing.Type`. Endpoints serving
/// only these systems are redundant and excluded from delegation.
pub fn native_systems(routing_type: &str) -> &'static [&'static str] {
    match routing_type {
        "dht" | "dhtclient" | "dhtserver" | "auto" | "autoclient" => AMINO_DHT_ONLY,
        _ => &[],
    }
}

/// Joins a base URL and a path, trimming trailing slashes of the base.
pub fn build_endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RoutingUrlError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported routing path {path:?} in {url:?}")]
    UnsupportedPath { url: String, path: String },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EndpointCapabilities {
    pub providers: bool,
    pub peers: bool,
    pub ipns_get: bool,
    pub ipns_put: bool,
}

impl EndpointCapabilities {
    pub fn is_empty(&self) -> bool {
        !(self.providers || self.peers || self.ipns_get || self.ipns_put)
    }

    pub fn merge(&mut self, other: EndpointCapabilities) {
        self.providers |= other.providers;
        self.peers |= other.peers;
        self.ipns_get |= other.ipns_get;
        self.ipns_put |= other.ipns_put;
    }

    /// Human readable list, e.g. `providers, ipns-get`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.providers {
            parts.push("providers");
        }
        if self.peers {
            parts.push("peers");
        }
        if self.ipns_get {
            parts.push("ipns-get");
        }
        if self.ipns_put {
            parts.push("ipns-put");
        }
        parts.join(", ")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoutingEndpoint {
    pub base_url: String,
    pub capabilities: EndpointCapabilities,
}

/// Splits a routing URL into its origin and path. A bare host yields an
/// empty path.
fn split_routing_url(endpoint: &str) -> Result<(String, String), RoutingUrlError> {
    let invalid = |reason: String| RoutingUrlError::InvalidUrl {
        url: endpoint.to_string(),
        reason,
    };

    let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid("expected an http or https URL with a host".to_string()));
    }

    let base_url = url.origin().ascii_serialization();
    let path = url.path().trim_end_matches('/').to_string();
    Ok((base_url, path))
}

/// Works out what a routing URL can be used for. A bare host is assumed to
/// serve every supported path, a URL with a path only that path.
pub fn determine_known_capabilities(
    endpoint: &str,
    supports_read: bool,
    supports_write: bool,
) -> Result<RoutingEndpoint, RoutingUrlError> {
    let (base_url, path) = split_routing_url(endpoint)?;

    let mut capabilities = EndpointCapabilities::default();
    match path.as_str() {
        "" => {
            capabilities.providers = supports_read;
            capabilities.peers = supports_read;
            capabilities.ipns_get = supports_read;
            capabilities.ipns_put = supports_write;
        }
        ROUTING_V1_PROVIDERS_PATH => capabilities.providers = supports_read,
        ROUTING_V1_PEERS_PATH => capabilities.peers = supports_read,
        ROUTING_V1_IPNS_PATH => {
            capabilities.ipns_get = supports_read;
            capabilities.ipns_put = supports_write;
        }
        _ => {
            return Err(RoutingUrlError::UnsupportedPath {
                url: endpoint.to_string(),
                path,
            });
        }
    }

    Ok(RoutingEndpoint {
        base_url,
        capabilities,
    })
}

/// Groups routing URLs by base URL, merging the capabilities of every URL
/// that shares one. Unparsable or unsupported URLs are skipped with a warning.
pub fn group_by_known_capabilities(
    endpoints: &[String],
    supports_read: bool,
    supports_write: bool,
) -> IndexMap<String, EndpointCapabilities> {
    let mut grouped: IndexMap<String, EndpointCapabilities> = IndexMap::new();
    for endpoint in endpoints {
        match determine_known_capabilities(endpoint, supports_read, supports_write) {
            Ok(parsed) => grouped
                .entry(parsed.base_url)
                .or_default()
                .merge(parsed.capabilities),
            Err(e) => tracing::warn!("skipping routing endpoint: {e}"),
        }
    }
    grouped.retain(|_, caps| !caps.is_empty());
    grouped
}

/// Distinct base URLs of the given routing URLs, in first-seen order.
pub fn extract_unique_base_urls(endpoints: &[String]) -> Vec<String> {
    let mut bases: Vec<String> = Vec::new();
    for endpoint in endpoints {
        match split_routing_url(endpoint) {
            Ok((base, _)) if !bases.contains(&base) => bases.push(base),
            Ok(_) => {}
            Err(e) => tracing::warn!("skipping routing endpoint: {e}"),
        }
    }
    bases
}
