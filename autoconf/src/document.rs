//! The autoconf document served by the remote endpoint.
//!
//! Maps keep the order in which keys appear in the payload so that every
//! derived list (bootstrap peers, router URLs) is emitted in document order.
use indexmap::IndexMap;
use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

pub const SYSTEM_AMINO_DHT: &str = "AminoDHT";
pub const SYSTEM_IPNI: &str = "IPNI";

/// Top-level keys of the flat document shape that predates `SystemRegistry`.
const LEGACY_FIELDS: &[&str] = &["Bootstrap", "DelegatedRouters", "DelegatedPublishers"];

#[derive(thiserror::Error, Debug)]
pub enum DocumentError {
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "legacy document shape with top-level {0:?} is not supported, expected SystemRegistry and DelegatedEndpoints"
    )]
    LegacyShape(String),

    #[error("missing Version")]
    MissingVersion,

    #[error("{field}: invalid multiaddr {value:?}: {reason}")]
    InvalidMultiaddr {
        field: String,
        value: String,
        reason: String,
    },

    #[error("{field}: invalid URL {value:?}: {reason}")]
    InvalidUrl {
        field: String,
        value: String,
        reason: String,
    },

    #[error("{field}: path {value:?} must start with /")]
    InvalidPath { field: String, value: String },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "Version", default)]
    pub version: i64,
    #[serde(rename = "Schema", default)]
    pub schema: i64,
    /// Seconds. Zero or negative means the client picks its own interval.
    #[serde(rename = "CacheTTL", default)]
    pub cache_ttl: i64,
    #[serde(rename = "SystemRegistry", default)]
    pub system_registry: IndexMap<String, SystemConfig>,
    #[serde(rename = "DNSResolvers", default)]
    pub dns_resolvers: IndexMap<String, Vec<String>>,
    #[serde(rename = "DelegatedEndpoints", default)]
    pub delegated_endpoints: IndexMap<String, EndpointConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemConfig {
    #[serde(rename = "URL", default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_config: Option<NativeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_config: Option<DelegatedConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NativeConfig {
    #[serde(default)]
    pub bootstrap: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DelegatedConfig {
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub write: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointConfig {
    #[serde(default)]
    pub systems: Vec<String>,
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub write: Vec<String>,
}

impl EndpointConfig {
    fn serves_any(&self, systems: &[&str]) -> bool {
        self.systems.iter().any(|s| systems.contains(&s.as_str()))
    }
}

impl Document {
    /// Parses a payload without validating it.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        let raw: Map<String, Value> = serde_json::from_slice(bytes)?;

        if let Some(field) = LEGACY_FIELDS.iter().find(|f| raw.contains_key(**f)) {
            return Err(DocumentError::LegacyShape(field.to_string()));
        }

        Ok(serde_json::from_value(Value::Object(raw))?)
    }

    /// Parses and validates a payload received from the network.
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        let document = Self::from_slice(bytes)?;
        document.validate()?;
        Ok(document)
    }

    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.version == 0 {
            return Err(DocumentError::MissingVersion);
        }

        for (name, system) in &self.system_registry {
            if let Some(native) = &system.native_config {
                for (i, addr) in native.bootstrap.iter().enumerate() {
                    if let Err(e) = addr.parse::<Multiaddr>() {
                        return Err(DocumentError::InvalidMultiaddr {
                            field: format!("SystemRegistry[{name}].NativeConfig.Bootstrap[{i}]"),
                            value: addr.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            if let Some(delegated) = &system.delegated_config {
                let field = format!("SystemRegistry[{name}].DelegatedConfig");
                validate_paths(&field, "Read", &delegated.read)?;
                validate_paths(&field, "Write", &delegated.write)?;
            }
        }

        for (domain, resolvers) in &self.dns_resolvers {
            for (i, resolver) in resolvers.iter().enumerate() {
                validate_http_url(&format!("DNSResolvers[{domain}][{i}]"), resolver)?;
            }
        }

        for (endpoint, config) in &self.delegated_endpoints {
            validate_http_url("DelegatedEndpoints", endpoint)?;
            let field = format!("DelegatedEndpoints[{endpoint}]");
            validate_paths(&field, "Read", &config.read)?;
            validate_paths(&field, "Write", &config.write)?;
        }

        Ok(())
    }

    /// Bootstrap peers of the given native systems, in registry order and
    /// without duplicates.
    pub fn bootstrap_peers(&self, native_systems: &[&str]) -> Vec<String> {
        let mut peers: Vec<String> = Vec::new();
        for system in native_systems {
            let Some(native) = self
                .system_registry
                .get(*system)
                .and_then(|s| s.native_config.as_ref())
            else {
                continue;
            };

            for peer in &native.bootstrap {
                if !peers.contains(peer) {
                    peers.push(peer.clone());
                }
            }
        }
        peers
    }

    /// Endpoints that do not serve any of the systems the node already runs
    /// natively.
    pub fn delegated_endpoints(&self, native_systems: &[&str]) -> IndexMap<String, EndpointConfig> {
        self.delegated_endpoints
            .iter()
            .filter(|(_, config)| !config.serves_any(native_systems))
            .map(|(url, config)| (url.clone(), config.clone()))
            .collect()
    }

    /// A copy where endpoint read and write paths are narrowed to `paths`.
    /// Endpoints left with no path at all are dropped.
    pub fn with_supported_paths_only(&self, paths: &[&str]) -> Document {
        let mut document = self.clone();
        document.delegated_endpoints = self
            .delegated_endpoints
            .iter()
            .filter_map(|(url, config)| {
                let keep = |list: &[String]| -> Vec<String> {
                    list.iter()
                        .filter(|p| paths.contains(&p.as_str()))
                        .cloned()
                        .collect()
                };
                let filtered = EndpointConfig {
                    systems: config.systems.clone(),
                    read: keep(&config.read),
                    write: keep(&config.write),
                };
                if filtered.read.is_empty() && filtered.write.is_empty() {
                    None
                } else {
                    Some((url.clone(), filtered))
                }
            })
            .collect();
        document
    }
}

fn validate_paths(field: &str, list: &str, paths: &[String]) -> Result<(), DocumentError> {
    for (i, path) in paths.iter().enumerate() {
        if !path.starts_with('/') {
            return Err(DocumentError::InvalidPath {
                field: format!("{field}.{list}[{i}]"),
                value: path.clone(),
            });
        }
    }
    Ok(())
}

/// Absolute http(s) URL with a host.
pub(crate) fn validate_http_url(field: &str, value: &str) -> Result<Url, DocumentError> {
    let invalid = |reason: String| DocumentError::InvalidUrl {
        field: field.to_string(),
        value: value.to_string(),
        reason,
    };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(invalid(format!("unsupported scheme {scheme:?}"))),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}
