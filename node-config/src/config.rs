//! The node configuration file, limited to the sections that take part in
//! `"auto"` expansion. Every other key is carried in `extra` so that
//! re-serialising a loaded config leaves it untouched.
use crate::duration::parse_duration;
use crate::error::ConfigError;
use autoconf::routing::DEFAULT_ROUTING_TYPE;
use autoconf::{AUTO_PLACEHOLDER, DEFAULT_REFRESH_INTERVAL, MAINNET_AUTOCONF_URL};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Shortest accepted `AutoConf.RefreshInterval`.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Treats an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "AutoConfSection::is_unset")]
    pub auto_conf: AutoConfSection,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bootstrap: Vec<String>,
    #[serde(rename = "DNS", default, deserialize_with = "null_as_default")]
    pub dns: Dns,
    #[serde(default, deserialize_with = "null_as_default")]
    pub routing: Routing,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ipns: Ipns,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AutoConfSection {
    #[serde(rename = "URL", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<String>,
    #[serde(
        rename = "TLSInsecureSkipVerify",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tls_insecure_skip_verify: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AutoConfSection {
    fn is_unset(&self) -> bool {
        *self == AutoConfSection::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or(MAINNET_AUTOCONF_URL)
    }

    pub fn tls_insecure_skip_verify(&self) -> bool {
        self.tls_insecure_skip_verify.unwrap_or(false)
    }

    pub fn refresh_interval(&self) -> Result<Duration, ConfigError> {
        let Some(raw) = self.refresh_interval.as_deref() else {
            return Ok(DEFAULT_REFRESH_INTERVAL);
        };

        let interval = parse_duration(raw).map_err(|source| ConfigError::InvalidRefreshInterval {
            value: raw.to_string(),
            source,
        })?;
        if interval < MIN_REFRESH_INTERVAL {
            return Err(ConfigError::RefreshIntervalTooShort(raw.to_string()));
        }
        Ok(interval)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dns {
    /// `None` when the key is missing or null, which differs from an empty
    /// map during expansion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolvers: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Routing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delegated_routers: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Routing {
    pub fn routing_type(&self) -> &str {
        match self.r#type.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_ROUTING_TYPE,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipns {
    #[serde(default, deserialize_with = "null_as_default")]
    pub delegated_publishers: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Config {
    /// A configuration that takes every expandable value from autoconf.
    pub fn with_auto_placeholders() -> Self {
        let auto = || vec![AUTO_PLACEHOLDER.to_string()];
        Config {
            bootstrap: auto(),
            dns: Dns {
                resolvers: Some(BTreeMap::from([(
                    ".".to_string(),
                    AUTO_PLACEHOLDER.to_string(),
                )])),
                ..Default::default()
            },
            routing: Routing {
                delegated_routers: auto(),
                ..Default::default()
            },
            ipns: Ipns {
                delegated_publishers: auto(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
