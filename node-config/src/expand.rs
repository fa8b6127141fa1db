//! `"auto"` expansion of the node configuration.
//!
//! Four fields accept the placeholder. Each is described by an
//! [`AutoConfField`] variant so that full-config expansion and single-key
//! reads go through the same table.
use crate::config::Config;
use autoconf::expansion::{
    contains_auto, expand_bootstrap_peers, expand_delegated_publishers, expand_delegated_routers,
    expand_dns_resolvers,
};
use autoconf::routing::native_systems;
use autoconf::{AUTO_PLACEHOLDER, Client, Document};
use rand::Rng;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoConfField {
    Bootstrap,
    DnsResolvers,
    DelegatedRouters,
    DelegatedPublishers,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExpandedValue {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl ExpandedValue {
    pub fn into_json(self) -> Value {
        match self {
            ExpandedValue::List(items) => Value::from(items),
            ExpandedValue::Map(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ),
        }
    }
}

impl AutoConfField {
    pub const ALL: [AutoConfField; 4] = [
        AutoConfField::Bootstrap,
        AutoConfField::DnsResolvers,
        AutoConfField::DelegatedRouters,
        AutoConfField::DelegatedPublishers,
    ];

    /// Dotted key of the field in the config file.
    pub fn path(self) -> &'static str {
        match self {
            AutoConfField::Bootstrap => "Bootstrap",
            AutoConfField::DnsResolvers => "DNS.Resolvers",
            AutoConfField::DelegatedRouters => "Routing.DelegatedRouters",
            AutoConfField::DelegatedPublishers => "Ipns.DelegatedPublishers",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.path() == path)
    }

    pub fn contains_auto(self, config: &Config) -> bool {
        match self {
            AutoConfField::Bootstrap => contains_auto(&config.bootstrap),
            AutoConfField::DnsResolvers => config
                .dns
                .resolvers
                .as_ref()
                .is_some_and(|resolvers| resolvers.values().any(|v| v == AUTO_PLACEHOLDER)),
            AutoConfField::DelegatedRouters => contains_auto(&config.routing.delegated_routers),
            AutoConfField::DelegatedPublishers => contains_auto(&config.ipns.delegated_publishers),
        }
    }

    pub fn expand<R: Rng + ?Sized>(
        self,
        config: &Config,
        document: Option<&Document>,
        rng: &mut R,
    ) -> ExpandedValue {
        match self {
            AutoConfField::Bootstrap => {
                ExpandedValue::List(config.bootstrap_with_autoconf(document))
            }
            AutoConfField::DnsResolvers => {
                ExpandedValue::Map(config.dns_resolvers_with_autoconf(document, rng))
            }
            AutoConfField::DelegatedRouters => {
                ExpandedValue::List(config.delegated_routers_with_autoconf(document))
            }
            AutoConfField::DelegatedPublishers => {
                ExpandedValue::List(config.delegated_publishers_with_autoconf(document))
            }
        }
    }
}

impl Config {
    fn native_systems(&self) -> &'static [&'static str] {
        native_systems(self.routing.routing_type())
    }

    pub fn bootstrap_with_autoconf(&self, document: Option<&Document>) -> Vec<String> {
        expand_bootstrap_peers(&self.bootstrap, document, self.native_systems())
    }

    pub fn dns_resolvers_with_autoconf<R: Rng + ?Sized>(
        &self,
        document: Option<&Document>,
        rng: &mut R,
    ) -> BTreeMap<String, String> {
        expand_dns_resolvers(self.dns.resolvers.as_ref(), document, rng)
    }

    pub fn delegated_routers_with_autoconf(&self, document: Option<&Document>) -> Vec<String> {
        expand_delegated_routers(
            &self.routing.delegated_routers,
            document,
            self.native_systems(),
        )
    }

    pub fn delegated_publishers_with_autoconf(&self, document: Option<&Document>) -> Vec<String> {
        expand_delegated_publishers(&self.ipns.delegated_publishers, document)
    }

    /// Returns a copy of `raw`, the config as stored on disk, with the four
    /// expandable fields replaced by their expanded values. Fields absent
    /// from `raw` stay absent and everything else is left as is.
    pub fn expand_auto_values<R: Rng + ?Sized>(
        &self,
        raw: &Value,
        document: Option<&Document>,
        rng: &mut R,
    ) -> Value {
        let mut expanded = raw.clone();
        for field in AutoConfField::ALL {
            let slot = match field.path().split_once('.') {
                None => expanded.get_mut(field.path()),
                Some((section, key)) => expanded
                    .get_mut(section)
                    .and_then(|s| s.as_object_mut())
                    .and_then(|s| s.get_mut(key)),
            };
            if let Some(slot) = slot {
                *slot = field.expand(self, document, rng).into_json();
            }
        }
        expanded
    }
}

/// The document to expand against, or `None` when the subsystem is disabled
/// or has no URL. Never touches the network: memory, then disk, then the
/// built-in fallback.
pub fn resolve_document(client: &Client, config: &Config) -> Option<Arc<Document>> {
    if !config.auto_conf.enabled() {
        tracing::debug!("AutoConf disabled, expanding without a document");
        return None;
    }
    let url = config.auto_conf.url();
    if url.is_empty() {
        tracing::debug!("AutoConf.URL is empty, expanding without a document");
        return None;
    }
    Some(client.get_cached_or_fallback(url))
}
