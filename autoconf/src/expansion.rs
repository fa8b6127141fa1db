//! Replacement of `"auto"` placeholders with values taken from a document.
//!
//! Every function here is pure: the caller decides where the document comes
//! from and which systems the node runs natively.
use crate::AUTO_PLACEHOLDER;
use crate::document::Document;
use crate::routing::{SUPPORTED_READ_PATHS, SUPPORTED_WRITE_PATHS, build_endpoint_url};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::BTreeMap;

pub fn contains_auto<S: AsRef<str>>(values: &[S]) -> bool {
    values.iter().any(|v| v.as_ref() == AUTO_PLACEHOLDER)
}

/// Replaces the first `"auto"` with `replacement` and drops any later one.
/// With no replacement every `"auto"` is dropped. Other entries are kept as
/// they are, so a list without `"auto"` comes back unchanged.
pub fn expand_auto_slice(values: &[String], replacement: Option<&[String]>) -> Vec<String> {
    if !contains_auto(values) {
        return values.to_vec();
    }

    let mut expanded = Vec::with_capacity(values.len());
    let mut replaced = false;
    for value in values {
        if value != AUTO_PLACEHOLDER {
            expanded.push(value.clone());
            continue;
        }
        if replaced {
            continue;
        }
        replaced = true;
        for item in replacement.unwrap_or_default() {
            if !expanded.contains(item) {
                expanded.push(item.clone());
            }
        }
    }
    expanded
}

pub fn select_random<'a, R: Rng + ?Sized>(items: &'a [String], rng: &mut R) -> Option<&'a str> {
    items.choose(rng).map(String::as_str)
}

/// A list holding `"auto"` is also stripped of repeated peers, keeping the
/// first occurrence.
pub fn expand_bootstrap_peers(
    peers: &[String],
    document: Option<&Document>,
    native_systems: &[&str],
) -> Vec<String> {
    if !contains_auto(peers) {
        return peers.to_vec();
    }

    let replacement = document.map(|doc| doc.bootstrap_peers(native_systems));
    let mut expanded = Vec::new();
    for peer in expand_auto_slice(peers, replacement.as_deref()) {
        if !expanded.contains(&peer) {
            expanded.push(peer);
        }
    }
    expanded
}

/// Resolves `"auto"` resolvers to one random resolver from the document for
/// that domain. Document domains the user did not configure are added only
/// when the catch-all `"."` is `"auto"`. With no user map at all every
/// document domain is used.
pub fn expand_dns_resolvers<R: Rng + ?Sized>(
    resolvers: Option<&BTreeMap<String, String>>,
    document: Option<&Document>,
    rng: &mut R,
) -> BTreeMap<String, String> {
    let mut expanded = BTreeMap::new();

    let Some(resolvers) = resolvers else {
        if let Some(document) = document {
            for (domain, candidates) in &document.dns_resolvers {
                if let Some(choice) = select_random(candidates, rng) {
                    expanded.insert(domain.clone(), choice.to_string());
                }
            }
        }
        return expanded;
    };

    for (domain, resolver) in resolvers {
        if resolver != AUTO_PLACEHOLDER {
            expanded.insert(domain.clone(), resolver.clone());
            continue;
        }
        let candidates = document
            .and_then(|doc| doc.dns_resolvers.get(domain))
            .map(Vec::as_slice)
            .unwrap_or_default();
        if let Some(choice) = select_random(candidates, rng) {
            expanded.insert(domain.clone(), choice.to_string());
        }
    }

    let catch_all_auto = resolvers.get(".").is_some_and(|v| v == AUTO_PLACEHOLDER);
    if let Some(document) = document.filter(|_| catch_all_auto) {
        for (domain, candidates) in &document.dns_resolvers {
            if expanded.contains_key(domain) {
                continue;
            }
            if let Some(choice) = select_random(candidates, rng) {
                expanded.insert(domain.clone(), choice.to_string());
            }
        }
    }

    expanded
}

/// Router URLs for every endpoint that serves none of the native systems,
/// one per supported read path, in document order.
pub fn delegated_router_urls(document: &Document, native_systems: &[&str]) -> Vec<String> {
    document
        .delegated_endpoints(native_systems)
        .iter()
        .flat_map(|(base, endpoint)| {
            endpoint
                .read
                .iter()
                .filter(|p| SUPPORTED_READ_PATHS.contains(&p.as_str()))
                .map(move |p| build_endpoint_url(base, p))
        })
        .collect()
}

/// Publisher URLs for every endpoint accepting IPNS writes.
pub fn delegated_publisher_urls(document: &Document) -> Vec<String> {
    document
        .delegated_endpoints
        .iter()
        .flat_map(|(base, endpoint)| {
            endpoint
                .write
                .iter()
                .filter(|p| SUPPORTED_WRITE_PATHS.contains(&p.as_str()))
                .map(move |p| build_endpoint_url(base, p))
        })
        .collect()
}

pub fn expand_delegated_routers(
    routers: &[String],
    document: Option<&Document>,
    native_systems: &[&str],
) -> Vec<String> {
    let replacement = document.map(|doc| delegated_router_urls(doc, native_systems));
    expand_auto_slice(routers, replacement.as_deref())
}

pub fn expand_delegated_publishers(publishers: &[String], document: Option<&Document>) -> Vec<String> {
    let replacement = document.map(delegated_publisher_urls);
    expand_auto_slice(publishers, replacement.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SYSTEM_AMINO_DHT;
    use crate::fallback::mainnet_fallback;
    use crate::routing::native_systems;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn document() -> Document {
        Document::parse(
            br#"{
            "Version": 1,
            "SystemRegistry": {
                "AminoDHT": {"NativeConfig": {"Bootstrap": [
                    "/ip4/10.0.0.1/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
                    "/ip4/10.0.0.2/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ"
                ]}}
            },
            "DNSResolvers": {
                "eth.": ["https://a.example/dns-query", "https://b.example/dns-query"],
                "test.": ["https://c.example/dns-query"]
            },
            "DelegatedEndpoints": {
                "https://ipni.example": {
                    "Systems": ["IPNI"],
                    "Read": ["/routing/v1/providers", "/routing/v1/unsupported"],
                    "Write": []
                },
                "https://dht.example/": {
                    "Systems": ["AminoDHT", "IPNI"],
                    "Read": ["/routing/v1/providers", "/routing/v1/peers", "/routing/v1/ipns"],
                    "Write": ["/routing/v1/ipns"]
                }
            }
        }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_expand_auto_slice() {
        let replacement = strings(&["a", "b", "a"]);
        assert_eq!(
            expand_auto_slice(&strings(&["x", "auto", "auto", "y"]), Some(&replacement)),
            strings(&["x", "a", "b", "y"])
        );
        assert_eq!(
            expand_auto_slice(&strings(&["auto", "x"]), None),
            strings(&["x"])
        );
        let untouched = strings(&["x", "y", "x"]);
        assert_eq!(expand_auto_slice(&untouched, Some(&replacement)), untouched);
    }

    #[test]
    fn test_bootstrap_expansion() {
        let doc = document();
        let native = native_systems("auto");
        let user = strings(&[
            "auto",
            "/ip4/10.0.0.1/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
            "auto",
        ]);
        let expanded = expand_bootstrap_peers(&user, Some(&doc), native);
        assert_eq!(expanded, doc.bootstrap_peers(&[SYSTEM_AMINO_DHT]));
        assert!(!contains_auto(&expanded));

        // Expanding an already expanded list is a no-op.
        assert_eq!(
            expand_bootstrap_peers(&expanded, Some(&doc), native),
            expanded
        );

        assert!(expand_bootstrap_peers(&user, Some(&doc), native_systems("none")).len() == 1);
    }

    #[test]
    fn test_bootstrap_splices_between_static_peers() {
        let doc = Document::parse(
            br#"{
            "Version": 1,
            "SystemRegistry": {
                "AminoDHT": {"NativeConfig": {"Bootstrap": ["/dnsaddr/a.example/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ", "/dnsaddr/b.example/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ"]}}
            }
        }"#,
        )
        .unwrap();
        let user = strings(&[
            "/ip4/1.2.3.4/tcp/4001",
            "auto",
            "/ip4/5.6.7.8/tcp/4001",
        ]);

        assert_eq!(
            expand_bootstrap_peers(&user, Some(&doc), native_systems("auto")),
            strings(&[
                "/ip4/1.2.3.4/tcp/4001",
                "/dnsaddr/a.example/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
                "/dnsaddr/b.example/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
                "/ip4/5.6.7.8/tcp/4001",
            ])
        );
    }

    #[test]
    fn test_auto_free_lists_unchanged() {
        let doc = mainnet_fallback();
        let native = native_systems("auto");

        let peers = strings(&["/ip4/1.2.3.4/tcp/4001", "/ip4/1.2.3.4/tcp/4001"]);
        assert_eq!(expand_bootstrap_peers(&peers, Some(&doc), native), peers);

        let routers = strings(&["https://r.example/routing/v1/providers"; 2]);
        assert_eq!(expand_delegated_routers(&routers, Some(&doc), native), routers);

        let publishers = strings(&["https://p.example/routing/v1/ipns"; 2]);
        assert_eq!(expand_delegated_publishers(&publishers, Some(&doc)), publishers);
    }

    #[test]
    fn test_delegated_routers_filtering() {
        let doc = document();

        let routers = expand_delegated_routers(&strings(&["auto"]), Some(&doc), native_systems("auto"));
        assert_eq!(routers, strings(&["https://ipni.example/routing/v1/providers"]));

        let routers = expand_delegated_routers(&strings(&["auto"]), Some(&doc), native_systems("delegated"));
        assert_eq!(
            routers,
            strings(&[
                "https://ipni.example/routing/v1/providers",
                "https://dht.example/routing/v1/providers",
                "https://dht.example/routing/v1/peers",
                "https://dht.example/routing/v1/ipns",
            ])
        );
        for router in &routers {
            assert!(SUPPORTED_READ_PATHS.iter().any(|p| router.ends_with(p)));
        }
    }

    #[test]
    fn test_delegated_publishers() {
        let doc = document();
        assert_eq!(
            expand_delegated_publishers(&strings(&["auto", "https://mine.example/routing/v1/ipns"]), Some(&doc)),
            strings(&[
                "https://dht.example/routing/v1/ipns",
                "https://mine.example/routing/v1/ipns",
            ])
        );
    }

    fn resolvers(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_dns_resolvers() {
        let doc = document();
        let mut rng = StdRng::seed_from_u64(7);

        let user = resolvers(&[("eth.", "auto"), ("example.", "https://mine.example/dns-query")]);
        let expanded = expand_dns_resolvers(Some(&user), Some(&doc), &mut rng);
        assert!(doc.dns_resolvers["eth."].contains(&expanded["eth."]));
        assert_eq!(expanded["example."], "https://mine.example/dns-query");
        // Only a catch-all "auto" pulls in the other document domains.
        assert!(!expanded.contains_key("test."));
        assert_eq!(expanded.len(), 2);

        let no_auto = resolvers(&[("eth.", "https://mine.example")]);
        assert_eq!(expand_dns_resolvers(Some(&no_auto), Some(&doc), &mut rng), no_auto);

        let missing = resolvers(&[("other.", "auto")]);
        assert!(expand_dns_resolvers(Some(&missing), Some(&doc), &mut rng).is_empty());
        assert!(expand_dns_resolvers(Some(&missing), None, &mut rng).is_empty());
    }

    #[test]
    fn test_dns_catch_all_auto() {
        let doc = Document::parse(
            br#"{
            "Version": 1,
            "DNSResolvers": {
                ".": ["https://global.example/dns-query"],
                "eth.": ["https://a.example/dns-query"]
            }
        }"#,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let only_eth = resolvers(&[("eth.", "auto")]);
        let expanded = expand_dns_resolvers(Some(&only_eth), Some(&doc), &mut rng);
        assert!(!expanded.contains_key("."));
        assert_eq!(expanded["eth."], "https://a.example/dns-query");

        let catch_all = resolvers(&[(".", "auto"), ("eth.", "https://mine.example/dns-query")]);
        let expanded = expand_dns_resolvers(Some(&catch_all), Some(&doc), &mut rng);
        assert_eq!(expanded["."], "https://global.example/dns-query");
        assert_eq!(expanded["eth."], "https://mine.example/dns-query");

        let unset = expand_dns_resolvers(None, Some(&doc), &mut rng);
        assert_eq!(unset.len(), 2);
        assert_eq!(unset["."], "https://global.example/dns-query");
        assert!(expand_dns_resolvers(None, None, &mut rng).is_empty());

        // An explicitly empty map holds no "auto" and stays empty.
        assert!(expand_dns_resolvers(Some(&BTreeMap::new()), Some(&doc), &mut rng).is_empty());
    }

    #[test]
    fn test_fallback_expansion() {
        let doc = mainnet_fallback();
        let routers = expand_delegated_routers(&strings(&["auto"]), Some(&doc), native_systems("auto"));
        assert_eq!(routers, strings(&["https://cid.contact/routing/v1/providers"]));
        assert_eq!(
            expand_delegated_publishers(&strings(&["auto"]), Some(&doc)),
            strings(&["https://delegated-ipfs.dev/routing/v1/ipns"])
        );
    }
}
