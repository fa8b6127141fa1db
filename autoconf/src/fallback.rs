//! Last-resort document for the public mainnet, used when neither the network
//! nor the on-disk cache can provide one.
use crate::document::{
    DelegatedConfig, Document, EndpointConfig, NativeConfig, SYSTEM_AMINO_DHT, SYSTEM_IPNI,
    SystemConfig,
};
use crate::routing::{
    ROUTING_V1_IPNS_PATH, ROUTING_V1_PEERS_PATH, ROUTING_V1_PROVIDERS_PATH,
};
use indexmap::IndexMap;
use std::sync::LazyLock;

pub const MAINNET_BOOTSTRAP_PEERS: &[&str] = &[
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
    "/dnsaddr/bootstrap.libp2p.io/p2p/QmcZf59bWwK5XFi76CZX8cbJ4BhTzzA3gU1ZjYZcYW3dwt",
    "/ip4/104.131.131.82/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
    "/ip4/104.131.131.82/udp/4001/quic-v1/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ",
];

const ETH_RESOLVERS: &[&str] = &[
    "https://dns.eth.limo/dns-query",
    "https://dns.eth.link/dns-query",
];

const IPNI_URL: &str = "https://cid.contact";
const DELEGATED_IPFS_DEV_URL: &str = "https://delegated-ipfs.dev";

static MAINNET: LazyLock<Document> = LazyLock::new(build_mainnet);

/// The hardcoded mainnet document.
pub fn mainnet_fallback() -> Document {
    MAINNET.clone()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn build_mainnet() -> Document {
    let all_read = [
        ROUTING_V1_PROVIDERS_PATH,
        ROUTING_V1_PEERS_PATH,
        ROUTING_V1_IPNS_PATH,
    ];

    let mut system_registry = IndexMap::new();
    system_registry.insert(
        SYSTEM_AMINO_DHT.to_string(),
        SystemConfig {
            url: "https://github.com/ipfs/specs/pull/497".to_string(),
            description: "Public DHT swarm that implements the IPFS Kademlia DHT specification under protocol identifier /ipfs/kad/1.0.0".to_string(),
            native_config: Some(NativeConfig {
                bootstrap: strings(MAINNET_BOOTSTRAP_PEERS),
            }),
            delegated_config: Some(DelegatedConfig {
                read: strings(&all_read),
                write: strings(&[ROUTING_V1_IPNS_PATH]),
            }),
        },
    );
    system_registry.insert(
        SYSTEM_IPNI.to_string(),
        SystemConfig {
            url: IPNI_URL.to_string(),
            description: "Network Indexer - content routing database for large storage providers".to_string(),
            native_config: None,
            delegated_config: Some(DelegatedConfig {
                read: strings(&[ROUTING_V1_PROVIDERS_PATH]),
                write: Vec::new(),
            }),
        },
    );

    let mut dns_resolvers = IndexMap::new();
    dns_resolvers.insert("eth.".to_string(), strings(ETH_RESOLVERS));

    let mut delegated_endpoints = IndexMap::new();
    delegated_endpoints.insert(
        IPNI_URL.to_string(),
        EndpointConfig {
            systems: strings(&[SYSTEM_IPNI]),
            read: strings(&[ROUTING_V1_PROVIDERS_PATH]),
            write: Vec::new(),
        },
    );
    delegated_endpoints.insert(
        DELEGATED_IPFS_DEV_URL.to_string(),
        EndpointConfig {
            systems: strings(&[SYSTEM_AMINO_DHT, SYSTEM_IPNI]),
            read: strings(&all_read),
            write: strings(&[ROUTING_V1_IPNS_PATH]),
        },
    );

    Document {
        version: 0,
        schema: 1,
        cache_ttl: 0,
        system_registry,
        dns_resolvers,
        delegated_endpoints,
    }
}
