//! Client for remotely published network configuration ("autoconf").
//!
//! A [`Client`] fetches the JSON document with conditional requests, keeps the
//! last few payloads on disk and falls back to them (and finally to a built-in
//! mainnet document) when the endpoint is unreachable. [`BackgroundUpdater`]
//! refreshes it periodically, and [`expansion`] turns `"auto"` placeholders in
//! a node's configuration into concrete values taken from the document.
use std::time::Duration;

pub mod cache;
pub mod client;
pub mod document;
pub mod error;
pub mod expansion;
mod fallback;
mod fetch;
pub mod metrics_defs;
pub mod routing;
pub mod updater;

#[cfg(test)]
mod testutils;

pub use client::{Client, ClientConfig};
pub use document::{Document, DocumentError, SYSTEM_AMINO_DHT, SYSTEM_IPNI};
pub use error::{AutoConfError, ErrorKind};
pub use fallback::{MAINNET_BOOTSTRAP_PEERS, mainnet_fallback};
pub use fetch::{FetchResponse, format_cache_age};
pub use updater::{BackgroundUpdater, UpdaterError};

/// Sentinel value in user configuration replaced by document values.
pub const AUTO_PLACEHOLDER: &str = "auto";

pub const MAINNET_AUTOCONF_URL: &str = "https://conf.ipfs-mainnet.org/autoconf.json";

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
