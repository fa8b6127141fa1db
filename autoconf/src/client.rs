use crate::DEFAULT_REFRESH_INTERVAL;
use crate::cache::{CacheDir, CacheError};
use crate::document::Document;
use crate::error::AutoConfError;
use crate::fallback::mainnet_fallback;
use crate::fetch::{FetchResponse, format_cache_age, validate_fetch_url};
use crate::metrics_defs::{CACHE_FALLBACK, FALLBACK_DOCUMENT, FETCH_FAILURE};
use crate::updater::effective_refresh_interval;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use shared::counter;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_CACHE_SIZE: usize = 3;
pub const DEFAULT_MAX_RESPONSE_SIZE: u64 = 2 * 1024 * 1024;
pub const DEFAULT_USER_AGENT: &str = concat!("autoconf/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Number of payload files kept per host.
    pub cache_size: usize,
    pub max_response_size: u64,
    pub tls_insecure_skip_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            cache_size: DEFAULT_CACHE_SIZE,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            tls_insecure_skip_verify: false,
        }
    }
}

/// Fetches autoconf documents and keeps them in memory and on disk.
///
/// A single client is meant to be shared (behind an `Arc`) by every reader in
/// the process: the HTTP connection pool and the per-URL memory cache live
/// here, so repeated config reads never go back to the network.
pub struct Client {
    pub(crate) http: reqwest::Client,
    pub(crate) cache_root: PathBuf,
    pub(crate) cache_size: usize,
    pub(crate) max_response_size: u64,
    refresh_interval: Duration,
    fallback: fn() -> Document,
    memory: RwLock<HashMap<String, Arc<Document>>>,
    warmed: Mutex<HashSet<String>>,
    warm_lock: tokio::sync::Mutex<()>,
}

impl Client {
    pub fn new(cache_root: impl Into<PathBuf>, config: ClientConfig) -> Result<Self, AutoConfError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent);

        if config.tls_insecure_skip_verify {
            tracing::warn!(
                "TLS certificate verification is disabled for autoconf fetches, use only for testing"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Client {
            http: builder.build()?,
            cache_root: cache_root.into(),
            cache_size: config.cache_size,
            max_response_size: config.max_response_size,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            fallback: mainnet_fallback,
            memory: RwLock::new(HashMap::new()),
            warmed: Mutex::new(HashSet::new()),
            warm_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Replaces the document used when nothing else is available.
    pub fn with_fallback(mut self, fallback: fn() -> Document) -> Self {
        self.fallback = fallback;
        self
    }

    /// How long a cached payload is served by [`Client::get`] without asking
    /// the server. Zero revalidates on every call.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn cache_dir(&self, url: &Url) -> Result<CacheDir, CacheError> {
        CacheDir::locate(&self.cache_root, url)
    }

    /// The document for `url`. A cached payload younger than the refresh
    /// interval, shortened by its `CacheTTL`, is returned without a request.
    /// Otherwise behaves like [`Client::refresh`].
    pub async fn get(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, AutoConfError> {
        if cancel.is_cancelled() {
            return Err(AutoConfError::Cancelled);
        }
        let url = validate_fetch_url(url)?;
        let cache = self.cache_dir(&url)?;

        if let Some(response) = self.fresh_cached(&cache) {
            tracing::debug!(
                url = %url,
                age = %format_cache_age(response.cache_age),
                "cached autoconf is fresh, not fetching"
            );
            self.remember(&url, &response.document);
            return Ok(response);
        }

        self.revalidate(&url, &cache, cancel).await
    }

    /// Asks the server for the document, revalidating against the cache. On
    /// any failure other than cancellation or a bad URL the newest cached
    /// payload is returned instead.
    pub async fn refresh(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, AutoConfError> {
        let url = validate_fetch_url(url)?;
        let cache = self.cache_dir(&url)?;
        self.revalidate(&url, &cache, cancel).await
    }

    async fn revalidate(
        &self,
        url: &Url,
        cache: &CacheDir,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, AutoConfError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AutoConfError::Cancelled),
            result = self.fetch_remote(url, cache) => result,
        };

        let fetch_err = match result {
            Ok(response) => {
                self.remember(url, &response.document);
                return Ok(response);
            }
            Err(e) => e,
        };

        counter!(FETCH_FAILURE, "kind" => fetch_err.kind().as_str()).increment(1);
        tracing::warn!(url = %url, "failed to fetch autoconf: {fetch_err}");

        match self.cached_response(cache) {
            Ok(response) => {
                counter!(CACHE_FALLBACK).increment(1);
                tracing::warn!(
                    url = %url,
                    "using cached autoconf ({} old) due to fetch failure",
                    format_cache_age(response.cache_age)
                );
                self.remember(url, &response.document);
                Ok(response)
            }
            Err(cache_err) => Err(AutoConfError::Unavailable {
                fetch: Box::new(fetch_err),
                cache: cache_err,
            }),
        }
    }

    fn fresh_cached(&self, cache: &CacheDir) -> Option<FetchResponse> {
        if self.refresh_interval.is_zero() {
            return None;
        }
        let cached = self.cached_response(cache).ok()?;
        let interval = effective_refresh_interval(self.refresh_interval, cached.document.cache_ttl);
        (cached.cache_age < interval).then_some(cached)
    }

    /// The document for `url` without any network access: memory first, then
    /// the newest payload on disk.
    pub fn get_cached_only(&self, url: &str) -> Result<Arc<Document>, AutoConfError> {
        let url = validate_fetch_url(url)?;
        if let Some(document) = self.remembered(url.as_str()) {
            return Ok(document);
        }

        let cache = self.cache_dir(&url)?;
        let response = self.cached_response(&cache)?;
        self.remember(&url, &response.document);
        Ok(response.document)
    }

    /// Like [`Client::get`] but never fails: the hardcoded fallback document is
    /// returned when neither the network nor the cache can help.
    pub async fn get_with_fallback_defaults(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Arc<Document> {
        match self.get(url, cancel).await {
            Ok(response) => response.document,
            Err(e) => {
                tracing::error!(url = %url, "no autoconf available, using fallback defaults: {e}");
                self.fallback_document()
            }
        }
    }

    /// Synchronous counterpart of [`Client::get_with_fallback_defaults`] that
    /// only looks at memory and disk.
    pub fn get_cached_or_fallback(&self, url: &str) -> Arc<Document> {
        match self.get_cached_only(url) {
            Ok(document) => document,
            Err(e) => {
                tracing::debug!(url = %url, "no cached autoconf, using fallback defaults: {e}");
                self.fallback_document()
            }
        }
    }

    /// Returns the memoized document, performing at most one network fetch
    /// per URL for the lifetime of the client.
    pub async fn get_memoized(&self, url: &str, cancel: &CancellationToken) -> Arc<Document> {
        let key = validate_fetch_url(url)
            .map(String::from)
            .unwrap_or_else(|_| url.to_string());
        if let Some(document) = self.remembered(&key) {
            return document;
        }

        let _guard = self.warm_lock.lock().await;
        if let Some(document) = self.remembered(&key) {
            return document;
        }

        let first_attempt = self.warmed.lock().insert(key);
        if first_attempt {
            self.get_with_fallback_defaults(url, cancel).await
        } else {
            self.get_cached_or_fallback(url)
        }
    }

    pub fn has_cached(&self, url: &str) -> bool {
        let Ok(url) = validate_fetch_url(url) else {
            return false;
        };
        if self.memory.read().contains_key(url.as_str()) {
            return true;
        }
        self.cache_dir(&url)
            .and_then(|cache| cache.list_payloads())
            .is_ok_and(|payloads| !payloads.is_empty())
    }

    fn fallback_document(&self) -> Arc<Document> {
        counter!(FALLBACK_DOCUMENT).increment(1);
        Arc::new((self.fallback)())
    }

    fn remembered(&self, key: &str) -> Option<Arc<Document>> {
        self.memory.read().get(key).cloned()
    }

    fn remember(&self, url: &Url, document: &Arc<Document>) {
        self.memory
            .write()
            .insert(url.as_str().to_string(), document.clone());
    }
}
