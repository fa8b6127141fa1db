//! A single conditional fetch against the remote endpoint, and the cached
//! counterpart used when the network cannot be reached.
use crate::cache::{CacheDir, CacheError, Tokens};
use crate::client::Client;
use crate::document::Document;
use crate::error::AutoConfError;
use crate::metrics_defs::{CACHE_EVICTED, FETCH_DURATION, FETCH_NOT_MODIFIED, FETCH_OK};
use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT, ETAG, HeaderMap, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use url::Url;

#[derive(Clone, Debug)]
pub struct FetchResponse {
    pub document: Arc<Document>,
    /// When the server last confirmed the document, or the modification
    /// time of the cached payload it was loaded from.
    pub fetch_time: SystemTime,
    /// ETag, or Last-Modified when the server sent no ETag.
    pub version: String,
    /// True when no successful 200 response was received in this call.
    pub from_cache: bool,
    pub cache_age: Duration,
}

pub(crate) fn validate_fetch_url(url: &str) -> Result<Url, AutoConfError> {
    if url.is_empty() {
        return Err(AutoConfError::InvalidUrl {
            url: String::new(),
            reason: "empty URL".to_string(),
        });
    }

    let parsed = Url::parse(url).map_err(|e| AutoConfError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(AutoConfError::UnsupportedScheme(scheme.to_string())),
    }
}

/// Human readable age such as `45m`, `3.5h`, `2.0-day` or `1.3-week`.
pub fn format_cache_age(age: Duration) -> String {
    const HOUR: f64 = 3600.0;
    const DAY: f64 = 24.0 * HOUR;
    const WEEK: f64 = 7.0 * DAY;

    let secs = age.as_secs_f64();
    if secs < HOUR {
        format!("{:.0}m", secs / 60.0)
    } else if secs < DAY {
        format!("{:.1}h", secs / HOUR)
    } else if secs < WEEK {
        format!("{:.1}-day", secs / DAY)
    } else {
        format!("{:.1}-week", secs / WEEK)
    }
}

fn header_value(headers: &HeaderMap, name: HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// Reads the body, failing as soon as it grows past `limit` bytes.
async fn read_body_limited(
    mut response: reqwest::Response,
    limit: u64,
) -> Result<Vec<u8>, AutoConfError> {
    if response.content_length().is_some_and(|len| len > limit) {
        return Err(AutoConfError::ResponseTooLarge { limit });
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if (body.len() + chunk.len()) as u64 > limit {
            return Err(AutoConfError::ResponseTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

impl Client {
    pub(crate) async fn fetch_remote(
        &self,
        url: &Url,
        cache: &CacheDir,
    ) -> Result<FetchResponse, AutoConfError> {
        let tokens = cache.read_tokens();
        let mut request = self
            .http
            .get(url.clone())
            .header(ACCEPT, "application/json");

        if !tokens.etag.is_empty() {
            tracing::debug!(url = %url, etag = %tokens.etag, "revalidating autoconf");
            request = request.header(IF_NONE_MATCH, tokens.etag.as_str());
        } else if !tokens.last_modified.is_empty() {
            tracing::debug!(url = %url, last_modified = %tokens.last_modified, "revalidating autoconf");
            request = request.header(IF_MODIFIED_SINCE, tokens.last_modified.as_str());
        } else {
            tracing::debug!(url = %url, "fetching autoconf");
        }

        let started = Instant::now();
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_MODIFIED => {
                histogram!(FETCH_DURATION).record(started.elapsed().as_secs_f64());
                counter!(FETCH_NOT_MODIFIED).increment(1);
                tracing::debug!(url = %url, "autoconf not modified");
                return match self.cached_response(cache) {
                    Ok(cached) => {
                        let now = SystemTime::now();
                        if let Err(e) = cache.write_last_refresh(now) {
                            tracing::warn!(url = %url, "failed to record autoconf refresh time: {e}");
                        }
                        Ok(FetchResponse {
                            version: tokens.version(),
                            fetch_time: now,
                            cache_age: Duration::ZERO,
                            ..cached
                        })
                    }
                    Err(e) => {
                        // The sidecars outlived their payload; the next
                        // request has to be unconditional.
                        if let Err(clear_err) = cache.write_tokens(&Tokens::default()) {
                            tracing::warn!(url = %url, "failed to clear stale cache tokens: {clear_err}");
                        }
                        Err(e.into())
                    }
                };
            }
            status => return Err(AutoConfError::UnexpectedStatus(status)),
        }

        let new_tokens = Tokens {
            etag: header_value(response.headers(), ETAG),
            last_modified: header_value(response.headers(), LAST_MODIFIED),
        };

        let body = read_body_limited(response, self.max_response_size).await?;
        histogram!(FETCH_DURATION).record(started.elapsed().as_secs_f64());
        let document = Document::parse(&body)?;

        // Persisting is best effort: a valid document is returned even when
        // the cache cannot be written.
        let fetch_time = SystemTime::now();
        let persist = {
            let cache = cache.clone();
            let url = url.clone();
            let tokens = new_tokens.clone();
            let keep = self.cache_size;
            let version = document.version;
            tokio::task::spawn_blocking(move || {
                persist_payload(&cache, &url, &body, &tokens, fetch_time, keep, version)
            })
        };
        if let Err(e) = persist.await {
            tracing::warn!(url = %url, "autoconf cache update did not complete: {e}");
        }

        counter!(FETCH_OK).increment(1);
        Ok(FetchResponse {
            document: Arc::new(document),
            fetch_time,
            version: new_tokens.version(),
            from_cache: false,
            cache_age: Duration::ZERO,
        })
    }

    /// The newest cached payload as a response. Its age counts from the
    /// last time the server confirmed it, or from when it was written.
    pub(crate) fn cached_response(&self, cache: &CacheDir) -> Result<FetchResponse, CacheError> {
        let payload = cache.read_latest()?;
        let document =
            Document::from_slice(&payload.bytes).map_err(|source| CacheError::InvalidPayload {
                path: payload.path.clone(),
                source,
            })?;

        let fetch_time = cache
            .read_last_refresh()
            .map_or(payload.modified, |refreshed| refreshed.max(payload.modified));
        Ok(FetchResponse {
            document: Arc::new(document),
            fetch_time,
            version: cache.read_tokens().version(),
            from_cache: true,
            cache_age: fetch_time.elapsed().unwrap_or_default(),
        })
    }
}

/// Writes an accepted payload with its sidecars and trims old payloads.
/// Runs on the blocking pool.
fn persist_payload(
    cache: &CacheDir,
    url: &Url,
    body: &[u8],
    tokens: &Tokens,
    fetched_at: SystemTime,
    keep: usize,
    version: i64,
) {
    match cache.write_payload(body) {
        Ok(Some(path)) => tracing::info!(
            url = %url,
            version,
            path = %path.display(),
            "stored new autoconf payload"
        ),
        Ok(None) => tracing::debug!(url = %url, "autoconf payload unchanged"),
        Err(e) => tracing::warn!(url = %url, "failed to cache autoconf payload: {e}"),
    }

    // Empty tokens remove the sidecars, so the next request is unconditional.
    if let Err(e) = cache.write_tokens(tokens) {
        tracing::warn!(url = %url, "failed to store autoconf cache tokens: {e}");
    }
    if let Err(e) = cache.write_last_refresh(fetched_at) {
        tracing::warn!(url = %url, "failed to record autoconf refresh time: {e}");
    }

    match cache.evict(keep) {
        Ok(0) => {}
        Ok(removed) => counter!(CACHE_EVICTED).increment(removed as u64),
        Err(e) => tracing::warn!(url = %url, "failed to evict cached autoconf payloads: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cache_age() {
        assert_eq!(format_cache_age(Duration::from_secs(45 * 60)), "45m");
        assert_eq!(format_cache_age(Duration::from_secs(90 * 60)), "1.5h");
        assert_eq!(format_cache_age(Duration::from_secs(2 * 24 * 3600)), "2.0-day");
        assert_eq!(format_cache_age(Duration::from_secs(21 * 24 * 3600)), "3.0-week");
    }

    #[test]
    fn test_validate_fetch_url() {
        assert!(validate_fetch_url("https://conf.example.org/autoconf.json").is_ok());
        assert!(validate_fetch_url("http://127.0.0.1:8080/autoconf.json").is_ok());
        assert!(matches!(
            validate_fetch_url("file:///etc/passwd"),
            Err(AutoConfError::UnsupportedScheme(ref s)) if s == "file"
        ));
        assert!(matches!(
            validate_fetch_url(""),
            Err(AutoConfError::InvalidUrl { .. })
        ));
    }
}
