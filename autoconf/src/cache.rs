//! On-disk cache of fetched autoconf payloads.
//!
//! Each remote host gets its own directory under `<root>/autoconf/`, holding
//! one `autoconfig-<unix-seconds>.json` file per distinct payload, the
//! `.etag` / `.last-modified` sidecars used for conditional requests and
//! `.last-refresh`, the time the server last confirmed the newest payload.
use crate::document::DocumentError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

pub const CACHE_SUBDIR: &str = "autoconf";

const PAYLOAD_PREFIX: &str = "autoconfig-";
const PAYLOAD_SUFFIX: &str = ".json";
const ETAG_FILE: &str = ".etag";
const LAST_MODIFIED_FILE: &str = ".last-modified";
const LAST_REFRESH_FILE: &str = ".last-refresh";

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to persist cache file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("no cached payload in {}", .0.display())]
    Empty(PathBuf),

    #[error("cached payload {} is invalid: {source}", path.display())]
    InvalidPayload {
        path: PathBuf,
        source: DocumentError,
    },

    #[error("URL {0:?} has no host to key the cache by")]
    NoHost(String),
}

/// Makes a host usable as a directory name. The port, if any, stays part of
/// the key so that two services on one host do not share a cache.
pub fn sanitize_host(host: &str) -> String {
    let mut sanitized = String::with_capacity(host.len());
    let mut dots = 0;

    let flush_dots = |out: &mut String, dots: &mut usize| {
        match *dots {
            0 => {}
            1 => out.push('.'),
            _ => out.push('_'),
        }
        *dots = 0;
    };

    for c in host.chars() {
        if c == '.' {
            dots += 1;
            continue;
        }
        flush_dots(&mut sanitized, &mut dots);
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            sanitized.push(c);
        } else {
            sanitized.push('_');
        }
    }
    flush_dots(&mut sanitized, &mut dots);
    sanitized
}

/// The ETag and Last-Modified values stored next to the payloads. An empty
/// string means the value is unknown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tokens {
    pub etag: String,
    pub last_modified: String,
}

impl Tokens {
    pub fn is_empty(&self) -> bool {
        self.etag.is_empty() && self.last_modified.is_empty()
    }

    /// The value reported as the payload version: the ETag when known,
    /// otherwise Last-Modified.
    pub fn version(&self) -> String {
        if self.etag.is_empty() {
            self.last_modified.clone()
        } else {
            self.etag.clone()
        }
    }
}

#[derive(Debug)]
pub struct CachedPayload {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub modified: SystemTime,
}

#[derive(Clone, Debug)]
pub struct CacheDir {
    path: PathBuf,
}

impl CacheDir {
    pub fn locate(root: &Path, remote_url: &Url) -> Result<Self, CacheError> {
        let host = match (remote_url.host_str(), remote_url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(CacheError::NoHost(remote_url.to_string())),
        };

        Ok(CacheDir {
            path: root.join(CACHE_SUBDIR).join(sanitize_host(&host)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Payload files with their embedded timestamps, newest first. A missing
    /// directory is an empty cache.
    fn entries(&self) -> Result<Vec<(u64, PathBuf)>, CacheError> {
        let dir = match fs::read_dir(&self.path) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry?;
            let name = entry.file_name();
            let Some(timestamp) = name
                .to_str()
                .and_then(|n| n.strip_prefix(PAYLOAD_PREFIX))
                .and_then(|n| n.strip_suffix(PAYLOAD_SUFFIX))
                .and_then(|ts| ts.parse::<u64>().ok())
            else {
                continue;
            };
            entries.push((timestamp, entry.path()));
        }

        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries)
    }

    pub fn list_payloads(&self) -> Result<Vec<PathBuf>, CacheError> {
        Ok(self.entries()?.into_iter().map(|(_, path)| path).collect())
    }

    pub fn read_latest(&self) -> Result<CachedPayload, CacheError> {
        let Some((_, path)) = self.entries()?.into_iter().next() else {
            return Err(CacheError::Empty(self.path.clone()));
        };

        let bytes = fs::read(&path)?;
        let modified = fs::metadata(&path)?.modified()?;
        Ok(CachedPayload {
            path,
            bytes,
            modified,
        })
    }

    /// Stores `bytes` as the newest payload. Returns `None` when they are
    /// identical to the newest payload already on disk.
    pub fn write_payload(&self, bytes: &[u8]) -> Result<Option<PathBuf>, CacheError> {
        let entries = self.entries()?;
        if let Some((_, newest)) = entries.first() {
            match fs::read(newest) {
                Ok(existing) if existing == bytes => return Ok(None),
                Ok(_) => {}
                Err(e) => tracing::debug!(
                    path = %newest.display(),
                    "could not read newest cached payload for comparison: {e}"
                ),
            }
        }

        self.ensure_dir()?;

        let now = unix_now();
        let timestamp = match entries.first() {
            Some((newest, _)) if *newest >= now => newest + 1,
            _ => now,
        };
        let target = self
            .path
            .join(format!("{PAYLOAD_PREFIX}{timestamp}{PAYLOAD_SUFFIX}"));

        self.write_file(&target, bytes)?;
        Ok(Some(target))
    }

    /// Keeps the newest `keep` payloads and deletes the rest. Returns how many
    /// files were removed.
    pub fn evict(&self, keep: usize) -> Result<usize, CacheError> {
        let mut removed = 0;
        for (_, path) in self.entries()?.into_iter().skip(keep) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "evicted cached autoconf payload");
                    removed += 1;
                }
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    "failed to evict cached autoconf payload: {e}"
                ),
            }
        }
        Ok(removed)
    }

    pub fn read_tokens(&self) -> Tokens {
        let read = |name: &str| {
            fs::read_to_string(self.path.join(name))
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };

        Tokens {
            etag: read(ETAG_FILE),
            last_modified: read(LAST_MODIFIED_FILE),
        }
    }

    /// Overwrites both sidecars. An empty token removes its file.
    pub fn write_tokens(&self, tokens: &Tokens) -> Result<(), CacheError> {
        self.ensure_dir()?;
        for (name, value) in [
            (ETAG_FILE, &tokens.etag),
            (LAST_MODIFIED_FILE, &tokens.last_modified),
        ] {
            let path = self.path.join(name);
            if value.is_empty() {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            } else {
                self.write_file(&path, value.as_bytes())?;
            }
        }
        Ok(())
    }

    /// When a 200 or 304 response last confirmed the cached payload.
    pub fn read_last_refresh(&self) -> Option<SystemTime> {
        let raw = fs::read_to_string(self.path.join(LAST_REFRESH_FILE)).ok()?;
        let secs = raw.trim().parse::<u64>().ok()?;
        Some(UNIX_EPOCH + Duration::from_secs(secs))
    }

    pub fn write_last_refresh(&self, at: SystemTime) -> Result<(), CacheError> {
        self.ensure_dir()?;
        let secs = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.write_file(&self.path.join(LAST_REFRESH_FILE), secs.to_string().as_bytes())
    }

    fn ensure_dir(&self) -> Result<(), CacheError> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }
        builder.create(&self.path)?;
        Ok(())
    }

    /// Writes through a temporary file in the same directory and renames it
    /// into place, so readers see either the old or the new content.
    fn write_file(&self, target: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&self.path)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
        }
        tmp.persist(target)?;
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
