use crate::cache::CacheError;
use crate::document::DocumentError;
use reqwest::StatusCode;

/// Coarse classification of [`AutoConfError`], used for logging and for
/// callers deciding whether a retry can help.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Protocol,
    Cache,
    Network,
    Cancelled,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Cache => "cache",
            ErrorKind::Network => "network",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AutoConfError {
    #[error("invalid autoconf URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme {0:?}, only http and https are allowed")]
    UnsupportedScheme(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status: {0}")]
    UnexpectedStatus(StatusCode),

    #[error("response body exceeds the {limit} byte limit")]
    ResponseTooLarge { limit: u64 },

    #[error("invalid autoconf document: {0}")]
    Document(#[from] DocumentError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("failed to fetch autoconf ({fetch}) and no cached copy is usable ({cache})")]
    Unavailable {
        fetch: Box<AutoConfError>,
        cache: CacheError,
    },

    #[error("autoconf fetch cancelled")]
    Cancelled,
}

impl AutoConfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AutoConfError::InvalidUrl { .. } | AutoConfError::UnsupportedScheme(_) => {
                ErrorKind::Configuration
            }
            AutoConfError::Http(e) if e.is_builder() => ErrorKind::Configuration,
            AutoConfError::Http(_) => ErrorKind::Network,
            AutoConfError::UnexpectedStatus(_)
            | AutoConfError::ResponseTooLarge { .. }
            | AutoConfError::Document(_) => ErrorKind::Protocol,
            AutoConfError::Cache(_) | AutoConfError::Unavailable { .. } => ErrorKind::Cache,
            AutoConfError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(
            AutoConfError::UnsupportedScheme("ftp".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            AutoConfError::UnexpectedStatus(StatusCode::BAD_GATEWAY).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            AutoConfError::Document(DocumentError::MissingVersion).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(AutoConfError::Cancelled.kind(), ErrorKind::Cancelled);
    }
}
