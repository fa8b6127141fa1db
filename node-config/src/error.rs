use crate::duration::DurationError;
use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to persist config file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("no config file at {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid AutoConf.RefreshInterval {value:?}: {source}")]
    InvalidRefreshInterval {
        value: String,
        source: DurationError,
    },

    #[error("AutoConf.RefreshInterval {0:?} is shorter than the 1s minimum")]
    RefreshIntervalTooShort(String),

    #[error("key {0:?} not found")]
    KeyNotFound(String),

    #[error("cannot set key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error(
        "--expand-auto cannot be used when writing config values: it is a read-only view of the expanded configuration, the stored config keeps \"auto\""
    )]
    ExpandAutoWrite,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error(
        "Bootstrap is set to [\"auto\"] but AutoConf.Enabled is false; enable AutoConf or replace \"auto\" with concrete bootstrap peers"
    )]
    AutoBootstrapWhileDisabled,

    #[error("AutoConf.Enabled is true but AutoConf.URL is empty; set a URL or disable AutoConf")]
    EmptyUrl,

    #[error(
        "AutoConf.URL points to the public mainnet ({url}) but this node runs on a private network; set AutoConf.Enabled to false or point AutoConf.URL to an autoconf instance for the private network"
    )]
    MainnetOnPrivateNetwork { url: String },

    #[error("invalid AutoConf settings: {0}")]
    InvalidSettings(String),
}
