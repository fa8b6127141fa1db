use autoconf::{AutoConfError, UpdaterError};
use node_config::{ConfigError, ValidationError};

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    ServiceConfig(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    AutoConf(#[from] AutoConfError),

    #[error(transparent)]
    Updater(#[from] UpdaterError),

    #[error("invalid value: {0}")]
    Value(#[from] serde_json::Error),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("metrics setup failed: {0}")]
    Metrics(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
