//! YAML service configuration of the `autoconf` binary. Every section is
//! optional; an absent file means defaults throughout.
use autoconf::ClientConfig;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

fn default_metrics_prefix() -> String {
    "autoconf".to_string()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    /// `EnvFilter` directives. `RUST_LOG` is used when unset.
    pub filter: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

impl ServiceConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load service config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse service config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            logging:
                sentry_dsn: https://key@sentry.example.com/1
                filter: autoconf=debug
            client:
                user_agent: my-node/1.0
                timeout_secs: 10
            "#;
        let tmp = write_tmp_file(yaml);
        let config = ServiceConfig::from_file(tmp.path()).expect("load config");

        let metrics = config.metrics.expect("metrics config");
        assert_eq!(metrics.statsd_port, 8125);
        assert_eq!(metrics.prefix, "autoconf");
        assert_eq!(config.logging.filter.as_deref(), Some("autoconf=debug"));
        assert_eq!(config.client.user_agent, "my-node/1.0");
        assert_eq!(config.client.timeout_secs, 10);
        assert_eq!(config.client.cache_size, ClientConfig::default().cache_size);
    }

    #[test]
    fn empty_sections() {
        let tmp = write_tmp_file("client: {}\n");
        let config = ServiceConfig::from_file(tmp.path()).expect("load config");
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn invalid_config() {
        let tmp = write_tmp_file("metrics:\n    statsd_host: localhost\n");
        assert!(matches!(
            ServiceConfig::from_file(tmp.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
