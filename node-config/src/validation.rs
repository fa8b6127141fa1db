//! Checks run before a node starts with its configuration.
use crate::config::Config;
use crate::error::ValidationError;
use crate::expand::AutoConfField;
use autoconf::{AUTO_PLACEHOLDER, MAINNET_AUTOCONF_URL};
use std::path::Path;

pub const SWARM_KEY_FILE: &str = "swarm.key";
pub const FORCE_PNET_ENV: &str = "LIBP2P_FORCE_PNET";

/// True when the node runs on a private network: the repo holds a
/// `swarm.key`, or `LIBP2P_FORCE_PNET` is set to a truthy value.
pub fn private_network_marker(repo: &Path) -> bool {
    if repo.join(SWARM_KEY_FILE).exists() {
        return true;
    }
    std::env::var(FORCE_PNET_ENV).is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Expandable fields that still contain `"auto"`.
pub fn fields_with_auto(config: &Config) -> Vec<AutoConfField> {
    AutoConfField::ALL
        .into_iter()
        .filter(|field| field.contains_auto(config))
        .collect()
}

pub fn validate_startup(config: &Config, private_network: bool) -> Result<(), ValidationError> {
    let settings = &config.auto_conf;

    if !settings.enabled() {
        for field in fields_with_auto(config) {
            tracing::error!(
                field = field.path(),
                "{} contains \"auto\" but AutoConf.Enabled is false; the placeholder will be ignored",
                field.path()
            );
        }
        if config.bootstrap == [AUTO_PLACEHOLDER] {
            return Err(ValidationError::AutoBootstrapWhileDisabled);
        }
        return Ok(());
    }

    let url = settings.url();
    if url.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }

    settings
        .refresh_interval()
        .map_err(|e| ValidationError::InvalidSettings(e.to_string()))?;

    if url == MAINNET_AUTOCONF_URL && private_network {
        return Err(ValidationError::MainnetOnPrivateNetwork {
            url: url.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_with_auto_bootstrap() {
        let mut config = Config::with_auto_placeholders();
        config.auto_conf.enabled = Some(false);

        assert_eq!(fields_with_auto(&config), AutoConfField::ALL.to_vec());
        assert_eq!(
            validate_startup(&config, false),
            Err(ValidationError::AutoBootstrapWhileDisabled)
        );

        // Other fields only produce error logs.
        config.bootstrap = vec!["/ip4/1.2.3.4/tcp/4001/p2p/QmaCpDMGvV2BGHeYERUEnRQAwe3N8SzbUtfsmvsqQLuvuJ".to_string()];
        assert_eq!(validate_startup(&config, false), Ok(()));
    }

    #[test]
    fn test_enabled_checks() {
        let mut config = Config::with_auto_placeholders();
        assert_eq!(validate_startup(&config, false), Ok(()));

        assert_eq!(
            validate_startup(&config, true),
            Err(ValidationError::MainnetOnPrivateNetwork {
                url: MAINNET_AUTOCONF_URL.to_string()
            })
        );

        config.auto_conf.url = Some("https://conf.private.example/autoconf.json".to_string());
        assert_eq!(validate_startup(&config, true), Ok(()));

        config.auto_conf.url = Some(String::new());
        assert_eq!(validate_startup(&config, false), Err(ValidationError::EmptyUrl));

        config.auto_conf.url = None;
        config.auto_conf.refresh_interval = Some("100ms".to_string());
        assert!(matches!(
            validate_startup(&config, false),
            Err(ValidationError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_swarm_key_marker() {
        let repo = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join(SWARM_KEY_FILE), "/key/swarm/psk/1.0.0/").unwrap();
        assert!(private_network_marker(repo.path()));
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }
}
