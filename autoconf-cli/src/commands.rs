use crate::errors::CliError;
use autoconf::routing::group_by_known_capabilities;
use autoconf::{
    BackgroundUpdater, Client, ClientConfig, DEFAULT_REFRESH_INTERVAL, format_cache_age,
};
use node_config::{Config, Repo, private_network_marker, resolve_document, validate_startup};
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builds the client for a repo. Payloads are cached under the repo
/// directory. The node config sets how long they stay fresh and can turn off
/// TLS verification.
pub fn build_client(
    repo: &Repo,
    config: &Config,
    mut client_config: ClientConfig,
) -> Result<Client, CliError> {
    client_config.tls_insecure_skip_verify |= config.auto_conf.tls_insecure_skip_verify();
    // An invalid interval is reported by startup validation.
    let refresh_interval = config
        .auto_conf
        .refresh_interval()
        .unwrap_or(DEFAULT_REFRESH_INTERVAL);
    Ok(Client::new(repo.root(), client_config)?.with_refresh_interval(refresh_interval))
}

fn print_json(out: &mut impl Write, value: &Value) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn config_show(
    repo: &Repo,
    client: &Client,
    expand_auto: bool,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let value = if expand_auto {
        repo.expanded_value(client)?
    } else {
        repo.read_value()?
    };
    print_json(out, &value)
}

pub fn config_get(
    repo: &Repo,
    client: &Client,
    key: &str,
    expand_auto: bool,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let value = if expand_auto {
        repo.get_expanded(key, client)?
    } else {
        repo.get(key)?
    };
    match value {
        Value::String(s) => writeln!(out, "{s}")?,
        other => print_json(out, &other)?,
    }
    Ok(())
}

/// Without `json` the value is stored as a plain string.
pub fn config_set(
    repo: &Repo,
    key: &str,
    raw: &str,
    json: bool,
    expand_auto: bool,
) -> Result<(), CliError> {
    let value = if json && !expand_auto {
        serde_json::from_str(raw)?
    } else {
        Value::String(raw.to_string())
    };
    repo.set(key, value, expand_auto)?;
    tracing::info!(key, "config updated");
    Ok(())
}

pub async fn fetch(
    client: &Client,
    url: &str,
    cached_only: bool,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let document = if cached_only {
        client.get_cached_only(url)?
    } else {
        let response = client.get(url, cancel).await?;
        writeln!(out, "# url: {url}")?;
        writeln!(out, "# version: {}", response.version)?;
        if response.from_cache {
            writeln!(
                out,
                "# served from cache, {} old",
                format_cache_age(response.cache_age)
            )?;
        }
        response.document
    };
    print_json(out, &serde_json::to_value(document.as_ref())?)
}

/// Lists the delegated routing endpoints the node would use, grouped by base
/// URL with their capabilities.
pub fn routers(client: &Client, config: &Config, out: &mut impl Write) -> Result<(), CliError> {
    let document = resolve_document(client, config);
    let routers = config.delegated_routers_with_autoconf(document.as_deref());
    let publishers = config.delegated_publishers_with_autoconf(document.as_deref());

    for (base_url, caps) in group_by_known_capabilities(&routers, true, false) {
        writeln!(out, "{base_url}\t{}", caps.describe())?;
    }
    for (base_url, caps) in group_by_known_capabilities(&publishers, false, true) {
        writeln!(out, "{base_url}\t{}", caps.describe())?;
    }
    Ok(())
}

/// Validates the config, warms the cache and keeps it fresh until `shutdown`
/// resolves.
pub async fn daemon(
    repo: &Repo,
    config: &Config,
    client: Arc<Client>,
    cancel: CancellationToken,
    shutdown: impl Future<Output = ()>,
) -> Result<(), CliError> {
    if let Err(e) = validate_startup(config, private_network_marker(repo.root())) {
        tracing::error!("startup validation failed: {e}");
        return Err(e.into());
    }

    let settings = &config.auto_conf;
    if !settings.enabled() {
        tracing::info!("AutoConf disabled, nothing to refresh");
        return Ok(());
    }
    let url = settings.url().to_string();
    let interval = settings.refresh_interval()?;

    let document = client.get_memoized(&url, &cancel).await;
    tracing::info!(%url, version = document.version, "autoconf ready");

    let mut updater = BackgroundUpdater::new(client, url, interval)
        .on_version_change(|old, new, url| {
            tracing::info!(
                url,
                old_version = old,
                new_version = new,
                "autoconf document changed; restart the node to apply it"
            );
        })
        .on_update_success(|response| {
            tracing::debug!(
                version = %response.version,
                from_cache = response.from_cache,
                "autoconf refreshed"
            );
        })
        .on_update_error(|err, attempt, delay| {
            tracing::warn!(
                attempt,
                retry_in = %format_cache_age(delay),
                "autoconf refresh failed: {err}"
            );
        });
    updater.start(&cancel)?;

    tokio::select! {
        _ = shutdown => tracing::info!("shutting down"),
        _ = cancel.cancelled() => {}
    }
    updater.stop().await;
    cancel.cancel();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoconf::{MAINNET_BOOTSTRAP_PEERS, mainnet_fallback};
    use node_config::ConfigError;
    use serde_json::json;

    fn setup(config: Value) -> (tempfile::TempDir, Repo, Client) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repo::open(dir.path());
        std::fs::write(repo.config_path(), config.to_string()).unwrap();
        let client = build_client(&repo, &repo.load().unwrap(), ClientConfig::default()).unwrap();
        (dir, repo, client)
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_show_expanded() {
        let (_dir, repo, client) = setup(json!({ "Bootstrap": ["auto"] }));

        let mut buf = Vec::new();
        config_show(&repo, &client, true, &mut buf).unwrap();
        let shown: Value = serde_json::from_str(&output(buf)).unwrap();
        assert_eq!(shown["Bootstrap"], json!(MAINNET_BOOTSTRAP_PEERS));

        let mut buf = Vec::new();
        config_show(&repo, &client, false, &mut buf).unwrap();
        let shown: Value = serde_json::from_str(&output(buf)).unwrap();
        assert_eq!(shown["Bootstrap"], json!(["auto"]));
    }

    #[test]
    fn test_get_and_set() {
        let (_dir, repo, client) = setup(json!({ "Routing": { "Type": "auto" } }));

        config_set(&repo, "Routing.Type", "dhtclient", false, false).unwrap();
        config_set(&repo, "Ipns.DelegatedPublishers", r#"["auto"]"#, true, false).unwrap();

        let mut buf = Vec::new();
        config_get(&repo, &client, "Routing.Type", false, &mut buf).unwrap();
        assert_eq!(output(buf), "dhtclient\n");

        let mut buf = Vec::new();
        config_get(&repo, &client, "Ipns.DelegatedPublishers", true, &mut buf).unwrap();
        let publishers: Value = serde_json::from_str(&output(buf)).unwrap();
        assert_eq!(
            publishers,
            json!(["https://delegated-ipfs.dev/routing/v1/ipns"])
        );
    }

    #[test]
    fn test_set_with_expand_auto_fails() {
        let (_dir, repo, _client) = setup(json!({ "Bootstrap": ["auto"] }));
        let before = std::fs::read(repo.config_path()).unwrap();

        let err = config_set(&repo, "Bootstrap", "[]", true, true).unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::ExpandAutoWrite)));
        assert!(err.to_string().contains("--expand-auto"));
        assert_eq!(std::fs::read(repo.config_path()).unwrap(), before);
    }

    #[test]
    fn test_routers() {
        let (_dir, repo, client) = setup(json!({
            "Routing": { "Type": "delegated", "DelegatedRouters": ["auto"] },
            "Ipns": { "DelegatedPublishers": ["auto"] }
        }));
        let config = repo.load().unwrap();

        let mut buf = Vec::new();
        routers(&client, &config, &mut buf).unwrap();
        let text = output(buf);
        assert!(text.contains("https://cid.contact\tproviders"));
        assert!(text.contains("https://delegated-ipfs.dev\tproviders, peers, ipns-get"));
        assert!(text.contains("https://delegated-ipfs.dev\tipns-put"));
    }

    #[tokio::test]
    async fn test_fetch_cached_only_without_cache() {
        let (_dir, _repo, client) = setup(json!({}));
        let mut buf = Vec::new();
        let result = fetch(
            &client,
            "https://conf.example.org/autoconf.json",
            true,
            &CancellationToken::new(),
            &mut buf,
        )
        .await;
        assert!(matches!(result, Err(CliError::AutoConf(_))));
    }

    #[tokio::test]
    async fn test_daemon_rejects_invalid_config() {
        let (_dir, repo, client) = setup(json!({
            "AutoConf": { "Enabled": false },
            "Bootstrap": ["auto"]
        }));
        let config = repo.load().unwrap();

        let result = daemon(
            &repo,
            &config,
            Arc::new(client),
            CancellationToken::new(),
            std::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(CliError::Validation(_))));
    }

    #[tokio::test]
    async fn test_daemon_shutdown() {
        let (_dir, repo, client) = setup(json!({
            "AutoConf": { "URL": "http://127.0.0.1:1/autoconf.json" },
            "Bootstrap": ["auto"]
        }));
        let client = Arc::new(client);
        let config = repo.load().unwrap();

        daemon(
            &repo,
            &config,
            client.clone(),
            CancellationToken::new(),
            std::future::ready(()),
        )
        .await
        .unwrap();
        assert_eq!(
            *client.get_cached_or_fallback("http://127.0.0.1:1/autoconf.json"),
            mainnet_fallback()
        );
    }
}
