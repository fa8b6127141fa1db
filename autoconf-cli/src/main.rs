use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod commands;
mod config;
mod errors;
mod logging;
mod metrics;

use autoconf::{AutoConfError, Client};
use config::ServiceConfig;
use errors::CliError;
use node_config::{Config, Repo};

#[derive(Parser)]
#[command(name = "autoconf", about = "Fetch, cache and apply remote network configuration")]
struct Cli {
    /// Node repository holding `config` and the autoconf cache.
    #[arg(long, env = "IPFS_PATH")]
    repo: PathBuf,

    /// YAML file with metrics, logging and HTTP client settings.
    #[arg(long, env = "AUTOCONF_SERVICE_CONFIG")]
    service_config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Read or change the node configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// Fetch the autoconf document and print it.
    Fetch {
        /// Defaults to `AutoConf.URL`.
        #[arg(long)]
        url: Option<String>,
        /// Only read the local cache.
        #[arg(long)]
        cached_only: bool,
    },
    /// Show the delegated routing endpoints in use.
    Routers,
    /// Keep the cached document fresh until interrupted.
    Daemon,
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show {
        /// Replace "auto" placeholders with values from the autoconf document.
        #[arg(long)]
        expand_auto: bool,
    },
    Get {
        key: String,
        #[arg(long)]
        expand_auto: bool,
    },
    Set {
        key: String,
        value: String,
        /// Parse the value as JSON.
        #[arg(long)]
        json: bool,
        /// Rejected: expanded values are read-only.
        #[arg(long)]
        expand_auto: bool,
    },
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let service = match &cli.service_config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::default(),
    };

    let _sentry = logging::init(&service.logging)?;
    if let Some(metrics_config) = &service.metrics {
        metrics::init(metrics_config)?;
    }

    let repo = Repo::open(&cli.repo);
    let load = || -> Result<(Config, Client), CliError> {
        let node_config = repo.load()?;
        let client = commands::build_client(&repo, &node_config, service.client.clone())?;
        Ok((node_config, client))
    };
    let mut stdout = io::stdout().lock();
    let cancel = CancellationToken::new();

    match cli.command {
        CliCommand::Config { action } => match action {
            ConfigCommand::Show { expand_auto } => {
                let (_, client) = load()?;
                commands::config_show(&repo, &client, expand_auto, &mut stdout)
            }
            ConfigCommand::Get { key, expand_auto } => {
                let (_, client) = load()?;
                commands::config_get(&repo, &client, &key, expand_auto, &mut stdout)
            }
            ConfigCommand::Set {
                key,
                value,
                json,
                expand_auto,
            } => commands::config_set(&repo, &key, &value, json, expand_auto),
        },
        CliCommand::Fetch { url, cached_only } => {
            let (node_config, client) = load()?;
            let url = url.unwrap_or_else(|| node_config.auto_conf.url().to_string());
            let fetch = commands::fetch(&client, &url, cached_only, &cancel, &mut stdout);
            tokio::select! {
                result = fetch => result,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    Err(AutoConfError::Cancelled.into())
                }
            }
        }
        CliCommand::Routers => {
            let (node_config, client) = load()?;
            commands::routers(&client, &node_config, &mut stdout)
        }
        CliCommand::Daemon => {
            let (node_config, client) = load()?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("failed to listen for ctrl-c: {e}");
                }
            };
            commands::daemon(&repo, &node_config, Arc::new(client), cancel, shutdown).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
