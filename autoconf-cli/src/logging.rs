use crate::config::LoggingConfig;
use crate::errors::CliError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "info";

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, CliError> {
    match config.filter.as_deref() {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|e| CliError::Logging(e.to_string()))
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Installs the global subscriber: an fmt layer on stderr, plus the Sentry
/// layer when a DSN is configured.
///
/// The returned guard flushes pending Sentry events on drop and must be kept
/// alive until the program exits.
pub fn init(config: &LoggingConfig) -> Result<Option<sentry::ClientInitGuard>, CliError> {
    let filter = build_filter(config)?;

    let guard = match config.sentry_dsn.as_deref() {
        Some(dsn) => {
            let dsn = dsn
                .parse::<sentry::types::Dsn>()
                .map_err(|e| CliError::Logging(format!("invalid sentry DSN: {e}")))?;
            Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                ..Default::default()
            }))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    Ok(guard)
}
