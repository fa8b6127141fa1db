use crate::config::MetricsConfig;
use crate::errors::CliError;
use metrics_exporter_statsd::StatsdBuilder;

/// Installs the statsd recorder and registers every autoconf metric with it.
pub fn init(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(&config.prefix))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(autoconf::metrics_defs::ALL_METRICS);
    tracing::debug!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "statsd metrics enabled"
    );
    Ok(())
}
