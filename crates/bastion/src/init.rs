//! Telemetry setup from configuration.

use bastion_config::BastionConfig;
use bastion_telemetry::{init_logging, init_metrics, TelemetryError};
use tracing::info;

/// Installs the logging subscriber and the metrics recorder described by
/// `config`.
///
/// Call once at startup. Disabled sections are skipped.
///
/// # Errors
///
/// Returns `TelemetryError` if the log directive is invalid or a global
/// subscriber or recorder is already installed.
pub fn init_telemetry(config: &BastionConfig) -> Result<(), TelemetryError> {
    init_logging(&config.logging.to_log_config())?;
    init_metrics(&config.metrics.to_telemetry())?;

    info!(
        trace_filters = config.pipeline.trace_filters,
        record_metrics = config.pipeline.record_metrics,
        metrics = config.metrics.enabled,
        "bastion telemetry initialized"
    );
    Ok(())
}
