//! Pipeline metrics.
//!
//! Recording functions go through the `metrics` facade and are no-ops until a
//! recorder is installed, so the pipeline can call them unconditionally.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global handle used to render the Prometheus exposition.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus recorder.
    pub enabled: bool,

    /// Service name added as a global label.
    pub service_name: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "bastion".to_string(),
        }
    }
}

/// Installs the Prometheus recorder as the global metrics recorder.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .add_global_label("service", config.service_name.clone())
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics were never initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(
        "bastion_pipeline_executions_total",
        "Total number of completed filter pipeline runs by outcome"
    );
    describe_histogram!(
        "bastion_pipeline_duration_seconds",
        "Filter pipeline duration in seconds"
    );
    describe_counter!(
        "bastion_short_circuits_total",
        "Results set by before callbacks, by phase"
    );
    describe_counter!(
        "bastion_faults_total",
        "Faults raised inside the pipeline, by phase and whether they were handled"
    );
}

/// Records a completed pipeline run.
///
/// `outcome` is one of `rendered`, `short_circuited`, `recovered` or `unhandled`.
pub fn record_execution(action: &str, outcome: &'static str, duration: Duration) {
    counter!(
        "bastion_pipeline_executions_total",
        "action" => action.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        "bastion_pipeline_duration_seconds",
        "action" => action.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a short-circuit in the given phase.
pub fn record_short_circuit(phase: &'static str) {
    counter!("bastion_short_circuits_total", "phase" => phase).increment(1);
}

/// Records a fault raised in the given phase.
pub fn record_fault(phase: &'static str, handled: bool) {
    counter!(
        "bastion_faults_total",
        "phase" => phase,
        "handled" => if handled { "true" } else { "false" }
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.service_name, "bastion");
    }

    #[test]
    fn test_disabled_metrics_is_noop() {
        assert!(init_metrics(&MetricsConfig::default()).is_ok());
    }

    #[test]
    fn test_record_functions_dont_panic() {
        record_execution("Users.Get", "rendered", Duration::from_millis(3));
        record_short_circuit("resource");
        record_fault("action", true);
    }
}
