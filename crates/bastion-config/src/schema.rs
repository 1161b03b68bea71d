//! Configuration schema types.
//!
//! This module defines the structure of each configuration section.

use bastion_core::PolicyMarker;
use serde::{Deserialize, Serialize};

/// Pipeline section.
///
/// Controls how the executor runs filter pipelines.
///
/// # Example
///
/// ```
/// use bastion_config::PipelineConfig;
///
/// let config = PipelineConfig {
///     trace_filters: false,
///     record_metrics: true,
///     required_policies: vec!["error-envelope".to_string()],
///     plan_cache_capacity: 256,
/// };
/// assert_eq!(config.policy_markers().len(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Emit a debug event for every filter callback.
    #[serde(default = "default_true")]
    pub trace_filters: bool,

    /// Record pipeline metrics.
    #[serde(default = "default_true")]
    pub record_metrics: bool,

    /// Policy markers that must have an effective filter in every plan.
    #[serde(default)]
    pub required_policies: Vec<String>,

    /// Maximum number of cached plans. Zero disables caching.
    #[serde(default = "default_plan_cache_capacity")]
    pub plan_cache_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            trace_filters: true,
            record_metrics: true,
            required_policies: Vec::new(),
            plan_cache_capacity: default_plan_cache_capacity(),
        }
    }
}

impl PipelineConfig {
    /// Returns the required policies as markers.
    #[must_use]
    pub fn policy_markers(&self) -> Vec<PolicyMarker> {
        self.required_policies
            .iter()
            .map(|name| PolicyMarker::owned(name.clone()))
            .collect()
    }
}

fn default_true() -> bool {
    true
}

fn default_plan_cache_capacity() -> usize {
    1024
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable output.
    Pretty,
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Install a logging subscriber.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level or filter directive (e.g., "info", "bastion_filters=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Emit ANSI colours (pretty format only).
    #[serde(default)]
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
            ansi: false,
        }
    }
}

impl LoggingConfig {
    /// Converts the section into the telemetry crate's logging configuration.
    #[must_use]
    pub fn to_log_config(&self) -> bastion_telemetry::LogConfig {
        bastion_telemetry::LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            json_format: self.format == LogFormat::Json,
            ansi: self.ansi,
            span_events: self.format == LogFormat::Pretty,
            ..bastion_telemetry::LogConfig::default()
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder.
    #[serde(default)]
    pub enabled: bool,

    /// Service name added as a global label.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: default_service_name(),
        }
    }
}

impl MetricsConfig {
    /// Converts the section into the telemetry crate's metrics configuration.
    #[must_use]
    pub fn to_telemetry(&self) -> bastion_telemetry::MetricsConfig {
        bastion_telemetry::MetricsConfig {
            enabled: self.enabled,
            service_name: self.service_name.clone(),
        }
    }
}

fn default_service_name() -> String {
    "bastion".to_string()
}
