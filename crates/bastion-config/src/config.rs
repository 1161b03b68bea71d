//! Root configuration type.
//!
//! This module provides the top-level [`BastionConfig`] struct and its builder.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, LogFormat, LoggingConfig, MetricsConfig, PipelineConfig};

/// Complete Bastion runtime configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use bastion_config::BastionConfig;
///
/// let config = BastionConfig::default();
/// assert!(config.pipeline.record_metrics);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct BastionConfig {
    /// Executor configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl BastionConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> BastionConfigBuilder {
        BastionConfigBuilder::new()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The log level is not a valid filter directive
    /// - A required policy name is empty or listed twice
    /// - Metrics are enabled without a service name
    pub fn validate(&self) -> Result<(), ConfigError> {
        if bastion_telemetry::logging::create_env_filter(&self.logging.level).is_err() {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!("invalid filter directive: {}", self.logging.level),
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.pipeline.required_policies {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "pipeline.required_policies",
                    "policy names must not be empty",
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::invalid_value(
                    "pipeline.required_policies",
                    format!("duplicate policy: {name}"),
                ));
            }
        }

        if self.metrics.enabled && self.metrics.service_name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "metrics.service_name",
                "must be set when metrics are enabled",
            ));
        }

        Ok(())
    }

    /// Development preset: pretty debug logs and per-filter tracing, no metrics.
    ///
    /// # Example
    ///
    /// ```
    /// use bastion_config::BastionConfig;
    ///
    /// let config = BastionConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.ansi = true;

        config.pipeline.trace_filters = true;
        config.pipeline.record_metrics = false;
        config.metrics.enabled = false;

        config
    }

    /// Production preset: JSON info logs, metrics on, quiet filter tracing.
    ///
    /// # Example
    ///
    /// ```
    /// use bastion_config::{BastionConfig, LogFormat};
    ///
    /// let config = BastionConfig::production();
    /// assert_eq!(config.logging.format, LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.logging.ansi = false;

        config.pipeline.trace_filters = false;
        config.pipeline.record_metrics = true;
        config.metrics.enabled = true;

        config
    }
}

/// Builder for [`BastionConfig`].
#[derive(Debug, Default)]
pub struct BastionConfigBuilder {
    pipeline: Option<PipelineConfig>,
    logging: Option<LoggingConfig>,
    metrics: Option<MetricsConfig>,
}

impl BastionConfigBuilder {
    /// Creates a builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pipeline section.
    #[must_use]
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Sets the logging section.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Sets the metrics section.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> BastionConfig {
        BastionConfig {
            pipeline: self.pipeline.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            metrics: self.metrics.unwrap_or_default(),
        }
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<BastionConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
