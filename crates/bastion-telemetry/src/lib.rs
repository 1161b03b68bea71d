//! Observability for Bastion.
//!
//! - **Logging**: structured JSON or pretty logs through `tracing-subscriber`
//! - **Metrics**: pipeline counters and histograms through the `metrics` facade,
//!   optionally exported in Prometheus text format
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `bastion_pipeline_executions_total` | Counter | `action`, `outcome` | Completed pipeline runs |
//! | `bastion_pipeline_duration_seconds` | Histogram | `action` | Pipeline latency |
//! | `bastion_short_circuits_total` | Counter | `phase` | Results set by "before" callbacks |
//! | `bastion_faults_total` | Counter | `phase`, `handled` | Faults raised inside the pipeline |
//!
//! # Example
//!
//! ```rust,ignore
//! use bastion_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(action = "Users.Get", "pipeline ready");
//! ```

#![doc(html_root_url = "https://docs.rs/bastion-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{init_metrics, render_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
