//! Typed configuration for the Bastion filter runtime.
//!
//! The configuration is built around [`BastionConfig`], which groups:
//!
//! - [`PipelineConfig`] - executor behaviour (filter tracing, metrics,
//!   required policies, plan caching)
//! - [`LoggingConfig`] - structured logging
//! - [`MetricsConfig`] - pipeline metrics
//!
//! Configuration is layered by [`ConfigLoader`]: defaults, then a TOML or
//! JSON file (or string), then environment variables.
//!
//! # Example
//!
//! ```no_run
//! use bastion_config::{BastionConfig, ConfigLoader};
//!
//! # fn main() -> Result<(), bastion_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("bastion.toml")?
//!     .with_env_prefix("BASTION")
//!     .load()?;
//!
//! println!("trace filters: {}", config.pipeline.trace_filters);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! trace_filters = true
//! record_metrics = true
//! required_policies = ["error-envelope"]
//! plan_cache_capacity = 1024
//!
//! [logging]
//! enabled = true
//! level = "info"
//! format = "json"
//! ansi = false
//!
//! [metrics]
//! enabled = true
//! service_name = "orders-api"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with variables named `PREFIX__SECTION__KEY`:
//!
//! - `BASTION__PIPELINE__TRACE_FILTERS=false`
//! - `BASTION__PIPELINE__REQUIRED_POLICIES=cross-origin,error-envelope`
//! - `BASTION__LOGGING__LEVEL=debug`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
