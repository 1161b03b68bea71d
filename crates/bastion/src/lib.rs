//! # Bastion
//!
//! **Ordered, scoped filter pipelines around action invocations.**
//!
//! Bastion runs the filters that apply to a request around the action that
//! handles it, in five nested phases:
//!
//! ```text
//! Authorization → Resource ┬→ Action filters → action → Action filters ┐
//!                          │  Result filters → render → Result filters │
//!                          │  Exception filters (on fault)  ←──────────┘
//!                          └→ Resource (after)
//! ```
//!
//! Filters come from three scopes (global, controller, action), are ordered
//! by `(order, scope)` and may share policy markers, of which only the filter
//! closest to the action is effective.
//! Global filters live in the runtime's [`FilterCatalog`](filters::FilterCatalog);
//! controller and action filters are registered per action with
//! [`FilterRuntime::register`].
//!
//! ## Quick Start
//!
//! ```
//! use bastion::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let catalog = FilterCatalog::builder()
//!     .filter(ErrorEnvelopeFilter::new().into_filter())
//!     .build();
//! let runtime = FilterRuntime::new(&BastionConfig::default(), catalog);
//!
//! let action = action_fn(|_ctx| async { Ok(ActionOutput::from(ActionResult::ok("pong"))) });
//! let response = runtime
//!     .invoke(ActionContext::new(ActionDescriptor::new("Health", "Ping")), &action)
//!     .await
//!     .unwrap();
//!
//! assert_eq!(response.status(), 200);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/bastion/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod render;
mod runtime;
mod init;

pub use render::{ResponseBody, ResponseRenderer};
pub use runtime::{FilterRuntime, FilterRuntimeBuilder, RuntimeError};
pub use init::init_telemetry;

// Re-export core types
pub use bastion_core as core;

// Re-export the pipeline
pub use bastion_filters as filters;

// Re-export configuration
pub use bastion_config as config;

// Re-export telemetry
pub use bastion_telemetry as telemetry;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use bastion_core::{
        ActionContext, ActionDescriptor, ActionOutput, ActionResult, Capability, ErrorCategory,
        Fault, FilterScope, PipelineError, PolicyMarker, RequestId, ReturnKind, ServiceError,
    };

    pub use bastion_filters::builtin::{
        AccessDecision, CorsFilter, ErrorEnvelopeFilter, RoleAuthorizationFilter,
    };
    pub use bastion_filters::context::*;
    pub use bastion_filters::invocation::*;
    pub use bastion_filters::{
        DeclaredFilters, Filter, FilterCatalog, FilterDescriptor, PhaseContext, Pipeline,
        PipelineOutcome,
    };

    pub use bastion_config::{BastionConfig, ConfigLoader};

    pub use crate::{FilterRuntime, ResponseRenderer, RuntimeError};
}
