//! # Bastion Filters
//!
//! Per-request filter pipeline for the Bastion framework.
//!
//! A selected action is wrapped by an ordered set of filters, each taking
//! part in one or more phases:
//!
//! ```text
//! Authorization → Resource ─→ Action ─→ invoke ─→ Action ─→ Result ─→ render ─→ Result ─→ Resource
//!                 (before)    (before)            (after)   (before)            (after)   (after)
//!                             └──────────── guarded core: faults go to Exception ─────────┘
//! ```
//!
//! | Component | Module | Purpose |
//! |-----------|--------|---------|
//! | Descriptors & catalog | [`descriptor`], [`catalog`] | scoped registrations, factories |
//! | Resolver | [`resolver`] | `(order, scope)` ordering, effective policies |
//! | Contexts | [`context`] | per-request state and per-phase views |
//! | Executor | [`pipeline`] | the onion state machine |
//! | Invocation adapter | [`invocation`] | async and blocking filter flavours |
//!
//! ## Example
//!
//! ```
//! use bastion_core::FilterScope;
//! use bastion_filters::builtin::{CorsFilter, ErrorEnvelopeFilter};
//! use bastion_filters::{resolve, DeclaredFilters, FilterCatalog};
//!
//! let catalog = FilterCatalog::builder()
//!     .filter(ErrorEnvelopeFilter::new().into_filter())
//!     .filter(CorsFilter::permissive().into_filter())
//!     .build();
//!
//! let declared = DeclaredFilters::new()
//!     .action(CorsFilter::builder().allow_origin("https://app.example.com").build().into_filter());
//!
//! let plan = resolve(catalog.collect(&declared));
//! assert_eq!(plan.len(), 3);
//! assert_eq!(
//!     plan.effective(&bastion_core::PolicyMarker::CROSS_ORIGIN).unwrap().scope(),
//!     FilterScope::Action
//! );
//! ```

#![doc(html_root_url = "https://docs.rs/bastion-filters/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod builtin;
pub mod catalog;
pub mod context;
pub mod descriptor;
pub mod filter;
pub mod invocation;
pub mod pipeline;
pub mod resolver;

// Re-export main types at crate root
pub use catalog::{DeclaredFilters, FilterCatalog, FilterCatalogBuilder};
pub use context::{PhaseContext, PipelineContext};
pub use descriptor::{
    FactoryResolver, FilterDescriptor, FilterFactory, FilterInstanceResolver, FilterSource,
};
pub use filter::{Filter, FilterBuilder};
pub use invocation::{
    action_fn, ActionInvoker, BoxFuture, FilterResult, ResultRenderer,
};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineOptions, PipelineOutcome};
pub use resolver::{resolve, FilterItem, FilterPlan, ResolvedFilters};
