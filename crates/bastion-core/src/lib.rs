//! # Bastion Core
//!
//! Core value types for the Bastion filter pipeline.
//!
//! This crate provides the vocabulary shared by every other Bastion crate:
//!
//! - [`FilterScope`] - Declaration breadth of a filter (Global, Controller, Action)
//! - [`Capability`] / [`CapabilitySet`] - The phases a filter participates in
//! - [`PolicyMarker`] - Tags for policies of which only one instance may apply
//! - [`ActionContext`] - The selected action, its bound arguments and request head
//! - [`ActionResult`] - The result object handed to the renderer
//! - [`PipelineError`] / [`ServiceError`] - Error types

#![doc(html_root_url = "https://docs.rs/bastion-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod capability;
mod error;
mod policy;
mod result;
mod scope;

pub use action::{ActionContext, ActionDescriptor, ActionOutput, RequestId, ReturnKind};
pub use capability::{Capability, CapabilitySet};
pub use error::{
    ErrorCategory, Fault, PipelineError, PipelineResult, RequestCancelled, ReturnContractViolation,
    ServiceError,
};
pub use policy::PolicyMarker;
pub use result::{ActionResult, ResultBody};
pub use scope::FilterScope;
