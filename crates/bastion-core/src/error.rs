//! Error types for Bastion.
//!
//! Two kinds of failure flow through the pipeline:
//!
//! - A [`Fault`] is raised by an action, a renderer or a filter callback. It is
//!   an [`anyhow::Error`], so the original error value (and its type) survives
//!   the trip through the pipeline and can be recovered with `downcast_ref`.
//! - A [`PipelineError`] is what the pipeline's caller observes: either an
//!   unhandled fault, or a misuse fault describing a broken precondition.
//!
//! [`ServiceError`] is a typed fault actions can raise when they want the
//! error-envelope filter to pick a specific status code.

use crate::action::RequestId;
use crate::capability::CapabilitySet;
use crate::policy::PolicyMarker;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A fault raised inside the pipeline.
pub type Fault = anyhow::Error;

/// Result type alias using [`PipelineError`].
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced to the caller of the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A fault was raised and no filter marked it handled.
    ///
    /// `fault` is the very error value that was raised.
    #[error("unhandled fault in action '{action}': {fault}")]
    Unhandled {
        /// Display name of the action.
        action: String,
        /// The fault that was raised.
        fault: Fault,
    },

    /// A factory produced an instance whose capabilities differ from its declaration.
    #[error("filter '{filter}' declares capabilities {declared} but its instance exposes {resolved}")]
    CapabilityMismatch {
        /// Filter name.
        filter: String,
        /// Capabilities declared by the descriptor.
        declared: CapabilitySet,
        /// Capabilities exposed by the resolved instance.
        resolved: CapabilitySet,
    },

    /// A policy that must have an authoritative filter has none.
    #[error("no filter carries the required effective policy '{marker}'")]
    NoEffectivePolicy {
        /// The policy marker.
        marker: PolicyMarker,
    },

    /// A filter factory failed to produce an instance.
    #[error("filter factory for '{filter}' failed: {reason}")]
    FactoryFailed {
        /// Filter name.
        filter: String,
        /// Why the factory failed.
        reason: String,
    },

    /// A pipeline context was run a second time without being reset.
    #[error("pipeline context for request {request_id} was already run; reset it before reuse")]
    ContextReused {
        /// Request the context belongs to.
        request_id: RequestId,
    },
}

impl PipelineError {
    /// Creates an unhandled-fault error.
    #[must_use]
    pub fn unhandled(action: impl Into<String>, fault: Fault) -> Self {
        Self::Unhandled {
            action: action.into(),
            fault,
        }
    }

    /// Creates a factory failure error.
    #[must_use]
    pub fn factory_failed(filter: impl Into<String>, reason: impl ToString) -> Self {
        Self::FactoryFailed {
            filter: filter.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for precondition violations (everything but [`Self::Unhandled`]).
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        !matches!(self, Self::Unhandled { .. })
    }

    /// Returns the unhandled fault, if this is one.
    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Unhandled { fault, .. } => Some(fault),
            _ => None,
        }
    }

    /// Consumes the error and returns the unhandled fault, if this is one.
    #[must_use]
    pub fn into_fault(self) -> Option<Fault> {
        match self {
            Self::Unhandled { fault, .. } => Some(fault),
            _ => None,
        }
    }
}

/// Raised by filters that observe the request cancellation signal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("request {request_id} was cancelled")]
pub struct RequestCancelled {
    /// The cancelled request.
    pub request_id: RequestId,
}

/// Raised when an action's output does not match its declared return contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("action '{action}' declared a {declared:?} return but produced {produced:?}")]
pub struct ReturnContractViolation {
    /// Display name of the action.
    pub action: String,
    /// Declared return kind.
    pub declared: crate::ReturnKind,
    /// Return kind actually produced.
    pub produced: crate::ReturnKind,
}

/// Categories of service errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Request validation errors (invalid input).
    Validation,
    /// Missing or invalid credentials.
    Authentication,
    /// Permission denied.
    Authorization,
    /// Resource not found.
    NotFound,
    /// Conflict (e.g., concurrent modification).
    Conflict,
    /// Request timeout.
    Timeout,
    /// Internal server errors.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code used in error envelopes.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Authentication => "AUTHENTICATION_REQUIRED",
            Self::Authorization => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// A categorised error an action can raise as a fault.
///
/// # Example
///
/// ```
/// use bastion_core::{ErrorCategory, Fault, ServiceError};
///
/// let fault: Fault = ServiceError::not_found("user 42 not found").into();
/// let err = fault.downcast_ref::<ServiceError>().unwrap();
/// assert_eq!(err.category(), ErrorCategory::NotFound);
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ServiceError {
    category: ErrorCategory,
    message: String,
}

impl ServiceError {
    /// Creates a service error.
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, message)
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, message)
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Conflict, message)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, message)
    }

    /// Returns the category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category.default_status_code()
    }
}
