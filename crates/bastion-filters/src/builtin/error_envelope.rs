//! Fault-to-error-envelope exception filter.
//!
//! [`ErrorEnvelopeFilter`] converts a fault that reached the exception phase
//! into the standard error envelope and marks it handled:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "ERROR_CODE",
//!     "message": "Human-readable error message",
//!     "request_id": "uuid-v7-request-id"
//!   }
//! }
//! ```
//!
//! Faults that are a [`ServiceError`] keep their category's status and code.
//! Anything else becomes `500 INTERNAL_ERROR` with a generic message unless
//! internal errors are exposed.
//!
//! The filter carries [`PolicyMarker::ERROR_ENVELOPE`]; only the authoritative
//! instance converts faults.

use crate::context::{ExceptionContext, PhaseContext};
use crate::filter::Filter;
use crate::invocation::{FilterResult, SyncExceptionFilter};
use bastion_core::{
    ActionResult, ErrorCategory, Fault, PolicyMarker, RequestCancelled, RequestId, ServiceError,
};
use serde_json::json;
use tracing::warn;

/// Exception filter rendering faults as JSON error envelopes.
#[derive(Debug, Clone)]
pub struct ErrorEnvelopeFilter {
    expose_internal_errors: bool,
    internal_error_message: String,
    order: i32,
}

impl Default for ErrorEnvelopeFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorEnvelopeFilter {
    /// Creates the filter with a generic internal error message.
    pub fn new() -> Self {
        Self {
            expose_internal_errors: false,
            internal_error_message: "An internal error occurred".to_string(),
            order: 0,
        }
    }

    /// Sets whether messages of internal faults are sent to clients.
    ///
    /// Only enable this in development environments.
    #[must_use]
    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    /// Sets the message used for internal faults.
    #[must_use]
    pub fn internal_error_message(mut self, message: impl Into<String>) -> Self {
        self.internal_error_message = message.into();
        self
    }

    /// Sets the filter order.
    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Wraps the filter as a pipeline [`Filter`] with the error-envelope marker.
    pub fn into_filter(self) -> Filter {
        Filter::builder("error-envelope")
            .order(self.order)
            .policy(PolicyMarker::ERROR_ENVELOPE)
            .sync_exception(self)
            .build()
    }

    /// Builds the envelope for `fault`.
    pub fn envelope(&self, fault: &Fault, request_id: RequestId) -> ActionResult {
        if fault.downcast_ref::<RequestCancelled>().is_some() {
            return Self::render(ErrorCategory::Timeout, "Request was cancelled", request_id);
        }
        let (category, message) = match fault.downcast_ref::<ServiceError>() {
            Some(err) if err.category() != ErrorCategory::Internal || self.expose_internal_errors => {
                (err.category(), err.message().to_string())
            }
            Some(err) => (err.category(), self.internal_error_message.clone()),
            None if self.expose_internal_errors => (ErrorCategory::Internal, fault.to_string()),
            None => (ErrorCategory::Internal, self.internal_error_message.clone()),
        };

        Self::render(category, &message, request_id)
    }

    fn render(category: ErrorCategory, message: &str, request_id: RequestId) -> ActionResult {
        ActionResult::json(
            category.default_status_code(),
            json!({
                "error": {
                    "code": category.code(),
                    "message": message,
                    "request_id": request_id.to_string()
                }
            }),
        )
    }
}

impl SyncExceptionFilter for ErrorEnvelopeFilter {
    fn on_exception(&self, ctx: &mut ExceptionContext<'_>) -> FilterResult {
        if ctx.is_exception_handled() || !ctx.is_effective_policy(&PolicyMarker::ERROR_ENVELOPE) {
            return Ok(());
        }
        let Some(fault) = ctx.exception() else {
            return Ok(());
        };

        let result = self.envelope(fault, ctx.request_id());
        warn!(
            status = result.status().as_u16(),
            error = %fault,
            "fault converted to error envelope"
        );
        ctx.set_result(result);
        ctx.mark_exception_handled();
        Ok(())
    }
}
