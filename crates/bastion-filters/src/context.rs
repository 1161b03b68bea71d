//! Pipeline and phase contexts.
//!
//! [`PipelineContext`] is the per-request state machine. Filters never see
//! it directly; each callback receives a phase context that exposes only
//! what that phase may read or change. All phase contexts implement
//! [`PhaseContext`] for the common read-only accessors.

use crate::resolver::{FilterItem, ResolvedFilters};
use bastion_core::{ActionContext, ActionResult, Fault, PolicyMarker, RequestId};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Mutable state of one request's pipeline.
///
/// Created once per request. Running it a second time requires an explicit
/// [`reset`](Self::reset).
pub struct PipelineContext {
    pub(crate) action: ActionContext,
    pub(crate) filters: Arc<ResolvedFilters>,
    pub(crate) result: Option<ActionResult>,
    pub(crate) exception: Option<Fault>,
    pub(crate) fault_phase: Option<&'static str>,
    pub(crate) exception_handled: bool,
    pub(crate) canceled: bool,
    pub(crate) result_canceled: bool,
    pub(crate) rendered: bool,
    pub(crate) recovered: bool,
    pub(crate) executed: bool,
    pub(crate) current: Option<usize>,
}

impl PipelineContext {
    /// Creates a context for `action` running through `filters`.
    pub fn new(action: ActionContext, filters: ResolvedFilters) -> Self {
        Self::with_shared(action, Arc::new(filters))
    }

    /// Creates a context sharing an already instantiated filter set.
    pub fn with_shared(action: ActionContext, filters: Arc<ResolvedFilters>) -> Self {
        Self {
            action,
            filters,
            result: None,
            exception: None,
            fault_phase: None,
            exception_handled: false,
            canceled: false,
            result_canceled: false,
            rendered: false,
            recovered: false,
            executed: false,
            current: None,
        }
    }

    /// Clears all per-run state so the context can run again.
    pub fn reset(&mut self) {
        self.result = None;
        self.exception = None;
        self.fault_phase = None;
        self.exception_handled = false;
        self.canceled = false;
        self.result_canceled = false;
        self.rendered = false;
        self.recovered = false;
        self.executed = false;
        self.current = None;
    }

    /// The action being executed.
    pub fn action(&self) -> &ActionContext {
        &self.action
    }

    /// The filters of this request, in execution order.
    pub fn filters(&self) -> &ResolvedFilters {
        &self.filters
    }

    /// The current result.
    pub fn result(&self) -> Option<&ActionResult> {
        self.result.as_ref()
    }

    /// The fault in flight, if any.
    pub fn exception(&self) -> Option<&Fault> {
        self.exception.as_ref()
    }

    /// Whether the fault in flight was marked handled.
    pub fn is_exception_handled(&self) -> bool {
        self.exception_handled
    }

    /// Whether a "before" callback short-circuited.
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Whether the result renderer was invoked.
    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    /// Whether a result filter suppressed rendering.
    pub fn is_render_suppressed(&self) -> bool {
        self.result_canceled
    }

    /// Whether a fault was recovered by a filter.
    pub fn is_recovered(&self) -> bool {
        self.recovered
    }

    /// Whether the context has been run since creation or the last reset.
    pub fn is_executed(&self) -> bool {
        self.executed
    }

    pub(crate) fn current_item(&self) -> Option<&FilterItem> {
        self.current.and_then(|index| self.filters.get(index))
    }

    /// Records `fault` as the fault in flight, replacing any previous one.
    pub(crate) fn set_exception(&mut self, fault: Fault, phase: &'static str) {
        self.exception = Some(fault);
        self.fault_phase = Some(phase);
        self.exception_handled = false;
    }

    /// Drops a fault that was marked handled.
    pub(crate) fn settle(&mut self) {
        if self.exception.is_some() && self.exception_handled {
            self.exception = None;
            self.fault_phase = None;
            self.exception_handled = false;
            self.recovered = true;
        }
    }

    pub(crate) fn render_done(&self) -> bool {
        self.rendered || self.result_canceled
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("request_id", &self.action.request_id())
            .field("action", &self.action.descriptor().display_name())
            .field("filters", &self.filters.items().len())
            .field("result", &self.result.as_ref().map(ActionResult::status))
            .field("exception", &self.exception.as_ref().map(ToString::to_string))
            .field("exception_handled", &self.exception_handled)
            .field("canceled", &self.canceled)
            .field("rendered", &self.rendered)
            .finish()
    }
}

/// Read access shared by every phase context.
pub trait PhaseContext {
    /// The underlying pipeline state.
    fn pipeline(&self) -> &PipelineContext;

    /// The action being executed.
    fn action(&self) -> &ActionContext {
        &self.pipeline().action
    }

    /// The request ID.
    fn request_id(&self) -> RequestId {
        self.pipeline().action.request_id()
    }

    /// The filter whose callback is running.
    fn filter(&self) -> Option<&FilterItem> {
        self.pipeline().current_item()
    }

    /// Whether the running filter is authoritative for `marker`.
    ///
    /// Filters carrying a policy marker call this before applying the
    /// policy; the non-authoritative ones skip it.
    fn is_effective_policy(&self, marker: &PolicyMarker) -> bool {
        self.filter()
            .is_some_and(|item| item.is_effective_policy(marker))
    }

    /// The authoritative filter for `marker` in this pipeline.
    fn effective_policy(&self, marker: &PolicyMarker) -> Option<&FilterItem> {
        self.pipeline().filters.effective(marker)
    }

    /// The current result.
    fn result(&self) -> Option<&ActionResult> {
        self.pipeline().result.as_ref()
    }
}

macro_rules! phase_context {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name<'p> {
            pipeline: &'p mut PipelineContext,
        }

        impl<'p> $name<'p> {
            pub(crate) fn new(pipeline: &'p mut PipelineContext) -> Self {
                Self { pipeline }
            }
        }

        impl PhaseContext for $name<'_> {
            fn pipeline(&self) -> &PipelineContext {
                self.pipeline
            }
        }

        impl fmt::Debug for $name<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("pipeline", &self.pipeline)
                    .finish()
            }
        }
    };
}

phase_context!(
    /// Context of an authorization callback.
    AuthorizationContext
);
phase_context!(
    /// Context of a resource "before" callback.
    ResourceExecutingContext
);
phase_context!(
    /// Context of a resource "after" callback.
    ResourceExecutedContext
);
phase_context!(
    /// Context of an action "before" callback.
    ActionExecutingContext
);
phase_context!(
    /// Context of an action "after" callback.
    ActionExecutedContext
);
phase_context!(
    /// Context of an exception callback.
    ExceptionContext
);
phase_context!(
    /// Context of a result "before" callback.
    ResultExecutingContext
);
phase_context!(
    /// Context of a result "after" callback.
    ResultExecutedContext
);

impl AuthorizationContext<'_> {
    /// Denies the request with `result`. No later phase runs.
    pub fn set_result(&mut self, result: ActionResult) {
        self.pipeline.result = Some(result);
        self.pipeline.canceled = true;
    }
}

impl ResourceExecutingContext<'_> {
    /// Short-circuits with `result`, skipping all inner phases.
    pub fn set_result(&mut self, result: ActionResult) {
        self.pipeline.result = Some(result);
        self.pipeline.canceled = true;
    }
}

impl ActionExecutingContext<'_> {
    /// The bound arguments.
    pub fn arguments(&self) -> &IndexMap<String, Value> {
        self.pipeline.action.arguments()
    }

    /// The bound arguments, for rewriting before the action runs.
    pub fn arguments_mut(&mut self) -> &mut IndexMap<String, Value> {
        self.pipeline.action.arguments_mut()
    }

    /// A single bound argument.
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.pipeline.action.argument(name)
    }

    /// Short-circuits with `result`, skipping the action.
    pub fn set_result(&mut self, result: ActionResult) {
        self.pipeline.result = Some(result);
        self.pipeline.canceled = true;
    }
}

macro_rules! unwind_methods {
    ($name:ident) => {
        impl $name<'_> {
            /// Whether a "before" callback short-circuited.
            pub fn is_canceled(&self) -> bool {
                self.pipeline.canceled
            }

            /// The fault in flight, if any.
            pub fn exception(&self) -> Option<&Fault> {
                self.pipeline.exception.as_ref()
            }

            /// Whether the fault in flight was marked handled.
            pub fn is_exception_handled(&self) -> bool {
                self.pipeline.exception_handled
            }

            /// Marks the fault in flight handled. Does nothing without one.
            pub fn mark_exception_handled(&mut self) {
                if self.pipeline.exception.is_some() {
                    self.pipeline.exception_handled = true;
                }
            }

            /// Replaces the result.
            pub fn set_result(&mut self, result: ActionResult) {
                self.pipeline.result = Some(result);
            }
        }
    };
}

unwind_methods!(ResourceExecutedContext);
unwind_methods!(ActionExecutedContext);
unwind_methods!(ResultExecutedContext);

impl ResourceExecutedContext<'_> {
    /// Whether the result renderer was invoked.
    pub fn is_rendered(&self) -> bool {
        self.pipeline.rendered
    }
}

impl ResultExecutedContext<'_> {
    /// Whether the result renderer was invoked.
    pub fn is_rendered(&self) -> bool {
        self.pipeline.rendered
    }

    /// Whether a result filter suppressed rendering.
    pub fn is_render_suppressed(&self) -> bool {
        self.pipeline.result_canceled
    }
}

impl ExceptionContext<'_> {
    /// The fault in flight.
    pub fn exception(&self) -> Option<&Fault> {
        self.pipeline.exception.as_ref()
    }

    /// Whether an exception filter already handled the fault.
    pub fn is_exception_handled(&self) -> bool {
        self.pipeline.exception_handled
    }

    /// Marks the fault handled. The pipeline then renders the result.
    pub fn mark_exception_handled(&mut self) {
        if self.pipeline.exception.is_some() {
            self.pipeline.exception_handled = true;
        }
    }

    /// Sets the recovery result and marks the fault handled.
    pub fn set_result(&mut self, result: ActionResult) {
        self.pipeline.result = Some(result);
        self.mark_exception_handled();
    }
}

impl ResultExecutingContext<'_> {
    /// The result about to be rendered, for in-place changes.
    pub fn result_mut(&mut self) -> Option<&mut ActionResult> {
        self.pipeline.result.as_mut()
    }

    /// Replaces the result about to be rendered.
    pub fn set_result(&mut self, result: ActionResult) {
        self.pipeline.result = Some(result);
    }

    /// Suppresses rendering. Inner result filters are skipped.
    pub fn cancel(&mut self) {
        self.pipeline.result_canceled = true;
    }

    /// Whether rendering was suppressed.
    pub fn is_cancelled(&self) -> bool {
        self.pipeline.result_canceled
    }
}
