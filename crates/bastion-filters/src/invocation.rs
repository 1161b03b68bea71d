//! Filter capability traits and the invocation adapter.
//!
//! Every filter callback is modelled as an async method returning a
//! [`BoxFuture`]. The executor awaits each callback before moving to the
//! next one, so a filter may suspend at the callback boundary but the
//! pipeline never runs two callbacks of the same request concurrently.
//!
//! Filters that never suspend implement the blocking twin of a capability
//! (`SyncActionFilter` and friends) and are wrapped in [`Blocking`]. The
//! adapter runs the blocking body when the executor calls it and hands
//! back an already-completed future, so blocking filters add no
//! suspension point.
//!
//! # Example
//!
//! ```
//! use bastion_filters::context::ActionExecutingContext;
//! use bastion_filters::invocation::{Blocking, FilterResult, SyncActionFilter};
//! use bastion_filters::Filter;
//!
//! struct RequireId;
//!
//! impl SyncActionFilter for RequireId {
//!     fn on_action_executing(&self, ctx: &mut ActionExecutingContext<'_>) -> FilterResult {
//!         if !ctx.arguments().contains_key("id") {
//!             ctx.set_result(bastion_core::ActionResult::text(
//!                 http::StatusCode::BAD_REQUEST,
//!                 "missing id",
//!             ));
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let filter = Filter::builder("require-id").action(Blocking(RequireId)).build();
//! assert!(filter.action().is_some());
//! ```

use crate::context::{
    ActionExecutedContext, ActionExecutingContext, AuthorizationContext, ExceptionContext,
    ResourceExecutedContext, ResourceExecutingContext, ResultExecutedContext,
    ResultExecutingContext,
};
use bastion_core::{ActionContext, ActionOutput, ActionResult, Fault};
use std::future::{ready, Future};
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a filter callback returns. `Err` raises a fault.
pub type FilterResult = Result<(), Fault>;

fn completed<'a>(result: FilterResult) -> BoxFuture<'a, FilterResult> {
    Box::pin(ready(result))
}

// ============================================================================
// Async capabilities
// ============================================================================

/// Runs first. Setting a result denies the request and ends the pipeline.
pub trait AuthorizationFilter: Send + Sync + 'static {
    /// Called once per request, in pipeline order.
    fn on_authorization<'a>(
        &'a self,
        ctx: &'a mut AuthorizationContext<'_>,
    ) -> BoxFuture<'a, FilterResult>;
}

/// Wraps everything after authorization.
pub trait ResourceFilter: Send + Sync + 'static {
    /// Called outermost-first. Setting a result skips all inner phases.
    fn on_resource_executing<'a>(
        &'a self,
        ctx: &'a mut ResourceExecutingContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        let _ = ctx;
        completed(Ok(()))
    }

    /// Called innermost-first, always, once the inner phases are done.
    fn on_resource_executed<'a>(
        &'a self,
        ctx: &'a mut ResourceExecutedContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        let _ = ctx;
        completed(Ok(()))
    }
}

/// Observes faults raised by the action and result phases.
pub trait ExceptionFilter: Send + Sync + 'static {
    /// Called innermost-first for a fault that is still in flight.
    fn on_exception<'a>(&'a self, ctx: &'a mut ExceptionContext<'_>) -> BoxFuture<'a, FilterResult>;
}

/// Wraps the action invocation.
pub trait ActionFilter: Send + Sync + 'static {
    /// Called outermost-first. Setting a result skips the action.
    fn on_action_executing<'a>(
        &'a self,
        ctx: &'a mut ActionExecutingContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        let _ = ctx;
        completed(Ok(()))
    }

    /// Called innermost-first after the action (or an inner short-circuit).
    fn on_action_executed<'a>(
        &'a self,
        ctx: &'a mut ActionExecutedContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        let _ = ctx;
        completed(Ok(()))
    }
}

/// Wraps rendering of the result.
pub trait ResultFilter: Send + Sync + 'static {
    /// Called outermost-first before rendering.
    fn on_result_executing<'a>(
        &'a self,
        ctx: &'a mut ResultExecutingContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        let _ = ctx;
        completed(Ok(()))
    }

    /// Called innermost-first after rendering (or its suppression).
    fn on_result_executed<'a>(
        &'a self,
        ctx: &'a mut ResultExecutedContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        let _ = ctx;
        completed(Ok(()))
    }
}

// ============================================================================
// Blocking capabilities
// ============================================================================

/// Blocking twin of [`AuthorizationFilter`].
pub trait SyncAuthorizationFilter: Send + Sync + 'static {
    /// See [`AuthorizationFilter::on_authorization`].
    fn on_authorization(&self, ctx: &mut AuthorizationContext<'_>) -> FilterResult;
}

/// Blocking twin of [`ResourceFilter`].
pub trait SyncResourceFilter: Send + Sync + 'static {
    /// See [`ResourceFilter::on_resource_executing`].
    fn on_resource_executing(&self, ctx: &mut ResourceExecutingContext<'_>) -> FilterResult {
        let _ = ctx;
        Ok(())
    }

    /// See [`ResourceFilter::on_resource_executed`].
    fn on_resource_executed(&self, ctx: &mut ResourceExecutedContext<'_>) -> FilterResult {
        let _ = ctx;
        Ok(())
    }
}

/// Blocking twin of [`ExceptionFilter`].
pub trait SyncExceptionFilter: Send + Sync + 'static {
    /// See [`ExceptionFilter::on_exception`].
    fn on_exception(&self, ctx: &mut ExceptionContext<'_>) -> FilterResult;
}

/// Blocking twin of [`ActionFilter`].
pub trait SyncActionFilter: Send + Sync + 'static {
    /// See [`ActionFilter::on_action_executing`].
    fn on_action_executing(&self, ctx: &mut ActionExecutingContext<'_>) -> FilterResult {
        let _ = ctx;
        Ok(())
    }

    /// See [`ActionFilter::on_action_executed`].
    fn on_action_executed(&self, ctx: &mut ActionExecutedContext<'_>) -> FilterResult {
        let _ = ctx;
        Ok(())
    }
}

/// Blocking twin of [`ResultFilter`].
pub trait SyncResultFilter: Send + Sync + 'static {
    /// See [`ResultFilter::on_result_executing`].
    fn on_result_executing(&self, ctx: &mut ResultExecutingContext<'_>) -> FilterResult {
        let _ = ctx;
        Ok(())
    }

    /// See [`ResultFilter::on_result_executed`].
    fn on_result_executed(&self, ctx: &mut ResultExecutedContext<'_>) -> FilterResult {
        let _ = ctx;
        Ok(())
    }
}

/// Adapts a blocking filter to the async capability traits.
#[derive(Debug, Clone, Default)]
pub struct Blocking<F>(pub F);

impl<F: SyncAuthorizationFilter> AuthorizationFilter for Blocking<F> {
    fn on_authorization<'a>(
        &'a self,
        ctx: &'a mut AuthorizationContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        completed(self.0.on_authorization(ctx))
    }
}

impl<F: SyncResourceFilter> ResourceFilter for Blocking<F> {
    fn on_resource_executing<'a>(
        &'a self,
        ctx: &'a mut ResourceExecutingContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        completed(self.0.on_resource_executing(ctx))
    }

    fn on_resource_executed<'a>(
        &'a self,
        ctx: &'a mut ResourceExecutedContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        completed(self.0.on_resource_executed(ctx))
    }
}

impl<F: SyncExceptionFilter> ExceptionFilter for Blocking<F> {
    fn on_exception<'a>(&'a self, ctx: &'a mut ExceptionContext<'_>) -> BoxFuture<'a, FilterResult> {
        completed(self.0.on_exception(ctx))
    }
}

impl<F: SyncActionFilter> ActionFilter for Blocking<F> {
    fn on_action_executing<'a>(
        &'a self,
        ctx: &'a mut ActionExecutingContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        completed(self.0.on_action_executing(ctx))
    }

    fn on_action_executed<'a>(
        &'a self,
        ctx: &'a mut ActionExecutedContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        completed(self.0.on_action_executed(ctx))
    }
}

impl<F: SyncResultFilter> ResultFilter for Blocking<F> {
    fn on_result_executing<'a>(
        &'a self,
        ctx: &'a mut ResultExecutingContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        completed(self.0.on_result_executing(ctx))
    }

    fn on_result_executed<'a>(
        &'a self,
        ctx: &'a mut ResultExecutedContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        completed(self.0.on_result_executed(ctx))
    }
}

// Shared instances: one object exposing several capabilities is registered
// once per capability through clones of the same `Arc`.

impl<T: AuthorizationFilter + ?Sized> AuthorizationFilter for Arc<T> {
    fn on_authorization<'a>(
        &'a self,
        ctx: &'a mut AuthorizationContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        (**self).on_authorization(ctx)
    }
}

impl<T: ResourceFilter + ?Sized> ResourceFilter for Arc<T> {
    fn on_resource_executing<'a>(
        &'a self,
        ctx: &'a mut ResourceExecutingContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        (**self).on_resource_executing(ctx)
    }

    fn on_resource_executed<'a>(
        &'a self,
        ctx: &'a mut ResourceExecutedContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        (**self).on_resource_executed(ctx)
    }
}

impl<T: ExceptionFilter + ?Sized> ExceptionFilter for Arc<T> {
    fn on_exception<'a>(&'a self, ctx: &'a mut ExceptionContext<'_>) -> BoxFuture<'a, FilterResult> {
        (**self).on_exception(ctx)
    }
}

impl<T: ActionFilter + ?Sized> ActionFilter for Arc<T> {
    fn on_action_executing<'a>(
        &'a self,
        ctx: &'a mut ActionExecutingContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        (**self).on_action_executing(ctx)
    }

    fn on_action_executed<'a>(
        &'a self,
        ctx: &'a mut ActionExecutedContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        (**self).on_action_executed(ctx)
    }
}

impl<T: ResultFilter + ?Sized> ResultFilter for Arc<T> {
    fn on_result_executing<'a>(
        &'a self,
        ctx: &'a mut ResultExecutingContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        (**self).on_result_executing(ctx)
    }

    fn on_result_executed<'a>(
        &'a self,
        ctx: &'a mut ResultExecutedContext<'_>,
    ) -> BoxFuture<'a, FilterResult> {
        (**self).on_result_executed(ctx)
    }
}

// ============================================================================
// External collaborators
// ============================================================================

/// Performs the bound action invocation.
pub trait ActionInvoker: Send + Sync {
    /// Invokes the action with its bound arguments.
    fn invoke<'a>(&'a self, action: &'a ActionContext) -> BoxFuture<'a, Result<ActionOutput, Fault>>;
}

/// An [`ActionInvoker`] backed by a closure. Created with [`action_fn`].
pub struct FnAction<F> {
    func: F,
}

/// Creates an [`ActionInvoker`] from a closure.
///
/// # Example
///
/// ```
/// use bastion_core::{ActionOutput, ActionResult};
/// use bastion_filters::invocation::action_fn;
///
/// let action = action_fn(|_ctx| async { Ok(ActionOutput::from(ActionResult::ok("done"))) });
/// # let _ = action;
/// ```
pub fn action_fn<F, Fut>(func: F) -> FnAction<F>
where
    F: Fn(&ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ActionOutput, Fault>> + Send + 'static,
{
    FnAction { func }
}

impl<F, Fut> ActionInvoker for FnAction<F>
where
    F: Fn(&ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ActionOutput, Fault>> + Send + 'static,
{
    fn invoke<'a>(&'a self, action: &'a ActionContext) -> BoxFuture<'a, Result<ActionOutput, Fault>> {
        Box::pin((self.func)(action))
    }
}

/// Writes the final result to the response.
///
/// The pipeline calls the renderer at most once per request.
pub trait ResultRenderer: Send + Sync {
    /// Renders `result`.
    fn render<'a>(
        &'a self,
        action: &'a ActionContext,
        result: &'a ActionResult,
    ) -> BoxFuture<'a, Result<(), Fault>>;
}
