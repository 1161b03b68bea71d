//! Onion-nested filter pipeline executor.
//!
//! ## Phases
//!
//! Outermost to innermost:
//!
//! 1. **Authorization** - a result denies the request; nothing else runs
//! 2. **Resource before** - a result skips every inner phase
//! 3. **Guarded core** - the action and result phases; faults raised here
//!    go to the exception filters
//! 4. **Action** - before callbacks, the action, after callbacks in reverse
//! 5. **Result** - before callbacks, one render, after callbacks in reverse
//! 6. **Exception** - exception filters in reverse, only while a fault is in
//!    flight
//! 7. **Resource after** - always, in reverse
//!
//! A filter whose "before" callback returned `Ok` gets its "after"
//! callback, including the one that short-circuited. Callbacks are awaited
//! one at a time; two callbacks of the same request never overlap.
//!
//! The renderer is invoked at most once per request. Results that are
//! rendered outside the result phase (short-circuits, recoveries) go
//! straight to the renderer; no result filter sees them.
//!
//! A cancelled request fails before its first callback. Cancellation
//! observed just before the action is invoked is a fault inside the
//! guarded core, so exception filters can still recover it.

use crate::context::{
    ActionExecutedContext, ActionExecutingContext, AuthorizationContext, ExceptionContext,
    PipelineContext, ResourceExecutedContext, ResourceExecutingContext, ResultExecutedContext,
    ResultExecutingContext,
};
use crate::descriptor::{FactoryResolver, FilterInstanceResolver};
use crate::invocation::{ActionInvoker, ResultRenderer};
use crate::resolver::{FilterItem, FilterPlan, ResolvedFilters};
use bastion_core::{
    ActionContext, ActionResult, Capability, Fault, PipelineError, PipelineResult, PolicyMarker,
    ReturnContractViolation,
};
use bastion_telemetry::metrics::{record_execution, record_fault, record_short_circuit};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

mod phase {
    pub const AUTHORIZATION: &str = "authorization";
    pub const RESOURCE: &str = "resource";
    pub const ACTION: &str = "action";
    pub const RESULT: &str = "result";
    pub const RENDER: &str = "render";
    pub const EXCEPTION: &str = "exception";
}

/// Executor options.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Emit a debug event per filter callback.
    pub trace_filters: bool,
    /// Record pipeline metrics.
    pub record_metrics: bool,
    /// Policies every plan must have an authoritative filter for.
    pub required_policies: Vec<PolicyMarker>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            trace_filters: true,
            record_metrics: true,
            required_policies: Vec::new(),
        }
    }
}

/// Observable end state of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// The final result.
    pub result: Option<ActionResult>,
    /// Whether a "before" callback short-circuited.
    pub canceled: bool,
    /// Whether the renderer was invoked.
    pub rendered: bool,
    /// Whether a result filter suppressed rendering.
    pub render_suppressed: bool,
    /// Whether a fault was raised and then handled.
    pub recovered: bool,
}

/// The filter pipeline executor.
///
/// A pipeline is stateless across requests and can be shared. Each request
/// gets its own [`PipelineContext`].
///
/// # Example
///
/// ```
/// use bastion_core::{ActionContext, ActionDescriptor, ActionOutput, ActionResult};
/// use bastion_filters::invocation::{action_fn, BoxFuture, ResultRenderer};
/// use bastion_filters::{resolve, Pipeline};
///
/// struct Discard;
///
/// impl ResultRenderer for Discard {
///     fn render<'a>(
///         &'a self,
///         _action: &'a ActionContext,
///         _result: &'a ActionResult,
///     ) -> BoxFuture<'a, Result<(), bastion_core::Fault>> {
///         Box::pin(async { Ok(()) })
///     }
/// }
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let pipeline = Pipeline::builder().record_metrics(false).build();
/// let plan = resolve(Vec::new());
/// let action = action_fn(|_| async { Ok(ActionOutput::from(ActionResult::ok("hi"))) });
///
/// let outcome = pipeline
///     .execute(&plan, ActionContext::new(ActionDescriptor::new("Home", "Index")), &action, &Discard)
///     .await
///     .unwrap();
/// assert!(outcome.rendered);
/// # });
/// ```
#[derive(Clone)]
pub struct Pipeline {
    options: PipelineOptions,
    resolver: Arc<dyn FilterInstanceResolver>,
}

impl Pipeline {
    /// Creates a pipeline with default options.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Executor options.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Instantiates `plan` for one request.
    pub fn prepare(&self, plan: &FilterPlan, action: ActionContext) -> PipelineResult<PipelineContext> {
        plan.require_policies(&self.options.required_policies)?;
        let filters = plan.instantiate(self.resolver.as_ref(), &action)?;
        Ok(PipelineContext::new(action, filters))
    }

    /// Prepares and runs the pipeline for one request.
    pub async fn execute(
        &self,
        plan: &FilterPlan,
        action: ActionContext,
        invoker: &dyn ActionInvoker,
        renderer: &dyn ResultRenderer,
    ) -> PipelineResult<PipelineOutcome> {
        let mut ctx = self.prepare(plan, action)?;
        self.run(&mut ctx, invoker, renderer).await
    }

    /// Runs a prepared context.
    ///
    /// Returns [`PipelineError::Unhandled`] carrying the original fault when
    /// no filter handled it, and [`PipelineError::ContextReused`] when the
    /// context already ran.
    pub async fn run(
        &self,
        ctx: &mut PipelineContext,
        invoker: &dyn ActionInvoker,
        renderer: &dyn ResultRenderer,
    ) -> PipelineResult<PipelineOutcome> {
        if ctx.executed {
            return Err(PipelineError::ContextReused {
                request_id: ctx.action.request_id(),
            });
        }
        ctx.executed = true;

        let action = ctx.action.descriptor().display_name();
        let span = info_span!(
            "filter_pipeline",
            request_id = %ctx.action.request_id(),
            action = %action,
            filters = ctx.filters.items().len(),
        );
        let start = Instant::now();

        let result = self.drive(ctx, invoker, renderer).instrument(span).await;

        if self.options.record_metrics {
            let outcome = match &result {
                Err(_) => "unhandled",
                Ok(o) if o.canceled => "short_circuited",
                Ok(o) if o.recovered => "recovered",
                Ok(_) => "rendered",
            };
            record_execution(&action, outcome, start.elapsed());
        }
        result
    }

    async fn drive(
        &self,
        ctx: &mut PipelineContext,
        invoker: &dyn ActionInvoker,
        renderer: &dyn ResultRenderer,
    ) -> PipelineResult<PipelineOutcome> {
        let filters = Arc::clone(&ctx.filters);

        if let Err(fault) = ctx.action.ensure_active() {
            self.raise(ctx, fault, phase::AUTHORIZATION);
            return self.finish(ctx);
        }

        for index in filters.indices(Capability::Authorization) {
            let item = &filters.items()[index];
            let Some(filter) = item.filter().authorization() else {
                continue;
            };
            self.enter(ctx, item, "on_authorization");
            let outcome = filter
                .on_authorization(&mut AuthorizationContext::new(ctx))
                .await;
            ctx.current = None;

            if let Err(fault) = outcome {
                self.raise(ctx, fault, phase::AUTHORIZATION);
                return self.finish(ctx);
            }
            if ctx.canceled {
                self.short_circuit(item, phase::AUTHORIZATION);
                self.render_directly(ctx, renderer).await;
                return self.finish(ctx);
            }
        }

        let mut entered = Vec::new();
        for index in filters.indices(Capability::Resource) {
            let item = &filters.items()[index];
            let Some(filter) = item.filter().resource() else {
                continue;
            };
            self.enter(ctx, item, "on_resource_executing");
            let outcome = filter
                .on_resource_executing(&mut ResourceExecutingContext::new(ctx))
                .await;
            ctx.current = None;

            if let Err(fault) = outcome {
                self.raise(ctx, fault, phase::RESOURCE);
                break;
            }
            entered.push(index);
            if ctx.canceled {
                self.short_circuit(item, phase::RESOURCE);
                break;
            }
        }

        if ctx.exception.is_none() {
            if ctx.canceled {
                self.render_directly(ctx, renderer).await;
            } else {
                self.guarded_core(ctx, &filters, invoker, renderer).await;
            }
        }

        for &index in entered.iter().rev() {
            let item = &filters.items()[index];
            let Some(filter) = item.filter().resource() else {
                continue;
            };
            self.enter(ctx, item, "on_resource_executed");
            let outcome = filter
                .on_resource_executed(&mut ResourceExecutedContext::new(ctx))
                .await;
            ctx.current = None;

            if let Err(fault) = outcome {
                self.raise(ctx, fault, phase::RESOURCE);
            }
        }
        self.settle(ctx);

        if ctx.exception.is_none() && !ctx.render_done() {
            self.render_directly(ctx, renderer).await;
        }

        self.finish(ctx)
    }

    async fn guarded_core(
        &self,
        ctx: &mut PipelineContext,
        filters: &ResolvedFilters,
        invoker: &dyn ActionInvoker,
        renderer: &dyn ResultRenderer,
    ) {
        self.action_phase(ctx, filters, invoker).await;
        if ctx.exception.is_none() {
            self.result_phase(ctx, filters, renderer).await;
        }
        if ctx.exception.is_some() {
            self.exception_phase(ctx, filters).await;
            self.settle(ctx);
            if ctx.exception.is_none() && !ctx.render_done() {
                self.render_directly(ctx, renderer).await;
            }
        }
    }

    async fn action_phase(
        &self,
        ctx: &mut PipelineContext,
        filters: &ResolvedFilters,
        invoker: &dyn ActionInvoker,
    ) {
        let mut entered = Vec::new();
        let mut proceed = true;
        for index in filters.indices(Capability::Action) {
            let item = &filters.items()[index];
            let Some(filter) = item.filter().action() else {
                continue;
            };
            self.enter(ctx, item, "on_action_executing");
            let outcome = filter
                .on_action_executing(&mut ActionExecutingContext::new(ctx))
                .await;
            ctx.current = None;

            if let Err(fault) = outcome {
                self.raise(ctx, fault, phase::ACTION);
                proceed = false;
                break;
            }
            entered.push(index);
            if ctx.canceled {
                self.short_circuit(item, phase::ACTION);
                proceed = false;
                break;
            }
        }

        if proceed {
            let invoked = self.invoke_action(ctx, invoker).await;
            match invoked {
                Ok(result) => ctx.result = Some(result),
                Err(fault) => self.raise(ctx, fault, phase::ACTION),
            }
        }

        for &index in entered.iter().rev() {
            let item = &filters.items()[index];
            let Some(filter) = item.filter().action() else {
                continue;
            };
            self.enter(ctx, item, "on_action_executed");
            let outcome = filter
                .on_action_executed(&mut ActionExecutedContext::new(ctx))
                .await;
            ctx.current = None;

            if let Err(fault) = outcome {
                self.raise(ctx, fault, phase::ACTION);
            }
        }
        self.settle(ctx);
    }

    async fn invoke_action(
        &self,
        ctx: &PipelineContext,
        invoker: &dyn ActionInvoker,
    ) -> Result<ActionResult, Fault> {
        if self.options.trace_filters {
            debug!("invoking action");
        }
        ctx.action.ensure_active()?;
        let output = invoker.invoke(&ctx.action).await?;

        let declared = ctx.action.descriptor().return_kind();
        if output.kind() != declared {
            return Err(ReturnContractViolation {
                action: ctx.action.descriptor().display_name(),
                declared,
                produced: output.kind(),
            }
            .into());
        }
        Ok(output.into_result())
    }

    async fn result_phase(
        &self,
        ctx: &mut PipelineContext,
        filters: &ResolvedFilters,
        renderer: &dyn ResultRenderer,
    ) {
        let mut entered = Vec::new();
        let mut proceed = true;
        for index in filters.indices(Capability::Result) {
            let item = &filters.items()[index];
            let Some(filter) = item.filter().result() else {
                continue;
            };
            self.enter(ctx, item, "on_result_executing");
            let outcome = filter
                .on_result_executing(&mut ResultExecutingContext::new(ctx))
                .await;
            ctx.current = None;

            if let Err(fault) = outcome {
                self.raise(ctx, fault, phase::RESULT);
                proceed = false;
                break;
            }
            entered.push(index);
            if ctx.result_canceled {
                self.short_circuit(item, phase::RESULT);
                proceed = false;
                break;
            }
        }

        if proceed {
            self.render(ctx, renderer).await;
        }

        for &index in entered.iter().rev() {
            let item = &filters.items()[index];
            let Some(filter) = item.filter().result() else {
                continue;
            };
            self.enter(ctx, item, "on_result_executed");
            let outcome = filter
                .on_result_executed(&mut ResultExecutedContext::new(ctx))
                .await;
            ctx.current = None;

            if let Err(fault) = outcome {
                self.raise(ctx, fault, phase::RESULT);
            }
        }
        self.settle(ctx);
    }

    /// Renders a short-circuit or recovery result without result filters.
    async fn render_directly(&self, ctx: &mut PipelineContext, renderer: &dyn ResultRenderer) {
        if self.options.trace_filters {
            debug!("rendering outside the result phase");
        }
        self.render(ctx, renderer).await;
        self.settle(ctx);
    }

    async fn render(&self, ctx: &mut PipelineContext, renderer: &dyn ResultRenderer) {
        ctx.rendered = true;
        let result = ctx.result.get_or_insert_with(ActionResult::empty);
        let rendered = renderer.render(&ctx.action, result).await;
        if let Err(fault) = rendered {
            self.raise(ctx, fault, phase::RENDER);
        }
    }

    async fn exception_phase(&self, ctx: &mut PipelineContext, filters: &ResolvedFilters) {
        for index in filters.indices(Capability::Exception).into_iter().rev() {
            let item = &filters.items()[index];
            let Some(filter) = item.filter().exception() else {
                continue;
            };
            self.enter(ctx, item, "on_exception");
            let outcome = filter.on_exception(&mut ExceptionContext::new(ctx)).await;
            ctx.current = None;

            if let Err(fault) = outcome {
                self.raise(ctx, fault, phase::EXCEPTION);
                break;
            }
        }
    }

    fn enter(&self, ctx: &mut PipelineContext, item: &FilterItem, callback: &'static str) {
        ctx.current = Some(item.index());
        if self.options.trace_filters {
            debug!(
                filter = item.name(),
                phase = callback,
                order = item.descriptor().order(),
                scope = %item.descriptor().scope(),
                "invoking filter"
            );
        }
    }

    fn short_circuit(&self, item: &FilterItem, phase: &'static str) {
        info!(filter = item.name(), phase, "filter short-circuited the pipeline");
        if self.options.record_metrics {
            record_short_circuit(phase);
        }
    }

    fn raise(&self, ctx: &mut PipelineContext, fault: Fault, phase: &'static str) {
        if self.options.trace_filters {
            debug!(phase, error = %fault, "fault raised");
        }
        ctx.set_exception(fault, phase);
    }

    fn settle(&self, ctx: &mut PipelineContext) {
        if ctx.exception.is_some() && ctx.exception_handled {
            let phase = ctx.fault_phase.unwrap_or(phase::ACTION);
            warn!(phase, error = ?ctx.exception, "fault handled by filter");
            if self.options.record_metrics {
                record_fault(phase, true);
            }
        }
        ctx.settle();
    }

    fn finish(&self, ctx: &mut PipelineContext) -> PipelineResult<PipelineOutcome> {
        if let Some(fault) = ctx.exception.take() {
            let phase = ctx.fault_phase.take().unwrap_or(phase::ACTION);
            error!(phase, error = %fault, "unhandled fault");
            if self.options.record_metrics {
                record_fault(phase, false);
            }
            return Err(PipelineError::unhandled(
                ctx.action.descriptor().display_name(),
                fault,
            ));
        }

        Ok(PipelineOutcome {
            result: ctx.result.clone(),
            canceled: ctx.canceled,
            rendered: ctx.rendered,
            render_suppressed: ctx.result_canceled,
            recovered: ctx.recovered,
        })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Pipeline`].
#[must_use]
pub struct PipelineBuilder {
    options: PipelineOptions,
    resolver: Arc<dyn FilterInstanceResolver>,
}

impl PipelineBuilder {
    /// Creates a builder with default options and the [`FactoryResolver`].
    pub fn new() -> Self {
        Self {
            options: PipelineOptions::default(),
            resolver: Arc::new(FactoryResolver),
        }
    }

    /// Replaces all options.
    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Enables or disables per-callback debug events.
    pub fn trace_filters(mut self, enabled: bool) -> Self {
        self.options.trace_filters = enabled;
        self
    }

    /// Enables or disables metrics.
    pub fn record_metrics(mut self, enabled: bool) -> Self {
        self.options.record_metrics = enabled;
        self
    }

    /// Requires an authoritative filter for `marker` in every plan.
    pub fn require_policy(mut self, marker: PolicyMarker) -> Self {
        if !self.options.required_policies.contains(&marker) {
            self.options.required_policies.push(marker);
        }
        self
    }

    /// Uses a custom instance resolver.
    pub fn resolver<R: FilterInstanceResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Builds the pipeline.
    pub fn build(self) -> Pipeline {
        Pipeline {
            options: self.options,
            resolver: self.resolver,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
