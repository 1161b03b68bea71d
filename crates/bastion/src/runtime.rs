//! The filter runtime: configuration, catalog, plan cache and executor.

use std::fmt;
use std::sync::Arc;

use bastion_config::BastionConfig;
use bastion_core::{ActionContext, ActionDescriptor, PipelineError, PipelineResult};
use bastion_filters::{
    resolve, ActionInvoker, DeclaredFilters, FilterCatalog, FilterInstanceResolver, FilterPlan,
    Pipeline, PipelineOptions, PipelineOutcome, ResultRenderer,
};
use dashmap::DashMap;
use http::Response;
use thiserror::Error;
use tracing::debug;

use crate::render::{ResponseBody, ResponseRenderer};

/// Errors returned by [`FilterRuntime::invoke`].
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The pipeline failed: an unhandled fault or a misuse fault.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A result filter suppressed rendering, so there is no response.
    #[error("a result filter suppressed rendering for action '{action}'")]
    NotRendered {
        /// Display name of the action.
        action: String,
    },
}

impl RuntimeError {
    /// Returns the pipeline error, if this is one.
    pub fn pipeline(&self) -> Option<&PipelineError> {
        match self {
            Self::Pipeline(err) => Some(err),
            Self::NotRendered { .. } => None,
        }
    }
}

/// Runs filter pipelines for actions.
///
/// The runtime owns the global filter catalog, the filters each action
/// declares, and an executor configured from [`BastionConfig`]. Actions are
/// identified by their display name (`Controller.Action`). Plans are resolved
/// on first use and cached; registering an action again drops its cached plan.
///
/// # Example
///
/// ```
/// use bastion::FilterRuntime;
/// use bastion_config::BastionConfig;
/// use bastion_core::{ActionDescriptor, PolicyMarker};
/// use bastion_filters::builtin::{CorsFilter, ErrorEnvelopeFilter};
/// use bastion_filters::{DeclaredFilters, FilterCatalog};
///
/// let catalog = FilterCatalog::builder()
///     .filter(CorsFilter::permissive().into_filter())
///     .build();
/// let runtime = FilterRuntime::new(&BastionConfig::default(), catalog);
///
/// let list = ActionDescriptor::new("Users", "List");
/// runtime.register(
///     &list,
///     DeclaredFilters::new().action(ErrorEnvelopeFilter::new().into_filter()),
/// );
///
/// let plan = runtime.plan(&list);
/// assert!(plan.effective(&PolicyMarker::CROSS_ORIGIN).is_ok());
/// assert!(plan.effective(&PolicyMarker::ERROR_ENVELOPE).is_ok());
/// assert_eq!(runtime.cached_plans(), 1);
/// ```
pub struct FilterRuntime {
    pipeline: Pipeline,
    catalog: FilterCatalog,
    declarations: DashMap<String, DeclaredFilters>,
    plans: DashMap<String, Arc<FilterPlan>>,
    plan_cache_capacity: usize,
}

impl FilterRuntime {
    /// Creates a runtime from configuration and a global catalog.
    pub fn new(config: &BastionConfig, catalog: FilterCatalog) -> Self {
        Self::builder().config(config).catalog(catalog).build()
    }

    /// Creates a runtime builder.
    pub fn builder() -> FilterRuntimeBuilder {
        FilterRuntimeBuilder::new()
    }

    /// The executor.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The global filter catalog.
    pub fn catalog(&self) -> &FilterCatalog {
        &self.catalog
    }

    /// Registers the controller and action filters of an action, replacing
    /// any earlier registration for the same display name.
    pub fn register(&self, descriptor: &ActionDescriptor, declared: DeclaredFilters) {
        let key = descriptor.display_name();
        debug!(action = %key, "registering action filters");
        self.declarations.insert(key.clone(), declared);
        self.plans.remove(&key);
    }

    /// Number of registered actions.
    pub fn registered_actions(&self) -> usize {
        self.declarations.len()
    }

    /// Returns the plan for an action, resolving and caching it on first use.
    ///
    /// An action that was never registered runs the global filters only.
    pub fn plan(&self, descriptor: &ActionDescriptor) -> Arc<FilterPlan> {
        let key = descriptor.display_name();
        if let Some(plan) = self.plans.get(&key) {
            return Arc::clone(plan.value());
        }

        let collected = match self.declarations.get(&key) {
            Some(declared) => self.catalog.collect(declared.value()),
            None => self.catalog.collect(&DeclaredFilters::new()),
        };
        let plan = Arc::new(resolve(collected));
        if self.plans.len() < self.plan_cache_capacity {
            debug!(action = %key, filters = plan.len(), "caching filter plan");
            self.plans.insert(key, Arc::clone(&plan));
        }
        plan
    }

    /// Number of cached plans.
    pub fn cached_plans(&self) -> usize {
        self.plans.len()
    }

    /// Drops every cached plan. Registrations are kept.
    pub fn clear_plans(&self) {
        self.plans.clear();
    }

    /// Runs the pipeline for one request with a caller-supplied renderer.
    pub async fn execute(
        &self,
        action: ActionContext,
        invoker: &dyn ActionInvoker,
        renderer: &dyn ResultRenderer,
    ) -> PipelineResult<PipelineOutcome> {
        let plan = self.plan(action.descriptor());
        self.pipeline.execute(&plan, action, invoker, renderer).await
    }

    /// Runs the pipeline for one request and returns the rendered HTTP response.
    pub async fn invoke(
        &self,
        action: ActionContext,
        invoker: &dyn ActionInvoker,
    ) -> Result<Response<ResponseBody>, RuntimeError> {
        let name = action.descriptor().display_name();
        let renderer = ResponseRenderer::new();
        self.execute(action, invoker, &renderer).await?;
        renderer
            .take_response()
            .ok_or(RuntimeError::NotRendered { action: name })
    }
}

impl fmt::Debug for FilterRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRuntime")
            .field("pipeline", &self.pipeline)
            .field("global_filters", &self.catalog.global().len())
            .field("registered_actions", &self.declarations.len())
            .field("cached_plans", &self.plans.len())
            .field("plan_cache_capacity", &self.plan_cache_capacity)
            .finish()
    }
}

/// Builder for [`FilterRuntime`].
#[must_use]
pub struct FilterRuntimeBuilder {
    config: BastionConfig,
    catalog: FilterCatalog,
    resolver: Option<Arc<dyn FilterInstanceResolver>>,
}

impl FilterRuntimeBuilder {
    /// Creates a builder with default configuration and an empty catalog.
    pub fn new() -> Self {
        Self {
            config: BastionConfig::default(),
            catalog: FilterCatalog::new(),
            resolver: None,
        }
    }

    /// Uses the given configuration.
    pub fn config(mut self, config: &BastionConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Uses the given global catalog.
    pub fn catalog(mut self, catalog: FilterCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Uses a custom filter instance resolver.
    pub fn resolver<R: FilterInstanceResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> FilterRuntime {
        let options = PipelineOptions {
            trace_filters: self.config.pipeline.trace_filters,
            record_metrics: self.config.pipeline.record_metrics,
            required_policies: self.config.pipeline.policy_markers(),
        };
        let mut builder = Pipeline::builder().options(options);
        if let Some(resolver) = self.resolver {
            builder = builder.resolver(resolver);
        }

        FilterRuntime {
            pipeline: builder.build(),
            catalog: self.catalog,
            declarations: DashMap::new(),
            plans: DashMap::new(),
            plan_cache_capacity: self.config.pipeline.plan_cache_capacity,
        }
    }
}

impl Default for FilterRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
