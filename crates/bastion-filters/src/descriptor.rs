//! Filter registrations.
//!
//! A [`FilterDescriptor`] pairs a filter source with the scope and order it
//! was registered under. Sources are either a ready instance, shared by all
//! requests, or a factory that produces a fresh instance per request.

use crate::filter::Filter;
use bastion_core::{
    ActionContext, CapabilitySet, Fault, FilterScope, PipelineError, PipelineResult, PolicyMarker,
};
use std::fmt;
use std::sync::Arc;

/// Produces filter instances on demand.
pub trait FilterFactory: Send + Sync {
    /// Creates an instance for the given request.
    fn create(&self, action: &ActionContext) -> Result<Filter, Fault>;
}

impl<F> FilterFactory for F
where
    F: Fn(&ActionContext) -> Result<Filter, Fault> + Send + Sync,
{
    fn create(&self, action: &ActionContext) -> Result<Filter, Fault> {
        self(action)
    }
}

/// Where a descriptor gets its instance from.
#[derive(Clone)]
pub enum FilterSource {
    /// A shared instance.
    Instance(Arc<Filter>),
    /// A factory called once per request.
    Factory(Arc<dyn FilterFactory>),
}

impl fmt::Debug for FilterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(filter) => f.debug_tuple("Instance").field(&filter.name()).finish(),
            Self::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// A registered filter.
#[derive(Debug, Clone)]
pub struct FilterDescriptor {
    name: String,
    scope: FilterScope,
    order: i32,
    capabilities: CapabilitySet,
    policies: Vec<PolicyMarker>,
    source: FilterSource,
}

impl FilterDescriptor {
    /// Registers a ready instance.
    ///
    /// The order defaults to the one the filter declares, or 0. Capabilities
    /// and policy markers are taken from the instance.
    pub fn instance(scope: FilterScope, filter: Filter) -> Self {
        Self {
            name: filter.name().to_string(),
            scope,
            order: filter.order().unwrap_or(0),
            capabilities: filter.capabilities(),
            policies: filter.policies().to_vec(),
            source: FilterSource::Instance(Arc::new(filter)),
        }
    }

    /// Registers a factory.
    ///
    /// Factories are only called at execution time, so the capabilities the
    /// produced instance will expose must be declared up front.
    pub fn factory<F>(
        name: impl Into<String>,
        scope: FilterScope,
        capabilities: CapabilitySet,
        factory: F,
    ) -> Self
    where
        F: FilterFactory + 'static,
    {
        Self {
            name: name.into(),
            scope,
            order: 0,
            capabilities,
            policies: Vec::new(),
            source: FilterSource::Factory(Arc::new(factory)),
        }
    }

    /// Overrides the order.
    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Overrides the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: FilterScope) -> Self {
        self.scope = scope;
        self
    }

    /// Adds a policy marker to the registration.
    #[must_use]
    pub fn with_policy(mut self, marker: PolicyMarker) -> Self {
        if !self.policies.contains(&marker) {
            self.policies.push(marker);
        }
        self
    }

    /// Registration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registration scope.
    pub fn scope(&self) -> FilterScope {
        self.scope
    }

    /// Registration order.
    pub fn order(&self) -> i32 {
        self.order
    }

    /// Declared capabilities.
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Policy markers carried by the registration.
    pub fn policies(&self) -> &[PolicyMarker] {
        &self.policies
    }

    /// Whether the registration carries `marker`.
    pub fn has_policy(&self, marker: &PolicyMarker) -> bool {
        self.policies.contains(marker)
    }

    /// Instance source.
    pub fn source(&self) -> &FilterSource {
        &self.source
    }
}

/// Turns a descriptor into the instance used for one request.
pub trait FilterInstanceResolver: Send + Sync {
    /// Returns the instance for `descriptor`.
    fn resolve(
        &self,
        descriptor: &FilterDescriptor,
        action: &ActionContext,
    ) -> PipelineResult<Arc<Filter>>;
}

impl<T: FilterInstanceResolver + ?Sized> FilterInstanceResolver for Arc<T> {
    fn resolve(
        &self,
        descriptor: &FilterDescriptor,
        action: &ActionContext,
    ) -> PipelineResult<Arc<Filter>> {
        (**self).resolve(descriptor, action)
    }
}

/// Default resolver: shares instances, calls factories.
#[derive(Debug, Clone, Copy, Default)]
pub struct FactoryResolver;

impl FilterInstanceResolver for FactoryResolver {
    fn resolve(
        &self,
        descriptor: &FilterDescriptor,
        action: &ActionContext,
    ) -> PipelineResult<Arc<Filter>> {
        match descriptor.source() {
            FilterSource::Instance(filter) => Ok(Arc::clone(filter)),
            FilterSource::Factory(factory) => factory
                .create(action)
                .map(Arc::new)
                .map_err(|e| PipelineError::factory_failed(descriptor.name(), e)),
        }
    }
}
