//! Filter instances.
//!
//! A [`Filter`] is one named object that participates in the pipeline
//! through any subset of the five capabilities. Each capability is held as
//! its own trait object so the executor can dispatch without knowing the
//! concrete type.

use crate::invocation::{
    ActionFilter, AuthorizationFilter, Blocking, ExceptionFilter, ResourceFilter, ResultFilter,
    SyncActionFilter, SyncAuthorizationFilter, SyncExceptionFilter, SyncResourceFilter,
    SyncResultFilter,
};
use bastion_core::{Capability, CapabilitySet, PolicyMarker};
use std::fmt;
use std::sync::Arc;

/// A filter instance with its capabilities.
#[derive(Clone)]
pub struct Filter {
    name: String,
    order: Option<i32>,
    policies: Vec<PolicyMarker>,
    authorization: Option<Arc<dyn AuthorizationFilter>>,
    resource: Option<Arc<dyn ResourceFilter>>,
    exception: Option<Arc<dyn ExceptionFilter>>,
    action: Option<Arc<dyn ActionFilter>>,
    result: Option<Arc<dyn ResultFilter>>,
}

impl Filter {
    /// Starts building a filter named `name`.
    pub fn builder(name: impl Into<String>) -> FilterBuilder {
        FilterBuilder {
            filter: Filter {
                name: name.into(),
                order: None,
                policies: Vec::new(),
                authorization: None,
                resource: None,
                exception: None,
                action: None,
                result: None,
            },
        }
    }

    /// Filter name, used in logs and error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The order the filter declares for itself, if any.
    pub fn order(&self) -> Option<i32> {
        self.order
    }

    /// Policy markers this filter carries.
    pub fn policies(&self) -> &[PolicyMarker] {
        &self.policies
    }

    /// Whether the filter carries `marker`.
    pub fn has_policy(&self, marker: &PolicyMarker) -> bool {
        self.policies.contains(marker)
    }

    /// The capabilities the filter actually implements.
    pub fn capabilities(&self) -> CapabilitySet {
        let mut caps = CapabilitySet::empty();
        if self.authorization.is_some() {
            caps.insert(Capability::Authorization);
        }
        if self.resource.is_some() {
            caps.insert(Capability::Resource);
        }
        if self.exception.is_some() {
            caps.insert(Capability::Exception);
        }
        if self.action.is_some() {
            caps.insert(Capability::Action);
        }
        if self.result.is_some() {
            caps.insert(Capability::Result);
        }
        caps
    }

    /// Authorization capability.
    pub fn authorization(&self) -> Option<&Arc<dyn AuthorizationFilter>> {
        self.authorization.as_ref()
    }

    /// Resource capability.
    pub fn resource(&self) -> Option<&Arc<dyn ResourceFilter>> {
        self.resource.as_ref()
    }

    /// Exception capability.
    pub fn exception(&self) -> Option<&Arc<dyn ExceptionFilter>> {
        self.exception.as_ref()
    }

    /// Action capability.
    pub fn action(&self) -> Option<&Arc<dyn ActionFilter>> {
        self.action.as_ref()
    }

    /// Result capability.
    pub fn result(&self) -> Option<&Arc<dyn ResultFilter>> {
        self.result.as_ref()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("policies", &self.policies)
            .field("capabilities", &self.capabilities().to_string())
            .finish()
    }
}

/// Builder for [`Filter`].
///
/// # Example
///
/// ```
/// use bastion_core::{Capability, PolicyMarker};
/// use bastion_filters::context::ResourceExecutingContext;
/// use bastion_filters::invocation::{FilterResult, SyncResourceFilter};
/// use bastion_filters::Filter;
///
/// struct Audit;
///
/// impl SyncResourceFilter for Audit {
///     fn on_resource_executing(&self, _ctx: &mut ResourceExecutingContext<'_>) -> FilterResult {
///         Ok(())
///     }
/// }
///
/// let filter = Filter::builder("audit")
///     .order(-10)
///     .policy(PolicyMarker::new("audit"))
///     .sync_resource(Audit)
///     .build();
///
/// assert_eq!(filter.order(), Some(-10));
/// assert!(filter.capabilities().contains(Capability::Resource));
/// ```
#[must_use]
pub struct FilterBuilder {
    filter: Filter,
}

impl FilterBuilder {
    /// Declares the filter's own order. Registration may override it.
    pub fn order(mut self, order: i32) -> Self {
        self.filter.order = Some(order);
        self
    }

    /// Adds a policy marker.
    pub fn policy(mut self, marker: PolicyMarker) -> Self {
        if !self.filter.policies.contains(&marker) {
            self.filter.policies.push(marker);
        }
        self
    }

    /// Sets the authorization capability.
    pub fn authorization<T: AuthorizationFilter>(mut self, filter: T) -> Self {
        self.filter.authorization = Some(Arc::new(filter));
        self
    }

    /// Sets the authorization capability from a blocking implementation.
    pub fn sync_authorization<T: SyncAuthorizationFilter>(self, filter: T) -> Self {
        self.authorization(Blocking(filter))
    }

    /// Sets the resource capability.
    pub fn resource<T: ResourceFilter>(mut self, filter: T) -> Self {
        self.filter.resource = Some(Arc::new(filter));
        self
    }

    /// Sets the resource capability from a blocking implementation.
    pub fn sync_resource<T: SyncResourceFilter>(self, filter: T) -> Self {
        self.resource(Blocking(filter))
    }

    /// Sets the exception capability.
    pub fn exception<T: ExceptionFilter>(mut self, filter: T) -> Self {
        self.filter.exception = Some(Arc::new(filter));
        self
    }

    /// Sets the exception capability from a blocking implementation.
    pub fn sync_exception<T: SyncExceptionFilter>(self, filter: T) -> Self {
        self.exception(Blocking(filter))
    }

    /// Sets the action capability.
    pub fn action<T: ActionFilter>(mut self, filter: T) -> Self {
        self.filter.action = Some(Arc::new(filter));
        self
    }

    /// Sets the action capability from a blocking implementation.
    pub fn sync_action<T: SyncActionFilter>(self, filter: T) -> Self {
        self.action(Blocking(filter))
    }

    /// Sets the result capability.
    pub fn result<T: ResultFilter>(mut self, filter: T) -> Self {
        self.filter.result = Some(Arc::new(filter));
        self
    }

    /// Sets the result capability from a blocking implementation.
    pub fn sync_result<T: SyncResultFilter>(self, filter: T) -> Self {
        self.result(Blocking(filter))
    }

    /// Builds the filter.
    pub fn build(self) -> Filter {
        self.filter
    }
}
