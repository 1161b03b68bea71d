//! Filter registrations per scope.
//!
//! Global filters live in a [`FilterCatalog`] built once at startup.
//! Controller and action registrations travel with the action as
//! [`DeclaredFilters`]. [`FilterCatalog::collect`] merges the three into
//! the flat list the resolver orders.

use crate::descriptor::FilterDescriptor;
use crate::filter::Filter;
use bastion_core::FilterScope;
use std::sync::Arc;

/// Globally registered filters.
#[derive(Debug, Clone, Default)]
pub struct FilterCatalog {
    global: Arc<[FilterDescriptor]>,
}

impl FilterCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building a catalog.
    pub fn builder() -> FilterCatalogBuilder {
        FilterCatalogBuilder::default()
    }

    /// Global registrations, in registration order.
    pub fn global(&self) -> &[FilterDescriptor] {
        &self.global
    }

    /// Collects every filter that applies to one action.
    ///
    /// Each declared descriptor is forced to the scope it was declared at.
    /// The same filter registered at several scopes appears once per
    /// registration.
    pub fn collect(&self, declared: &DeclaredFilters) -> Vec<FilterDescriptor> {
        let mut all =
            Vec::with_capacity(self.global.len() + declared.controller.len() + declared.action.len());
        all.extend(
            self.global
                .iter()
                .cloned()
                .map(|d| d.with_scope(FilterScope::Global)),
        );
        all.extend(
            declared
                .controller
                .iter()
                .cloned()
                .map(|d| d.with_scope(FilterScope::Controller)),
        );
        all.extend(
            declared
                .action
                .iter()
                .cloned()
                .map(|d| d.with_scope(FilterScope::Action)),
        );
        all
    }
}

/// Builder for [`FilterCatalog`].
#[derive(Debug, Default)]
#[must_use]
pub struct FilterCatalogBuilder {
    global: Vec<FilterDescriptor>,
}

impl FilterCatalogBuilder {
    /// Registers a global filter instance.
    pub fn filter(self, filter: Filter) -> Self {
        self.descriptor(FilterDescriptor::instance(FilterScope::Global, filter))
    }

    /// Registers a global filter instance with an explicit order.
    pub fn filter_with_order(self, filter: Filter, order: i32) -> Self {
        self.descriptor(FilterDescriptor::instance(FilterScope::Global, filter).with_order(order))
    }

    /// Registers a global descriptor.
    pub fn descriptor(mut self, descriptor: FilterDescriptor) -> Self {
        self.global.push(descriptor.with_scope(FilterScope::Global));
        self
    }

    /// Builds the catalog.
    pub fn build(self) -> FilterCatalog {
        FilterCatalog {
            global: self.global.into(),
        }
    }
}

/// Filters declared on a controller and on an action.
#[derive(Debug, Clone, Default)]
pub struct DeclaredFilters {
    controller: Vec<FilterDescriptor>,
    action: Vec<FilterDescriptor>,
}

impl DeclaredFilters {
    /// No declared filters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a controller-level filter.
    #[must_use]
    pub fn controller(mut self, filter: Filter) -> Self {
        self.controller
            .push(FilterDescriptor::instance(FilterScope::Controller, filter));
        self
    }

    /// Declares an action-level filter.
    #[must_use]
    pub fn action(mut self, filter: Filter) -> Self {
        self.action
            .push(FilterDescriptor::instance(FilterScope::Action, filter));
        self
    }

    /// Declares a controller-level descriptor.
    #[must_use]
    pub fn controller_descriptor(mut self, descriptor: FilterDescriptor) -> Self {
        self.controller.push(descriptor);
        self
    }

    /// Declares an action-level descriptor.
    #[must_use]
    pub fn action_descriptor(mut self, descriptor: FilterDescriptor) -> Self {
        self.action.push(descriptor);
        self
    }

    /// Whether nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.controller.is_empty() && self.action.is_empty()
    }
}
