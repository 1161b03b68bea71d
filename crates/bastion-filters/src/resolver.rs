//! Ordering and effective-policy resolution.
//!
//! [`resolve`] turns the collected registrations for one action into a
//! [`FilterPlan`]:
//!
//! - filters are sorted by `order` ascending, then by scope (Global before
//!   Controller before Action);
//! - the sort is stable, so equal keys keep their declaration sequence;
//! - for every policy marker, the last filter in that sequence carrying
//!   it is authoritative. It is the one closest to the action.
//!
//! A plan holds no per-request state and can be cached per action.
//! [`FilterPlan::instantiate`] produces the [`ResolvedFilters`] one request
//! executes against.

use crate::descriptor::{FilterDescriptor, FilterInstanceResolver};
use crate::filter::Filter;
use bastion_core::{ActionContext, Capability, PipelineError, PipelineResult, PolicyMarker};
use std::collections::HashMap;
use std::sync::Arc;

/// Orders `descriptors` and computes the authoritative filter per marker.
pub fn resolve(mut descriptors: Vec<FilterDescriptor>) -> FilterPlan {
    // `sort_by_key` is stable.
    descriptors.sort_by_key(|d| (d.order(), d.scope()));

    let mut effective = HashMap::new();
    for (index, descriptor) in descriptors.iter().enumerate() {
        for marker in descriptor.policies() {
            effective.insert(marker.clone(), index);
        }
    }

    FilterPlan {
        descriptors,
        effective,
    }
}

/// An ordered filter list for one action.
#[derive(Debug, Clone, Default)]
pub struct FilterPlan {
    descriptors: Vec<FilterDescriptor>,
    effective: HashMap<PolicyMarker, usize>,
}

impl FilterPlan {
    /// Descriptors in execution order.
    pub fn descriptors(&self) -> &[FilterDescriptor] {
        &self.descriptors
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the plan has no filters.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// The authoritative filter for `marker`.
    pub fn effective(&self, marker: &PolicyMarker) -> PipelineResult<&FilterDescriptor> {
        self.effective
            .get(marker)
            .map(|&index| &self.descriptors[index])
            .ok_or_else(|| PipelineError::NoEffectivePolicy {
                marker: marker.clone(),
            })
    }

    /// Fails if any of `markers` has no authoritative filter.
    pub fn require_policies(&self, markers: &[PolicyMarker]) -> PipelineResult<()> {
        for marker in markers {
            self.effective(marker)?;
        }
        Ok(())
    }

    /// Obtains an instance for every descriptor.
    ///
    /// Fails when the resolver fails or when an instance does not expose
    /// exactly the capabilities its descriptor declares.
    pub fn instantiate(
        &self,
        resolver: &dyn FilterInstanceResolver,
        action: &ActionContext,
    ) -> PipelineResult<ResolvedFilters> {
        let mut items = Vec::with_capacity(self.descriptors.len());
        for (index, descriptor) in self.descriptors.iter().enumerate() {
            let filter = resolver.resolve(descriptor, action)?;
            if filter.capabilities() != descriptor.capabilities() {
                return Err(PipelineError::CapabilityMismatch {
                    filter: descriptor.name().to_string(),
                    declared: descriptor.capabilities(),
                    resolved: filter.capabilities(),
                });
            }
            let authoritative = self
                .effective
                .iter()
                .filter(|(_, &i)| i == index)
                .map(|(marker, _)| marker.clone())
                .collect();
            items.push(FilterItem {
                index,
                descriptor: descriptor.clone(),
                filter,
                authoritative,
            });
        }

        Ok(ResolvedFilters {
            items,
            effective: self.effective.clone(),
        })
    }
}

/// One filter instance in a request's pipeline.
#[derive(Debug, Clone)]
pub struct FilterItem {
    index: usize,
    descriptor: FilterDescriptor,
    filter: Arc<Filter>,
    authoritative: Vec<PolicyMarker>,
}

impl FilterItem {
    /// Position in the pipeline.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Registration this item came from.
    pub fn descriptor(&self) -> &FilterDescriptor {
        &self.descriptor
    }

    /// The instance.
    pub fn filter(&self) -> &Arc<Filter> {
        &self.filter
    }

    /// Registration name.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Whether this item is authoritative for `marker`.
    pub fn is_effective_policy(&self, marker: &PolicyMarker) -> bool {
        self.authoritative.contains(marker)
    }
}

/// The instantiated pipeline for one request.
#[derive(Debug, Clone, Default)]
pub struct ResolvedFilters {
    items: Vec<FilterItem>,
    effective: HashMap<PolicyMarker, usize>,
}

impl ResolvedFilters {
    /// An empty pipeline.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All items in execution order.
    pub fn items(&self) -> &[FilterItem] {
        &self.items
    }

    /// Item at `index`.
    pub fn get(&self, index: usize) -> Option<&FilterItem> {
        self.items.get(index)
    }

    /// Positions of items exposing `capability`, in execution order.
    pub fn indices(&self, capability: Capability) -> Vec<usize> {
        self.items
            .iter()
            .filter(|item| item.descriptor.capabilities().contains(capability))
            .map(|item| item.index)
            .collect()
    }

    /// The authoritative item for `marker`, if any.
    pub fn effective(&self, marker: &PolicyMarker) -> Option<&FilterItem> {
        self.effective.get(marker).map(|&index| &self.items[index])
    }
}
