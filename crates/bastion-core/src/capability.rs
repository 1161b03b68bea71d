//! Filter capabilities.
//!
//! A filter participates in one or more pipeline phases. Rather than
//! modelling this through a type hierarchy, each filter exposes a
//! [`CapabilitySet`] and the executor asks, phase by phase, whether the
//! filter has the capability it needs.

use std::fmt;

/// One phase a filter can take part in.
///
/// The discriminants follow the nesting of the pipeline, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Capability {
    /// Runs first; may deny the request by setting a result.
    Authorization = 0,
    /// Wraps everything after authorization with before/after callbacks.
    Resource = 1,
    /// Observes faults raised inside the guarded core.
    Exception = 2,
    /// Wraps the action invocation.
    Action = 3,
    /// Wraps rendering of the result.
    Result = 4,
}

impl Capability {
    /// Returns the capability name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::Resource => "resource",
            Self::Exception => "exception",
            Self::Action => "action",
            Self::Result => "result",
        }
    }

    /// Returns all capabilities in nesting order.
    #[must_use]
    pub const fn all() -> [Capability; 5] {
        [
            Self::Authorization,
            Self::Resource,
            Self::Exception,
            Self::Action,
            Self::Result,
        ]
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of [`Capability`] values.
///
/// # Example
///
/// ```
/// use bastion_core::{Capability, CapabilitySet};
///
/// let set = CapabilitySet::empty()
///     .with(Capability::Action)
///     .with(Capability::Result);
///
/// assert!(set.contains(Capability::Action));
/// assert!(!set.contains(Capability::Exception));
/// assert_eq!(set.to_string(), "action|result");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// Creates an empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Creates a set containing every capability.
    #[must_use]
    pub const fn all() -> Self {
        Self(0b1_1111)
    }

    /// Returns a copy of this set with `capability` added.
    #[must_use]
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    /// Adds a capability to the set.
    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    /// Returns true if the set contains `capability`.
    #[must_use]
    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates over the capabilities in nesting order.
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::all().into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(Capability::name).collect();
        f.write_str(&names.join("|"))
    }
}
