//! Filter declaration scopes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The declaration breadth of a filter.
///
/// Scopes are ordered from least specific to most specific. Among filters
/// with equal order, broader scopes run further out in the pipeline.
///
/// # Example
///
/// ```
/// use bastion_core::FilterScope;
///
/// assert!(FilterScope::Global < FilterScope::Controller);
/// assert!(FilterScope::Controller < FilterScope::Action);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterScope {
    /// Registered for every action in the application.
    Global,
    /// Declared on the controller that owns the action.
    Controller,
    /// Declared on the action itself.
    Action,
}

impl FilterScope {
    /// Returns the scope name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Controller => "controller",
            Self::Action => "action",
        }
    }

    /// Returns all scopes, outermost first.
    #[must_use]
    pub const fn all() -> [FilterScope; 3] {
        [Self::Global, Self::Controller, Self::Action]
    }
}

impl fmt::Display for FilterScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
