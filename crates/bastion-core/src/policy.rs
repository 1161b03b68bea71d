//! Effective-policy markers.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Tags a policy of which at most one filter instance may apply per request.
///
/// Several filters carrying the same marker may be registered at different
/// scopes (say a global default and a per-action override). All of them stay
/// in the pipeline, but only the one closest to the action is authoritative;
/// the others must skip their policy logic.
///
/// # Example
///
/// ```
/// use bastion_core::PolicyMarker;
///
/// let marker = PolicyMarker::new("request-size-limit");
/// assert_eq!(marker.as_str(), "request-size-limit");
/// assert_ne!(marker, PolicyMarker::CROSS_ORIGIN);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyMarker(Cow<'static, str>);

impl PolicyMarker {
    /// Cross-origin resource sharing policy.
    pub const CROSS_ORIGIN: PolicyMarker = PolicyMarker::new("cross-origin");

    /// Fault-to-error-envelope conversion policy.
    pub const ERROR_ENVELOPE: PolicyMarker = PolicyMarker::new("error-envelope");

    /// Creates a marker from a static name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a marker from an owned name, e.g. one read from configuration.
    #[must_use]
    pub fn owned(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Returns the marker name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
