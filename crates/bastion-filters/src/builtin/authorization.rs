//! Role-based authorization filter.
//!
//! [`RoleAuthorizationFilter`] decides per action whether the caller's roles
//! permit the call. A denial becomes the pipeline result: `401` for callers
//! without roles, `403` for callers whose roles do not cover the action.
//!
//! Actions are identified by their display name (`Controller.Action`).
//!
//! # Example
//!
//! ```
//! use bastion_filters::builtin::RoleAuthorizationFilter;
//!
//! // Allow all requests (development mode)
//! let allow_all = RoleAuthorizationFilter::allow_all();
//!
//! // Role-based access
//! let rbac = RoleAuthorizationFilter::roles()
//!     .allow_role("admin", ["*"])
//!     .allow_role("user", ["Users.Get", "Users.List"])
//!     .allow_anonymous_actions(["Health.Check"])
//!     .build();
//!
//! let filter = rbac.into_filter();
//! assert_eq!(filter.name(), "authorization");
//! ```

use crate::context::{AuthorizationContext, PhaseContext};
use crate::filter::Filter;
use crate::invocation::{FilterResult, SyncAuthorizationFilter};
use bastion_core::{ActionContext, ActionResult};
use http::StatusCode;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Decides whether a call is allowed.
pub trait AccessEvaluator: Send + Sync + fmt::Debug {
    /// Evaluates the call described by `action`.
    fn evaluate(&self, action: &ActionContext) -> AccessDecision;
}

/// Authorization outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The call is allowed.
    Allow,
    /// The caller is not authenticated.
    Unauthenticated {
        /// Why the call was rejected.
        reason: String,
    },
    /// The caller is authenticated but not permitted.
    Deny {
        /// Why the call was rejected.
        reason: String,
    },
}

impl AccessDecision {
    /// The result that renders this decision, if it is a rejection.
    pub fn into_result(self) -> Option<ActionResult> {
        match self {
            Self::Allow => None,
            Self::Unauthenticated { reason } => Some(ActionResult::json_error(
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_REQUIRED",
                &reason,
            )),
            Self::Deny { reason } => Some(ActionResult::json_error(
                StatusCode::FORBIDDEN,
                "AUTHORIZATION_DENIED",
                &reason,
            )),
        }
    }
}

#[derive(Debug, Clone)]
enum AuthorizationMode {
    AllowAll,
    DenyAll,
    Roles(Arc<RoleConfig>),
    Custom(Arc<dyn AccessEvaluator>),
}

#[derive(Debug, Default)]
struct RoleConfig {
    /// Role name to permitted actions. `*` permits every action.
    role_permissions: HashMap<String, HashSet<String>>,
    anonymous_actions: HashSet<String>,
    allow_anonymous: bool,
}

impl RoleConfig {
    fn evaluate(&self, action: &ActionContext) -> AccessDecision {
        let name = action.descriptor().display_name();

        if action.roles().is_empty() {
            if self.allow_anonymous || self.anonymous_actions.contains(&name) {
                return AccessDecision::Allow;
            }
            return AccessDecision::Unauthenticated {
                reason: "Anonymous access not permitted".to_string(),
            };
        }

        let permitted = action.roles().iter().any(|role| {
            self.role_permissions
                .get(role)
                .is_some_and(|actions| actions.contains("*") || actions.contains(&name))
        });
        if permitted {
            return AccessDecision::Allow;
        }

        AccessDecision::Deny {
            reason: format!("No permission for action '{name}' with roles {:?}", action.roles()),
        }
    }
}

/// Authorization filter backed by static roles or a custom evaluator.
#[derive(Debug, Clone)]
pub struct RoleAuthorizationFilter {
    mode: AuthorizationMode,
}

impl RoleAuthorizationFilter {
    /// Allows every request.
    pub fn allow_all() -> Self {
        Self {
            mode: AuthorizationMode::AllowAll,
        }
    }

    /// Denies every request.
    pub fn deny_all() -> Self {
        Self {
            mode: AuthorizationMode::DenyAll,
        }
    }

    /// Starts a role-based configuration.
    pub fn roles() -> RoleBuilder {
        RoleBuilder::default()
    }

    /// Uses a custom evaluator.
    pub fn custom<E: AccessEvaluator + 'static>(evaluator: E) -> Self {
        Self {
            mode: AuthorizationMode::Custom(Arc::new(evaluator)),
        }
    }

    /// Evaluates access for `action`.
    pub fn evaluate(&self, action: &ActionContext) -> AccessDecision {
        match &self.mode {
            AuthorizationMode::AllowAll => AccessDecision::Allow,
            AuthorizationMode::DenyAll => AccessDecision::Deny {
                reason: "Authorization denied (deny-all mode)".to_string(),
            },
            AuthorizationMode::Roles(config) => config.evaluate(action),
            AuthorizationMode::Custom(evaluator) => evaluator.evaluate(action),
        }
    }

    /// Wraps the filter as a pipeline [`Filter`].
    pub fn into_filter(self) -> Filter {
        Filter::builder("authorization")
            .sync_authorization(self)
            .build()
    }
}

impl SyncAuthorizationFilter for RoleAuthorizationFilter {
    fn on_authorization(&self, ctx: &mut AuthorizationContext<'_>) -> FilterResult {
        let decision = self.evaluate(ctx.action());
        if let Some(result) = decision.into_result() {
            info!(
                action = %ctx.action().descriptor().display_name(),
                status = result.status().as_u16(),
                "request denied"
            );
            ctx.set_result(result);
        }
        Ok(())
    }
}

/// Builder for role-based authorization.
#[derive(Debug, Default)]
#[must_use]
pub struct RoleBuilder {
    config: RoleConfig,
}

impl RoleBuilder {
    /// Permits `role` to call `actions`. Use `["*"]` for every action.
    pub fn allow_role<S, I>(mut self, role: S, actions: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let actions: HashSet<String> = actions.into_iter().map(Into::into).collect();
        self.config.role_permissions.insert(role.into(), actions);
        self
    }

    /// Permits anonymous callers to call `actions`.
    pub fn allow_anonymous_actions<I>(mut self, actions: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.config
            .anonymous_actions
            .extend(actions.into_iter().map(Into::into));
        self
    }

    /// Permits anonymous callers everywhere.
    pub fn allow_anonymous(mut self) -> Self {
        self.config.allow_anonymous = true;
        self
    }

    /// Builds the filter.
    pub fn build(self) -> RoleAuthorizationFilter {
        RoleAuthorizationFilter {
            mode: AuthorizationMode::Roles(Arc::new(self.config)),
        }
    }
}
