//! The selected action and its per-request context.
//!
//! The pipeline starts after action selection and argument binding have
//! completed. [`ActionContext`] carries their outputs: which action runs,
//! what it declared it returns, its bound arguments, the request head and
//! the ambient cancellation signal.

use crate::error::{Fault, RequestCancelled};
use crate::result::ActionResult;
use http::{HeaderMap, Method, Uri};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it suitable for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an action declares it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    /// The action builds its own [`ActionResult`].
    #[default]
    Result,
    /// The action returns a JSON value, rendered as `200 OK` JSON.
    Value,
    /// The action returns nothing, rendered as an empty result.
    Unit,
}

/// What an action invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    /// A fully formed result.
    Result(ActionResult),
    /// A value to be wrapped in a JSON result.
    Value(serde_json::Value),
    /// Nothing.
    Unit,
}

impl ActionOutput {
    /// Returns the [`ReturnKind`] this output satisfies.
    #[must_use]
    pub const fn kind(&self) -> ReturnKind {
        match self {
            Self::Result(_) => ReturnKind::Result,
            Self::Value(_) => ReturnKind::Value,
            Self::Unit => ReturnKind::Unit,
        }
    }

    /// Converts the output into a result.
    #[must_use]
    pub fn into_result(self) -> ActionResult {
        match self {
            Self::Result(result) => result,
            Self::Value(value) => ActionResult::json(http::StatusCode::OK, value),
            Self::Unit => ActionResult::empty(),
        }
    }
}

impl From<ActionResult> for ActionOutput {
    fn from(result: ActionResult) -> Self {
        Self::Result(result)
    }
}

impl From<serde_json::Value> for ActionOutput {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

/// Describes the selected action.
///
/// # Example
///
/// ```
/// use bastion_core::{ActionDescriptor, ReturnKind};
///
/// let action = ActionDescriptor::new("Users", "Get").returns(ReturnKind::Value);
/// assert_eq!(action.display_name(), "Users.Get");
/// assert_eq!(action.return_kind(), ReturnKind::Value);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionDescriptor {
    controller: String,
    action: String,
    return_kind: ReturnKind,
}

impl ActionDescriptor {
    /// Creates a descriptor for `controller.action` returning an [`ActionResult`].
    #[must_use]
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
            return_kind: ReturnKind::Result,
        }
    }

    /// Sets the declared return contract.
    #[must_use]
    pub fn returns(mut self, return_kind: ReturnKind) -> Self {
        self.return_kind = return_kind;
        self
    }

    /// Returns the controller name.
    #[must_use]
    pub fn controller(&self) -> &str {
        &self.controller
    }

    /// Returns the action name.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Returns the declared return contract.
    #[must_use]
    pub fn return_kind(&self) -> ReturnKind {
        self.return_kind
    }

    /// Returns `Controller.Action`.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.controller, self.action)
    }
}

/// Per-request action state visible to every filter.
///
/// # Example
///
/// ```
/// use bastion_core::{ActionContext, ActionDescriptor};
/// use http::Method;
///
/// let mut ctx = ActionContext::new(ActionDescriptor::new("Users", "Get"))
///     .with_method(Method::GET)
///     .with_argument("id", serde_json::json!(42))
///     .with_roles(["reader"]);
///
/// assert_eq!(ctx.argument("id"), Some(&serde_json::json!(42)));
/// assert!(ctx.has_role("reader"));
///
/// ctx.arguments_mut().insert("verbose".to_string(), serde_json::json!(true));
/// assert_eq!(ctx.arguments().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ActionContext {
    request_id: RequestId,
    descriptor: ActionDescriptor,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    arguments: IndexMap<String, serde_json::Value>,
    roles: Vec<String>,
    cancellation: CancellationToken,
}

impl ActionContext {
    /// Creates a context for a `GET /` request to the given action.
    #[must_use]
    pub fn new(descriptor: ActionDescriptor) -> Self {
        Self {
            request_id: RequestId::new(),
            descriptor,
            method: Method::GET,
            uri: Uri::from_static("/"),
            headers: HeaderMap::new(),
            arguments: IndexMap::new(),
            roles: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Sets the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Sets the request method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request URI.
    #[must_use]
    pub fn with_uri(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    /// Sets the request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Adds a bound argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Sets the caller's roles.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Uses the given cancellation token as the ambient request signal.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the action descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a request header as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the bound arguments.
    #[must_use]
    pub fn arguments(&self) -> &IndexMap<String, serde_json::Value> {
        &self.arguments
    }

    /// Returns the bound arguments mutably.
    pub fn arguments_mut(&mut self) -> &mut IndexMap<String, serde_json::Value> {
        &mut self.arguments
    }

    /// Returns a single bound argument.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&serde_json::Value> {
        self.arguments.get(name)
    }

    /// Returns the caller's roles.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Returns true if the caller has `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Returns the request cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns true once the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with [`RequestCancelled`] once the request has been cancelled.
    ///
    /// Filters call this at their suspension points to fail fast.
    pub fn ensure_active(&self) -> Result<(), Fault> {
        if self.is_cancelled() {
            return Err(RequestCancelled {
                request_id: self.request_id,
            }
            .into());
        }
        Ok(())
    }
}
