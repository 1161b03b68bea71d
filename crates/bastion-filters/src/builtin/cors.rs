//! Cross-origin resource sharing filter.
//!
//! [`CorsFilter`] answers preflight requests during authorization and adds
//! CORS headers to results passing through the result phase. Results that
//! short-circuit an outer phase are rendered as set. It carries [`PolicyMarker::CROSS_ORIGIN`], so when a global default and a
//! per-action override are both registered only the one closest to the
//! action applies its configuration.
//!
//! ## Example
//!
//! ```
//! use bastion_filters::builtin::CorsFilter;
//! use http::Method;
//! use std::time::Duration;
//!
//! let cors = CorsFilter::builder()
//!     .allow_origin("https://app.example.com")
//!     .allow_methods([Method::GET, Method::POST])
//!     .allow_headers(["Content-Type", "Authorization"])
//!     .allow_credentials(true)
//!     .max_age(Duration::from_secs(3600))
//!     .build();
//!
//! let filter = cors.into_filter();
//! assert_eq!(filter.name(), "cors");
//! ```

use crate::context::{AuthorizationContext, PhaseContext, ResultExecutingContext};
use crate::filter::Filter;
use crate::invocation::{FilterResult, SyncAuthorizationFilter, SyncResultFilter};
use bastion_core::{ActionContext, ActionResult, PolicyMarker};
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Expose-Headers` header.
    pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
    /// `Access-Control-Request-Method` header (preflight).
    pub const REQUEST_METHOD: &str = "access-control-request-method";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// Represents the set of allowed origins.
#[derive(Debug, Clone)]
pub enum AllowedOrigins {
    /// Allow any origin (wildcard `*`).
    Any,
    /// Allow specific origins.
    List(HashSet<String>),
}

impl AllowedOrigins {
    /// Checks if an origin is allowed.
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(origins) => origins.contains(origin),
        }
    }

    /// Returns the `Access-Control-Allow-Origin` value for `origin`.
    pub fn header_value(&self, origin: &str) -> Option<HeaderValue> {
        match self {
            AllowedOrigins::Any => Some(HeaderValue::from_static("*")),
            AllowedOrigins::List(origins) if origins.contains(origin) => {
                HeaderValue::from_str(origin).ok()
            }
            AllowedOrigins::List(_) => None,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    allowed_origins: AllowedOrigins,
    allowed_methods: HashSet<Method>,
    allowed_headers: HashSet<String>,
    expose_headers: HashSet<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: AllowedOrigins::List(HashSet::new()),
            allowed_methods: HashSet::from([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
            ]),
            allowed_headers: HashSet::from([
                "content-type".to_string(),
                "authorization".to_string(),
                "x-request-id".to_string(),
            ]),
            expose_headers: HashSet::new(),
            allow_credentials: false,
            max_age: Some(Duration::from_secs(86400)),
        }
    }
}

/// Builder for [`CorsFilter`].
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct CorsBuilder {
    config: CorsConfig,
    order: Option<i32>,
}

impl CorsBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows any origin (wildcard `*`).
    ///
    /// Browsers reject `*` together with credentials.
    pub fn allow_any_origin(mut self) -> Self {
        self.config.allowed_origins = AllowedOrigins::Any;
        self
    }

    /// Adds an allowed origin.
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        if let AllowedOrigins::List(origins) = &mut self.config.allowed_origins {
            origins.insert(origin.into());
        }
        self
    }

    /// Sets the allowed origins.
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_origins =
            AllowedOrigins::List(origins.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the allowed HTTP methods.
    pub fn allow_methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = Method>,
    {
        self.config.allowed_methods = methods.into_iter().collect();
        self
    }

    /// Sets the allowed request headers. `*` allows any header.
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_headers = headers
            .into_iter()
            .map(|h| h.into().to_lowercase())
            .collect();
        self
    }

    /// Sets headers exposed to scripts.
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.expose_headers = headers
            .into_iter()
            .map(|h| h.into().to_lowercase())
            .collect();
        self
    }

    /// Sets whether credentials are allowed.
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.config.allow_credentials = allow;
        self
    }

    /// Sets how long browsers may cache preflight responses.
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.config.max_age = Some(duration);
        self
    }

    /// Disables preflight caching.
    pub fn no_max_age(mut self) -> Self {
        self.config.max_age = None;
        self
    }

    /// Overrides the filter order (default [`CorsFilter::DEFAULT_ORDER`]).
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Builds the filter.
    pub fn build(self) -> CorsFilter {
        CorsFilter {
            config: Arc::new(self.config),
            order: self.order.unwrap_or(CorsFilter::DEFAULT_ORDER),
        }
    }
}

/// Cross-origin policy filter.
#[derive(Debug, Clone)]
pub struct CorsFilter {
    config: Arc<CorsConfig>,
    order: i32,
}

impl CorsFilter {
    /// Runs before ordinary filters so preflights skip them.
    pub const DEFAULT_ORDER: i32 = -1000;

    /// Creates a builder.
    pub fn builder() -> CorsBuilder {
        CorsBuilder::new()
    }

    /// Allows any origin, method and header. For development only.
    pub fn permissive() -> Self {
        CorsBuilder::new()
            .allow_any_origin()
            .allow_methods([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::OPTIONS,
            ])
            .allow_headers(["*"])
            .expose_headers(["*"])
            .build()
    }

    /// The configuration.
    pub fn config(&self) -> &CorsConfig {
        &self.config
    }

    /// Wraps the filter as a pipeline [`Filter`] with the cross-origin marker.
    pub fn into_filter(self) -> Filter {
        Filter::builder("cors")
            .order(self.order)
            .policy(PolicyMarker::CROSS_ORIGIN)
            .sync_authorization(self.clone())
            .sync_result(self)
            .build()
    }

    fn is_preflight(action: &ActionContext) -> bool {
        action.method() == Method::OPTIONS
            && action.headers().contains_key(headers::ORIGIN)
            && action.headers().contains_key(headers::REQUEST_METHOD)
    }

    /// Builds the answer to a preflight request.
    pub fn preflight(&self, action: &ActionContext) -> ActionResult {
        let Some(origin) = action.header(headers::ORIGIN) else {
            return Self::forbidden("Missing Origin header");
        };
        if !self.config.allowed_origins.is_allowed(origin) {
            return Self::forbidden("Origin not allowed");
        }

        if let Some(method) = action
            .header(headers::REQUEST_METHOD)
            .and_then(|m| m.parse::<Method>().ok())
        {
            if !self.config.allowed_methods.contains(&method) {
                return Self::forbidden("Method not allowed");
            }
        }

        if let Some(requested) = action.header(headers::REQUEST_HEADERS) {
            if !self.config.allowed_headers.contains("*") {
                for header in requested.split(',').map(|h| h.trim().to_lowercase()) {
                    if !header.is_empty() && !self.config.allowed_headers.contains(&header) {
                        return Self::forbidden(&format!("Header '{header}' not allowed"));
                    }
                }
            }
        }

        let mut result = ActionResult::status_only(StatusCode::NO_CONTENT);
        let map = result.headers_mut();
        if let Some(value) = self.config.allowed_origins.header_value(origin) {
            map.insert(HeaderName::from_static(headers::ALLOW_ORIGIN), value);
        }

        let mut methods: Vec<_> = self.config.allowed_methods.iter().map(Method::as_str).collect();
        methods.sort_unstable();
        insert_list(map, headers::ALLOW_METHODS, &methods);

        let mut allowed: Vec<_> = self.config.allowed_headers.iter().map(String::as_str).collect();
        allowed.sort_unstable();
        insert_list(map, headers::ALLOW_HEADERS, &allowed);

        if self.config.allow_credentials {
            map.insert(
                HeaderName::from_static(headers::ALLOW_CREDENTIALS),
                HeaderValue::from_static("true"),
            );
        }
        if let Some(max_age) = self.config.max_age {
            map.insert(HeaderName::from_static(headers::MAX_AGE), max_age.as_secs().into());
        }
        map.insert(
            HeaderName::from_static(headers::VARY),
            HeaderValue::from_static(
                "Origin, Access-Control-Request-Method, Access-Control-Request-Headers",
            ),
        );
        result
    }

    /// Adds CORS headers to the result of an ordinary request.
    pub fn decorate(&self, origin: &str, result: &mut ActionResult) {
        let Some(value) = self.config.allowed_origins.header_value(origin) else {
            return;
        };
        let map = result.headers_mut();
        map.insert(HeaderName::from_static(headers::ALLOW_ORIGIN), value);

        if self.config.allow_credentials {
            map.insert(
                HeaderName::from_static(headers::ALLOW_CREDENTIALS),
                HeaderValue::from_static("true"),
            );
        }

        let mut exposed: Vec<_> = self.config.expose_headers.iter().map(String::as_str).collect();
        exposed.sort_unstable();
        insert_list(map, headers::EXPOSE_HEADERS, &exposed);

        map.insert(HeaderName::from_static(headers::VARY), HeaderValue::from_static("Origin"));
    }

    fn forbidden(message: &str) -> ActionResult {
        ActionResult::text(StatusCode::FORBIDDEN, message)
    }
}

fn insert_list(map: &mut HeaderMap, name: &'static str, values: &[&str]) {
    if values.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&values.join(", ")) {
        map.insert(HeaderName::from_static(name), value);
    }
}

impl SyncAuthorizationFilter for CorsFilter {
    fn on_authorization(&self, ctx: &mut AuthorizationContext<'_>) -> FilterResult {
        if !ctx.is_effective_policy(&PolicyMarker::CROSS_ORIGIN) || !Self::is_preflight(ctx.action())
        {
            return Ok(());
        }
        let result = self.preflight(ctx.action());
        ctx.set_result(result);
        Ok(())
    }
}

impl SyncResultFilter for CorsFilter {
    fn on_result_executing(&self, ctx: &mut ResultExecutingContext<'_>) -> FilterResult {
        if !ctx.is_effective_policy(&PolicyMarker::CROSS_ORIGIN) || Self::is_preflight(ctx.action()) {
            return Ok(());
        }
        let Some(origin) = ctx.action().header(headers::ORIGIN).map(str::to_string) else {
            return Ok(());
        };
        if let Some(result) = ctx.result_mut() {
            self.decorate(&origin, result);
        }
        Ok(())
    }
}
