//! Action results.
//!
//! An [`ActionResult`] is what the pipeline hands to the external renderer.
//! Filters may replace it at several points; the renderer turns the final
//! value into an HTTP response.

use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;

/// The body of an [`ActionResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResultBody {
    /// No body.
    Empty,
    /// A plain-text body.
    Text(String),
    /// A JSON body.
    Json(serde_json::Value),
}

/// The result produced by an action or by a short-circuiting filter.
///
/// # Example
///
/// ```
/// use bastion_core::ActionResult;
/// use http::StatusCode;
///
/// let result = ActionResult::text(StatusCode::FORBIDDEN, "Forbidden");
/// assert_eq!(result.status(), StatusCode::FORBIDDEN);
/// assert_eq!(result.body_text(), Some("Forbidden"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    status: StatusCode,
    headers: HeaderMap,
    body: ResultBody,
}

impl ActionResult {
    /// Creates a result with the given status and body.
    #[must_use]
    pub fn new(status: StatusCode, body: ResultBody) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Creates an empty `200 OK` result.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(StatusCode::OK, ResultBody::Empty)
    }

    /// Creates a body-less result with the given status.
    #[must_use]
    pub fn status_only(status: StatusCode) -> Self {
        Self::new(status, ResultBody::Empty)
    }

    /// Creates a plain-text result.
    #[must_use]
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status, ResultBody::Text(body.into()))
    }

    /// Creates a `200 OK` plain-text result.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::text(StatusCode::OK, body)
    }

    /// Creates a JSON result.
    #[must_use]
    pub fn json(status: StatusCode, value: serde_json::Value) -> Self {
        Self::new(status, ResultBody::Json(value))
    }

    /// Creates a JSON error envelope.
    #[must_use]
    pub fn json_error(status: StatusCode, code: &str, message: &str) -> Self {
        Self::json(
            status,
            serde_json::json!({
                "error": {
                    "code": code,
                    "message": message
                }
            }),
        )
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the headers mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Adds a header, builder style.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &ResultBody {
        &self.body
    }

    /// Returns the body text for text results.
    #[must_use]
    pub fn body_text(&self) -> Option<&str> {
        match &self.body {
            ResultBody::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the JSON body for JSON results.
    #[must_use]
    pub fn body_json(&self) -> Option<&serde_json::Value> {
        match &self.body {
            ResultBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Converts this result into an HTTP response.
    ///
    /// A content type is added for text and JSON bodies unless one is
    /// already present.
    pub fn into_response(self) -> Result<http::Response<Full<Bytes>>, http::Error> {
        let (content_type, bytes) = match self.body {
            ResultBody::Empty => (None, Bytes::new()),
            ResultBody::Text(text) => (Some("text/plain; charset=utf-8"), Bytes::from(text)),
            ResultBody::Json(value) => (Some("application/json"), Bytes::from(value.to_string())),
        };

        let mut builder = http::Response::builder().status(self.status);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers);
            if let Some(content_type) = content_type {
                headers
                    .entry(header::CONTENT_TYPE)
                    .or_insert(HeaderValue::from_static(content_type));
            }
        }
        builder.body(Full::new(bytes))
    }
}

impl Default for ActionResult {
    fn default() -> Self {
        Self::empty()
    }
}
