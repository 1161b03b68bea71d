//! Rendering results into HTTP responses.

use bastion_core::{ActionContext, ActionResult, Fault};
use bastion_filters::{BoxFuture, ResultRenderer};
use bytes::Bytes;
use http::header::HeaderValue;
use http::Response;
use http_body_util::Full;
use parking_lot::Mutex;

/// Response body type produced by [`ResponseRenderer`].
pub type ResponseBody = Full<Bytes>;

/// Response header carrying the request ID.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Renders an [`ActionResult`] into an `http::Response` and keeps it for the
/// caller to take.
///
/// One renderer serves one request.
///
/// # Example
///
/// ```
/// use bastion::ResponseRenderer;
/// use bastion_core::{ActionContext, ActionDescriptor, ActionResult};
/// use bastion_filters::ResultRenderer;
///
/// # tokio_test::block_on(async {
/// let renderer = ResponseRenderer::new();
/// let action = ActionContext::new(ActionDescriptor::new("Home", "Index"));
/// renderer.render(&action, &ActionResult::ok("hello")).await.unwrap();
///
/// let response = renderer.take_response().unwrap();
/// assert_eq!(response.status(), 200);
/// assert!(response.headers().contains_key("x-request-id"));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct ResponseRenderer {
    response: Mutex<Option<Response<ResponseBody>>>,
}

impl ResponseRenderer {
    /// Creates an empty renderer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a response has been rendered and not yet taken.
    pub fn has_response(&self) -> bool {
        self.response.lock().is_some()
    }

    /// Takes the rendered response.
    pub fn take_response(&self) -> Option<Response<ResponseBody>> {
        self.response.lock().take()
    }
}

impl ResultRenderer for ResponseRenderer {
    fn render<'a>(
        &'a self,
        action: &'a ActionContext,
        result: &'a ActionResult,
    ) -> BoxFuture<'a, Result<(), Fault>> {
        Box::pin(async move {
            let mut response = result.clone().into_response()?;
            let request_id = HeaderValue::from_str(&action.request_id().to_string())?;
            response
                .headers_mut()
                .entry(REQUEST_ID_HEADER)
                .or_insert(request_id);
            *self.response.lock() = Some(response);
            Ok(())
        })
    }
}
