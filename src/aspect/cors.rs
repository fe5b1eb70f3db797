//! Cross-Origin Resource Sharing aspect.

use std::pin::Pin;

use crate::context::Context;
use crate::http::{Method, StatusCode};
use crate::interceptor::{Aspect, AspectResult, Next};

/// CORS aspect — validates the `Origin` header, short-circuits preflight
/// requests, and decorates actual responses with `Access-Control-*`
/// headers.
///
/// # Behavior
///
/// - No `Origin` header, or an origin outside the allow-list: the request
///   passes through unmodified.
/// - `OPTIONS` preflight from an allowed origin: short-circuits with
///   `204 No Content` and the `Access-Control-*` headers; downstream
///   aspects never run.
/// - Any other request from an allowed origin: downstream aspects run
///   normally and the CORS headers are appended to the response.
/// - With the wildcard origin `"*"` no `Vary: Origin` header is added; for
///   specific origins it is, so caches key on the echoed origin.
///
/// # Examples
///
/// ```rust
/// use lamina::aspect::Cors;
///
/// let cors = Cors::new()
///     .allow_origin("https://example.com")
///     .allow_method("PATCH")
///     .allow_header("X-Custom-Header");
/// # let _ = cors;
/// ```
pub struct Cors {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
}

impl Default for Cors {
    fn default() -> Self {
        Self::new()
    }
}

impl Cors {
    /// Permissive defaults: all origins (`*`), the common methods
    /// (`GET`, `POST`, `PUT`, `DELETE`), and the common headers
    /// (`Content-Type`, `Authorization`).
    pub fn new() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "PUT".to_string(),
                "DELETE".to_string(),
            ],
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
        }
    }

    /// Adds an allowed origin. When the allow-list contains `"*"`, every
    /// origin is accepted and the response carries
    /// `Access-Control-Allow-Origin: *`.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Adds an allowed HTTP method, sent verbatim in
    /// `Access-Control-Allow-Methods`.
    #[must_use]
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowed_methods.push(method.into());
        self
    }

    /// Adds an allowed request header, sent verbatim in
    /// `Access-Control-Allow-Headers`.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.push(header.into());
        self
    }
}

impl Aspect for Cors {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = AspectResult> + Send>> {
        let allowed_origins = self.allowed_origins.clone();
        let allowed_methods = self.allowed_methods.clone();
        let allowed_headers = self.allowed_headers.clone();

        Box::pin(async move {
            let request_origin = ctx.request().headers().get("origin").map(str::to_owned);
            let is_preflight = ctx.request().method() == &Method::Options;
            let Some(origin) = request_origin else {
                return next.run(ctx).await;
            };

            let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
                "*".to_owned()
            } else if allowed_origins.contains(&origin) {
                origin
            } else {
                return next.run(ctx).await;
            };

            let methods_str = allowed_methods.join(", ");
            let headers_str = allowed_headers.join(", ");
            let is_wildcard = allow_origin == "*";

            if is_preflight {
                let mut ctx = ctx;
                let resp = ctx.response_mut();
                resp.set_status(StatusCode::NoContent);
                resp.set_header("Access-Control-Allow-Origin", allow_origin);
                resp.set_header("Access-Control-Allow-Methods", methods_str);
                resp.set_header("Access-Control-Allow-Headers", headers_str);
                resp.set_header("Access-Control-Max-Age", "3600");
                if !is_wildcard {
                    resp.add_header("Vary", "Origin");
                }
                return Ok(ctx);
            }

            let mut ctx = next.run(ctx).await?;
            let resp = ctx.response_mut();
            resp.add_header("Access-Control-Allow-Origin", allow_origin);
            resp.add_header("Access-Control-Allow-Methods", methods_str);
            resp.add_header("Access-Control-Allow-Headers", headers_str);
            if !is_wildcard {
                resp.add_header("Vary", "Origin");
            }
            Ok(ctx)
        })
    }
}
