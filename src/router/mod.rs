//! Request routing as ordinary middleware.
//!
//! A route is an aspect wrapped in a dispatch guard: it claims the request
//! when the method and path match its pattern and nothing earlier in the
//! chain has claimed it already, and defers to the continuation otherwise.
//! Because routes are plain aspects, they compose with cross-cutting
//! middleware through the one chain mechanism, declaration order gives
//! first-match-wins dispatch, and "no route matched" is simply a traversal
//! that reaches the end of the chain unclaimed.
//!
//! Rules are either path templates with `:name` placeholders or raw
//! regular expressions, anchored to match whole paths:
//!
//! | Rule                      | Example match     | Captured route params        |
//! |---------------------------|-------------------|------------------------------|
//! | `/users`                  | `/users`          | *(empty)*                    |
//! | `/test/:course/:lecture`  | `/test/123/abc`   | `course → "123"`, `lecture → "abc"` |
//! | `.*`                      | anything          | *(empty)* — conventional catch-all, register last |

use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

use crate::context::{Context, Parameters};
use crate::http::Method;
use crate::interceptor::{AspectFn, AspectResult, Next, from_fn};

/// Errors raised when a route rule fails validation at registration time.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid pattern `{rule}`: {source}")]
    Regex {
        rule: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("duplicate parameter `:{name}` in pattern `{rule}`")]
    DuplicateParameter { rule: String, name: String },

    #[error("pattern `{rule}` declares {names} named parameters but captures {captures} groups")]
    CaptureMismatch {
        rule: String,
        names: usize,
        captures: usize,
    },
}

/// A compiled route rule: an anchored regex plus the ordered placeholder names.
///
/// `:name` spans are replaced by `([^/]+)` capture groups; everything else
/// in the rule is passed through as regex source, so a rule may equally be
/// a raw expression such as `.*`.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
    names: Vec<String>,
}

impl Pattern {
    /// Compile and validate a rule string.
    ///
    /// # Errors
    ///
    /// - [`PatternError::DuplicateParameter`] — two placeholders share a name.
    /// - [`PatternError::CaptureMismatch`] — the compiled expression's
    ///   capture-group count differs from the placeholder count (the rule
    ///   contains hand-written groups that would shift the name/value zip).
    /// - [`PatternError::Regex`] — the rule is not valid regex source.
    pub fn parse(rule: &str) -> Result<Self, PatternError> {
        let mut names: Vec<String> = Vec::new();
        let mut source = String::with_capacity(rule.len() + 16);

        let mut rest = rule;
        while let Some(pos) = rest.find(':') {
            let (head, tail) = rest.split_at(pos);
            source.push_str(head);
            let tail = &tail[1..];
            let end = tail.find('/').unwrap_or(tail.len());
            let name = &tail[..end];
            if name.is_empty() {
                // A lone `:` is literal, not a placeholder.
                source.push(':');
                rest = tail;
                continue;
            }
            if names.iter().any(|n| n == name) {
                return Err(PatternError::DuplicateParameter {
                    rule: rule.to_owned(),
                    name: name.to_owned(),
                });
            }
            names.push(name.to_owned());
            source.push_str("([^/]+)");
            rest = &tail[end..];
        }
        source.push_str(rest);

        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| PatternError::Regex {
            rule: rule.to_owned(),
            source: Box::new(e),
        })?;

        let captures = regex.captures_len() - 1;
        if captures != names.len() {
            return Err(PatternError::CaptureMismatch {
                rule: rule.to_owned(),
                names: names.len(),
                captures,
            });
        }

        Ok(Self { regex, names })
    }

    /// Match `path` against this pattern.
    ///
    /// On match, zips placeholder names with captured substrings into
    /// [`Parameters`] — empty when the pattern has no placeholders. `None`
    /// means no match.
    pub fn matches(&self, path: &str) -> Option<Parameters> {
        let caps = self.regex.captures(path)?;
        let mut params = Parameters::new();
        for (i, name) in self.names.iter().enumerate() {
            if let Some(m) = caps.get(i + 1) {
                params.insert(name.clone(), m.as_str());
            }
        }
        Some(params)
    }

    /// The placeholder names declared by this pattern, in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Wraps a user aspect in the dispatch guard for `method` + `rule`.
///
/// The guard claims the request — records the match result with
/// [`Context::set_route`] and invokes the user aspect — only when no
/// earlier aspect has claimed this traversal, the method matches (`None`
/// is method-agnostic), and the path matches the rule. Otherwise it defers
/// to the continuation untouched, so later aspects still see the request.
///
/// # Errors
///
/// Returns [`PatternError`] when the rule fails validation.
pub fn route<F, Fut>(method: Option<Method>, rule: &str, aspect: F) -> Result<AspectFn, PatternError>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AspectResult> + Send + 'static,
{
    let pattern = Arc::new(Pattern::parse(rule)?);
    let aspect = from_fn(aspect);

    Ok(from_fn(move |ctx: Context, next: Next| {
        let pattern = Arc::clone(&pattern);
        let method = method.clone();
        let aspect = Arc::clone(&aspect);
        async move {
            let method_ok = match &method {
                None => true,
                Some(m) => ctx.request().method() == m,
            };
            if ctx.route().is_none() && method_ok {
                if let Some(params) = pattern.matches(ctx.request().path()) {
                    let mut ctx = ctx;
                    ctx.set_route(params);
                    return aspect(ctx, next).await;
                }
            }
            next.run(ctx).await
        }
    }))
}

/// Registers routed aspects under a common base path.
///
/// A `Router` is a factory for guard-wrapped aspects; registering its
/// output on the chain is the caller's job, in the order dispatch should
/// try them.
///
/// # Examples
///
/// ```rust
/// use lamina::{Context, Interceptor, Next, Router, StatusCode};
///
/// # fn main() -> Result<(), lamina::PatternError> {
/// let router = Router::with_base("/api");
/// let mut chain = Interceptor::new();
///
/// chain.register(router.get("/items/:id", |mut ctx: Context, _next: Next| async move {
///     let id = ctx.route().and_then(|r| r.get("id")).unwrap_or("?").to_owned();
///     ctx.response_mut().set_body(id);
///     Ok(ctx)
/// })?);
///
/// // Conventional not-found handler: method-agnostic catch-all, registered last.
/// chain.register(router.all(".*", |mut ctx: Context, _next: Next| async move {
///     ctx.response_mut().set_status(StatusCode::NotFound);
///     Ok(ctx)
/// })?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Router {
    base: String,
}

impl Router {
    /// A router with no base prefix.
    pub fn new() -> Self {
        Self {
            base: String::new(),
        }
    }

    /// A router that prepends `base` to every registered rule.
    pub fn with_base(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Wrap an aspect for `GET` requests matching `rule`.
    pub fn get<F, Fut>(&self, rule: &str, aspect: F) -> Result<AspectFn, PatternError>
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AspectResult> + Send + 'static,
    {
        route(Some(Method::Get), &self.join(rule), aspect)
    }

    /// Wrap an aspect for `POST` requests matching `rule`.
    pub fn post<F, Fut>(&self, rule: &str, aspect: F) -> Result<AspectFn, PatternError>
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AspectResult> + Send + 'static,
    {
        route(Some(Method::Post), &self.join(rule), aspect)
    }

    /// Wrap an aspect for `PUT` requests matching `rule`.
    pub fn put<F, Fut>(&self, rule: &str, aspect: F) -> Result<AspectFn, PatternError>
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AspectResult> + Send + 'static,
    {
        route(Some(Method::Put), &self.join(rule), aspect)
    }

    /// Wrap an aspect for `DELETE` requests matching `rule`.
    pub fn delete<F, Fut>(&self, rule: &str, aspect: F) -> Result<AspectFn, PatternError>
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AspectResult> + Send + 'static,
    {
        route(Some(Method::Delete), &self.join(rule), aspect)
    }

    /// Wrap an aspect matching `rule` under any HTTP method.
    pub fn all<F, Fut>(&self, rule: &str, aspect: F) -> Result<AspectFn, PatternError>
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AspectResult> + Send + 'static,
    {
        route(None, &self.join(rule), aspect)
    }

    // Joins the base prefix and a rule with exactly one separating slash.
    fn join(&self, rule: &str) -> String {
        if self.base.is_empty() {
            return rule.to_owned();
        }
        format!(
            "{}/{}",
            self.base.trim_end_matches('/'),
            rule.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Body, Request};
    use crate::interceptor::Interceptor;

    fn make_context(method: &str, target: &str) -> Context {
        let raw = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req)
    }

    /// A routed aspect body that stamps `label` into the response.
    fn body_tag(
        label: &'static str,
    ) -> impl Fn(Context, Next) -> std::pin::Pin<Box<dyn Future<Output = AspectResult> + Send>>
    + Send
    + Sync
    + 'static {
        move |mut ctx: Context, _next: Next| {
            Box::pin(async move {
                ctx.response_mut().set_body(label);
                Ok(ctx)
            })
        }
    }

    // ── Pattern::parse ────────────────────────────────────────────────────────

    #[test]
    fn parse_extracts_names_in_order() {
        let pat = Pattern::parse("/test/:course/:lecture").unwrap();
        assert_eq!(pat.names(), ["course", "lecture"]);
    }

    #[test]
    fn parse_literal_rule_has_no_names() {
        let pat = Pattern::parse("/users").unwrap();
        assert!(pat.names().is_empty());
    }

    #[test]
    fn parse_rejects_duplicate_names() {
        let err = Pattern::parse("/a/:id/b/:id").unwrap_err();
        assert!(matches!(err, PatternError::DuplicateParameter { name, .. } if name == "id"));
    }

    #[test]
    fn parse_rejects_hand_written_groups() {
        // One capture group, zero placeholder names: the zip would misalign.
        let err = Pattern::parse("/x/(a|b)").unwrap_err();
        assert!(matches!(
            err,
            PatternError::CaptureMismatch {
                names: 0,
                captures: 1,
                ..
            }
        ));
    }

    #[test]
    fn parse_rejects_invalid_regex() {
        assert!(matches!(
            Pattern::parse("/x/("),
            Err(PatternError::Regex { .. })
        ));
    }

    #[test]
    fn lone_colon_is_literal() {
        let pat = Pattern::parse("/a:/b").unwrap();
        assert!(pat.names().is_empty());
        assert!(pat.matches("/a:/b").is_some());
    }

    // ── Pattern::matches ──────────────────────────────────────────────────────

    #[test]
    fn match_extracts_placeholder_values() {
        let pat = Pattern::parse("/test/:course/:lecture").unwrap();
        let params = pat.matches("/test/123/abc").unwrap();
        assert_eq!(params.get("course"), Some("123"));
        assert_eq!(params.get("lecture"), Some("abc"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn match_without_placeholders_is_empty_not_none() {
        let pat = Pattern::parse("/users").unwrap();
        let params = pat.matches("/users").unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn non_match_is_none() {
        let pat = Pattern::parse("/users/:id").unwrap();
        assert!(pat.matches("/posts/42").is_none());
        assert!(pat.matches("/users").is_none());
        assert!(pat.matches("/users/42/extra").is_none());
    }

    #[test]
    fn matching_is_anchored() {
        let pat = Pattern::parse("/a").unwrap();
        assert!(pat.matches("/a").is_some());
        assert!(pat.matches("/ab").is_none());
        assert!(pat.matches("/x/a").is_none());
    }

    #[test]
    fn raw_regex_rule() {
        let pat = Pattern::parse(".*").unwrap();
        assert!(pat.matches("/anything/at/all").is_some());
        assert!(pat.matches("/").is_some());
    }

    #[test]
    fn placeholder_does_not_cross_segments() {
        let pat = Pattern::parse("/users/:id").unwrap();
        assert!(pat.matches("/users/42/posts").is_none());
    }

    // ── route guard ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn guard_records_route_params() {
        let mut chain = Interceptor::new();
        chain.register(
            route(
                Some(Method::Get),
                "/items/:id",
                |mut ctx: Context, _next: Next| async move {
                    let id = ctx.route().and_then(|r| r.get("id")).unwrap().to_owned();
                    ctx.response_mut().set_body(id);
                    Ok(ctx)
                },
            )
            .unwrap(),
        );

        let ctx = chain.run(make_context("GET", "/items/42")).await;
        assert_eq!(ctx.route().unwrap().get("id"), Some("42"));
    }

    #[tokio::test]
    async fn guard_filters_on_method() {
        let mut chain = Interceptor::new();
        chain.register(route(Some(Method::Post), "/submit", body_tag("posted")).unwrap());

        let ctx = chain.run(make_context("GET", "/submit")).await;
        assert!(ctx.route().is_none());

        let ctx = chain.run(make_context("POST", "/submit")).await;
        assert!(ctx.route().is_some());
    }

    #[tokio::test]
    async fn method_agnostic_route_matches_any_method() {
        let mut chain = Interceptor::new();
        chain.register(route(None, "/thing", body_tag("any")).unwrap());

        for method in ["GET", "POST", "DELETE"] {
            let ctx = chain.run(make_context(method, "/thing")).await;
            assert!(ctx.route().is_some(), "{method} should match");
        }
    }

    #[tokio::test]
    async fn first_match_wins() {
        let mut chain = Interceptor::new();
        chain
            .register(route(Some(Method::Get), "/path/:a", body_tag("first")).unwrap())
            .register(route(Some(Method::Get), "/path/:b", body_tag("second")).unwrap());

        let ctx = chain.run(make_context("GET", "/path/x")).await;
        // Only the first guard claims; its params are the recorded ones.
        assert_eq!(ctx.route().unwrap().get("a"), Some("x"));
        assert!(ctx.route().unwrap().get("b").is_none());
        match ctx.response().body_ref() {
            Body::Text(s) => assert_eq!(s, "first"),
            other => panic!("expected text body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unmatched_guard_defers_to_chain() {
        let mut chain = Interceptor::new();
        chain
            .register(route(Some(Method::Get), "/a", body_tag("h1")).unwrap())
            .register(route(None, ".*", body_tag("h2")).unwrap());

        let ctx = chain.run(make_context("GET", "/b")).await;
        assert!(ctx.route().is_some());
        match ctx.response().body_ref() {
            Body::Text(s) => assert_eq!(s, "h2"),
            other => panic!("expected text body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unclaimed_traversal_reaches_chain_end() {
        let mut chain = Interceptor::new();
        chain.register(route(Some(Method::Get), "/only", body_tag("h")).unwrap());

        let ctx = chain.run(make_context("GET", "/other")).await;
        assert!(ctx.route().is_none());
        assert!(matches!(ctx.response().body_ref(), Body::Empty));
    }

    // ── Router ────────────────────────────────────────────────────────────────

    #[test]
    fn join_handles_slashes() {
        assert_eq!(Router::new().join("/x"), "/x");
        assert_eq!(Router::with_base("/api").join("/x"), "/api/x");
        assert_eq!(Router::with_base("/api/").join("x"), "/api/x");
        assert_eq!(Router::with_base("/api").join(".*"), "/api/.*");
    }

    #[tokio::test]
    async fn base_prefix_applies_to_rules() {
        let router = Router::with_base("/api");
        let mut chain = Interceptor::new();
        chain.register(
            router
                .get("/items/:id", |mut ctx: Context, _next: Next| async move {
                    let id = ctx.route().and_then(|r| r.get("id")).unwrap().to_owned();
                    ctx.response_mut().set_body(id);
                    Ok(ctx)
                })
                .unwrap(),
        );

        let ctx = chain.run(make_context("GET", "/api/items/7")).await;
        assert_eq!(ctx.route().unwrap().get("id"), Some("7"));

        let ctx = chain.run(make_context("GET", "/items/7")).await;
        assert!(ctx.route().is_none());
    }

    #[tokio::test]
    async fn invalid_rule_surfaces_at_registration() {
        let router = Router::new();
        let result = router.get("/a/:x/:x", body_tag("dup"));
        assert!(result.is_err());
    }
}
