//! Per-request context threaded through the interceptor chain.
//!
//! A [`Context`] is created fresh for each inbound request, handed to the
//! first aspect, and passed from layer to layer by value. The known
//! capabilities of the core — the route claim and the parsed parameters —
//! are first-class typed fields; everything else aspects want to share
//! (cookies, store handles, user info) goes through the type-keyed
//! [`Extensions`] map.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
};

use crate::http::{Request, Response};
use crate::interceptor::{AspectError, BoxError};

/// Type-erased request extensions map — used to inject per-request state
/// into aspects without requiring them to know about each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create a new empty extensions map.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a value, replacing any previous value of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a shared reference to a value by type.
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Get a mutable reference to a value by type.
    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Remove a value by type, returning it if it was present.
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// Named string parameters — route captures or decoded query/form pairs.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    map: HashMap<String, String>,
}

impl Parameters {
    /// Create a new empty parameters map.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a value under a name.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Get a value by name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|value| value.as_str())
    }

    /// Remove a value by name.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(key)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over `(name, value)` pairs, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Per-request state shared by every aspect in one traversal.
///
/// Owned exclusively by the traversal processing it; no two traversals ever
/// share one context.
pub struct Context {
    request: Request,
    response: Response,
    route: Option<Parameters>,
    params: Parameters,
    extensions: Extensions,
}

impl Context {
    /// Create a fresh context for an inbound request.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: Response::default(),
            route: None,
            params: Parameters::new(),
            extensions: Extensions::new(),
        }
    }

    /// The inbound request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The outgoing response.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Mutable access to the outgoing response.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Consume the context, yielding the outgoing response.
    pub fn into_response(self) -> Response {
        self.response
    }

    /// The route claim for this traversal.
    ///
    /// `None` means no router-wrapped aspect has matched yet; `Some` of an
    /// empty [`Parameters`] is a real match whose pattern had no
    /// placeholders.
    pub fn route(&self) -> Option<&Parameters> {
        self.route.as_ref()
    }

    /// Record a route match, claiming the request for the current aspect.
    pub fn set_route(&mut self, params: Parameters) {
        self.route = Some(params);
    }

    /// Decoded query/form parameters (populated by the params aspect).
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Mutable access to the decoded parameters.
    pub fn params_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    /// The type-keyed extensions map.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable access to the extensions map.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Deserialize the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }

    /// Fail the traversal, wrapping `source` together with this context so
    /// the chain can hand the reached state back to the caller.
    ///
    /// ```rust,no_run
    /// # use lamina::{Context, Next};
    /// # async fn aspect(ctx: Context, next: Next) -> lamina::interceptor::AspectResult {
    /// let payload: serde_json::Value = match ctx.json() {
    ///     Ok(value) => value,
    ///     Err(err) => return Err(ctx.fail(err)),
    /// };
    /// # next.run(ctx).await
    /// # }
    /// ```
    pub fn fail(self, source: impl Into<BoxError>) -> AspectError {
        AspectError::new(self, source)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.request.method())
            .field("path", &self.request.path())
            .field("status", &self.response.status())
            .field("route", &self.route)
            .field("params", &self.params)
            .field("extensions", &self.extensions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(raw: &[u8]) -> Request {
        let (req, _) = Request::parse(raw).unwrap();
        req
    }

    #[test]
    fn extensions_round_trip() {
        #[derive(Debug, PartialEq)]
        struct UserInfo(String);

        let mut ext = Extensions::new();
        ext.insert(UserInfo("ada".to_owned()));
        assert_eq!(ext.get::<UserInfo>(), Some(&UserInfo("ada".to_owned())));

        ext.get_mut::<UserInfo>().unwrap().0.push_str("!");
        assert_eq!(ext.remove::<UserInfo>(), Some(UserInfo("ada!".to_owned())));
        assert!(ext.get::<UserInfo>().is_none());
    }

    #[test]
    fn route_sentinel_distinguishes_empty_match() {
        let mut ctx = Context::new(make_request(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"));
        assert!(ctx.route().is_none());

        ctx.set_route(Parameters::new());
        let claimed = ctx.route().unwrap();
        assert!(claimed.is_empty()); // matched, zero captures
    }

    #[test]
    fn json_body() {
        #[derive(serde::Deserialize)]
        struct Task {
            title: String,
        }

        let raw = b"POST /add HTTP/1.1\r\nHost: x\r\nContent-Length: 18\r\n\r\n{\"title\":\"write\"}\n";
        let ctx = Context::new(make_request(raw));
        let task: Task = ctx.json().unwrap();
        assert_eq!(task.title, "write");
    }

    #[test]
    fn fail_carries_context_state() {
        let mut ctx = Context::new(make_request(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"));
        ctx.params_mut().insert("x", "1");

        let err = ctx.fail(std::io::Error::other("store unavailable"));
        assert_eq!(err.to_string(), "store unavailable");
        assert_eq!(err.context().params().get("x"), Some("1"));
    }
}
