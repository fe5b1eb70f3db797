//! Built-in aspects — the cross-cutting middleware most services start with.
//!
//! - [`Logger`] — one request/response line per traversal.
//! - [`params`] — decodes query-string and urlencoded-form parameters into
//!   [`Context::params`](crate::Context::params).
//! - [`cookies`] — decodes the `Cookie` header into a typed [`Cookies`] map
//!   in the context extensions.
//! - [`Cors`] — origin allow-lists, preflight short-circuiting, response
//!   header decoration.

use std::collections::HashMap;
use std::pin::Pin;

use tokio::time::Instant;

use crate::context::{Context, Parameters};
use crate::interceptor::{Aspect, AspectFn, AspectResult, Next, from_fn};

mod cors;

pub use cors::Cors;

/// Logs each request's method, path, status, and duration.
///
/// Emits one `tracing` line after the downstream aspects complete, at
/// `info` for success statuses and `warn` otherwise:
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// `Logger` never short-circuits; it always delegates and decorates the
/// timing after the fact. A failure downstream skips the log line — the
/// chain's own error log covers that traversal instead.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use lamina::aspect::Logger;
/// use lamina::from_aspect;
///
/// let aspect = from_aspect(Arc::new(Logger));
/// # let _ = aspect;
/// ```
pub struct Logger;

impl Aspect for Logger {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = AspectResult> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let ctx = next.run(ctx).await?;

            let status = ctx.response().status();
            let duration = start.elapsed();
            if status.is_success() {
                tracing::info!("{} {} - {} ({:?})", method, path, status.as_u16(), duration);
            } else {
                tracing::warn!("{} {} - {} ({:?})", method, path, status.as_u16(), duration);
            }

            Ok(ctx)
        })
    }
}

/// Builds the parameter-decoding aspect.
///
/// Decodes the request's query string and, for
/// `application/x-www-form-urlencoded` bodies, the request body into
/// [`Context::params`](crate::Context::params). Body pairs win over query
/// pairs when names collide. `+` decodes as a space.
///
/// # Examples
///
/// ```rust
/// use lamina::{Interceptor, aspect};
///
/// let mut chain = Interceptor::new();
/// chain.register(aspect::params());
/// ```
pub fn params() -> AspectFn {
    from_fn(|mut ctx: Context, next: Next| async move {
        let mut parsed = Parameters::new();

        if let Some(query) = ctx.request().query_string() {
            decode_pairs(query, &mut parsed);
        }

        let is_form = ctx
            .request()
            .headers()
            .get("content-type")
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if is_form {
            if let Ok(body) = std::str::from_utf8(ctx.request().body()) {
                decode_pairs(body, &mut parsed);
            }
        }

        *ctx.params_mut() = parsed;
        next.run(ctx).await
    })
}

// Decodes `key=value&key2=value2` pairs, `+` as space.
fn decode_pairs(input: &str, out: &mut Parameters) {
    for pair in input.split('&') {
        let mut parts = pair.splitn(2, '=');
        let Some(key) = parts.next() else { continue };
        if key.is_empty() {
            continue;
        }
        let value = parts.next().unwrap_or("");
        out.insert(key.replace('+', " "), value.replace('+', " "));
    }
}

/// Request cookies decoded from the `Cookie` header.
///
/// Inserted into the context extensions by the [`cookies`] aspect; read it
/// back with `ctx.extensions().get::<Cookies>()`.
#[derive(Debug, Default, Clone)]
pub struct Cookies {
    map: HashMap<String, String>,
}

impl Cookies {
    /// Get a cookie value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(|v| v.as_str())
    }

    /// Number of cookies.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// `true` if no cookies were sent.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Builds the cookie-decoding aspect.
///
/// Splits the `Cookie` request header into name/value pairs and stores them
/// as a [`Cookies`] value in the context extensions. An absent header still
/// yields an (empty) `Cookies` entry, so downstream aspects can rely on its
/// presence once this aspect is registered.
pub fn cookies() -> AspectFn {
    from_fn(|mut ctx: Context, next: Next| async move {
        let mut jar = Cookies::default();
        if let Some(header) = ctx.request().headers().get("cookie") {
            for entry in header.split(';') {
                if let Some((name, value)) = entry.trim().split_once('=') {
                    jar.map.insert(name.to_owned(), value.to_owned());
                }
            }
        }
        ctx.extensions_mut().insert(jar);
        next.run(ctx).await
    })
}
