//! Interceptor chain — ordered aspects composed with onion semantics.
//!
//! An [`Interceptor`] holds an ordered list of aspects. Each aspect
//! receives the per-request [`Context`] and a [`Next`] continuation; work
//! done before `next.run(ctx)` executes in registration order, work done
//! after it executes in reverse order as the inner layers unwind. An aspect
//! that returns without invoking its continuation short-circuits the rest
//! of the chain for that request.
//!
//! ## Core types
//!
//! - [`AspectFn`] — type-erased, cheaply-cloneable aspect function.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`from_fn`] / [`from_aspect`] — build an [`AspectFn`] from an async
//!   closure or an [`Aspect`] trait object.
//! - [`AspectError`] — a failed aspect's error, carrying the context at the
//!   failure point.

use std::{error::Error as StdError, fmt, future::Future, pin::Pin, sync::Arc};

use crate::context::Context;

/// Boxed error type aspects raise through [`Context::fail`].
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Outcome of one aspect invocation: the context, or a failure carrying it.
pub type AspectResult = Result<Context, AspectError>;

/// A type-erased, reference-counted aspect function.
///
/// Every entry in the chain is stored as an `AspectFn`. The [`Arc`] wrapper
/// makes aspects cheap to clone so that [`Next`] can advance through the
/// chain without copying closures. Construct one with [`from_fn`],
/// [`from_aspect`], or the router's registrars.
pub type AspectFn = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = AspectResult> + Send>>
        + Send
        + Sync
        + 'static,
>;

/// Wraps an async closure into an [`AspectFn`].
///
/// # Examples
///
/// ```rust
/// use lamina::{Context, Next, from_fn};
///
/// let aspect = from_fn(|mut ctx: Context, next: Next| async move {
///     ctx.response_mut().set_header("X-Powered-By", "lamina");
///     next.run(ctx).await
/// });
/// # let _ = aspect;
/// ```
pub fn from_fn<F, Fut>(f: F) -> AspectFn
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AspectResult> + Send + 'static,
{
    Arc::new(move |ctx, next| Box::pin(f(ctx, next)))
}

/// The trait form of an aspect, for middleware that carries configuration.
///
/// Implementations receive the context and the continuation and may:
///
/// - **Pass through** — `next.run(ctx).await` unchanged.
/// - **Short-circuit** — mutate the response and return `Ok(ctx)` without
///   invoking `next`.
/// - **Decorate** — `let ctx = next.run(ctx).await?;`, then inspect or
///   mutate the unwound context before returning it.
/// - **Fail** — return `Err(ctx.fail(err))`; the chain logs the error and
///   aborts the traversal.
pub trait Aspect: Send + Sync {
    /// Handle the request and optionally delegate to the rest of the chain.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = AspectResult> + Send>>;
}

/// Converts an [`Aspect`] implementation into an [`AspectFn`].
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
pub fn from_aspect<A>(aspect: Arc<A>) -> AspectFn
where
    A: Aspect + 'static,
{
    Arc::new(move |ctx, next| aspect.handle(ctx, next))
}

/// A cursor into the remaining chain for a single traversal.
///
/// `Next` is consumed by [`run`](Self::run), so a continuation cannot be
/// invoked more than once per aspect invocation. When the cursor has moved
/// past the last aspect, `run` resolves immediately with the context
/// unchanged — the terminal no-op continuation.
pub struct Next {
    aspects: Vec<AspectFn>,
    // Tracks which aspect to invoke on the next `run` call.
    index: usize,
}

impl Next {
    /// Creates a `Next` positioned at the start of the given aspect list.
    pub fn new(aspects: Vec<AspectFn>) -> Self {
        Self { aspects, index: 0 }
    }

    /// Invokes the next aspect in the chain, passing `ctx` onward.
    ///
    /// Advances the internal cursor by one, clones the aspect at the
    /// current position, and awaits it with this cursor as its
    /// continuation.
    pub async fn run(mut self, ctx: Context) -> AspectResult {
        if self.index < self.aspects.len() {
            let aspect = self.aspects[self.index].clone();
            self.index += 1;
            aspect(ctx, self).await
        } else {
            Ok(ctx)
        }
    }
}

/// Error raised by a failing aspect.
///
/// Carries the traversal's [`Context`] at the failure point so
/// [`Interceptor::run`] can return the reached state after catching and
/// logging. Constructed through [`Context::fail`] or [`AspectError::new`].
pub struct AspectError {
    context: Box<Context>,
    source: BoxError,
}

impl AspectError {
    /// Wraps `source` together with the failing traversal's context.
    pub fn new(context: Context, source: impl Into<BoxError>) -> Self {
        Self {
            context: Box::new(context),
            source: source.into(),
        }
    }

    /// The context at the failure point.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Consume the error, yielding the context at the failure point.
    pub fn into_context(self) -> Context {
        *self.context
    }
}

impl fmt::Display for AspectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl fmt::Debug for AspectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectError")
            .field("source", &self.source)
            .field("context", &self.context)
            .finish()
    }
}

impl StdError for AspectError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

/// The interceptor chain.
///
/// Holds the ordered aspect list, immutable once traffic starts; one
/// `Interceptor` serves any number of concurrent traversals, each with its
/// own [`Context`].
///
/// # Examples
///
/// ```rust
/// use lamina::{Context, Interceptor, Next, from_fn};
///
/// let mut chain = Interceptor::new();
/// chain
///     .register(from_fn(|ctx: Context, next: Next| async move {
///         // runs first on the way in, last on the way out
///         next.run(ctx).await
///     }))
///     .register(from_fn(|mut ctx: Context, _next: Next| async move {
///         ctx.response_mut().set_body("done"); // short-circuits
///         Ok(ctx)
///     }));
/// ```
#[derive(Default)]
pub struct Interceptor {
    aspects: Vec<AspectFn>,
}

impl Interceptor {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self {
            aspects: Vec::new(),
        }
    }

    /// Appends an aspect to the chain, returning `&mut Self` for fluent
    /// registration.
    pub fn register(&mut self, aspect: AspectFn) -> &mut Self {
        self.aspects.push(aspect);
        self
    }

    /// Number of registered aspects.
    pub fn len(&self) -> usize {
        self.aspects.len()
    }

    /// `true` if no aspects have been registered.
    pub fn is_empty(&self) -> bool {
        self.aspects.is_empty()
    }

    /// Executes the chain against `ctx`, returning the context once the
    /// traversal has settled.
    ///
    /// A failing aspect aborts the traversal at that point: the failure
    /// propagates outward (enclosing aspects' post-`next` code does not
    /// run), is logged here, and the context is returned in whatever state
    /// it reached. `run` never panics and never surfaces the error to the
    /// caller.
    pub async fn run(&self, ctx: Context) -> Context {
        match Next::new(self.aspects.clone()).run(ctx).await {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::error!(error = %err, "aspect failed; aborting traversal");
                err.into_context()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;

    /// Execution trace shared through the context's extensions.
    #[derive(Default)]
    struct Trace(Vec<String>);

    fn make_context(raw: &[u8]) -> Context {
        let (request, _) = Request::parse(raw).unwrap();
        let mut ctx = Context::new(request);
        ctx.extensions_mut().insert(Trace::default());
        ctx
    }

    fn get_context() -> Context {
        make_context(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
    }

    fn trace_of(ctx: &Context) -> &[String] {
        &ctx.extensions().get::<Trace>().unwrap().0
    }

    fn push(ctx: &mut Context, entry: String) {
        ctx.extensions_mut().get_mut::<Trace>().unwrap().0.push(entry);
    }

    /// An aspect that records `{label}:pre` / `{label}:post` around `next`.
    fn step(label: &'static str) -> AspectFn {
        from_fn(move |mut ctx: Context, next: Next| async move {
            push(&mut ctx, format!("{label}:pre"));
            let mut ctx = next.run(ctx).await?;
            push(&mut ctx, format!("{label}:post"));
            Ok(ctx)
        })
    }

    /// An aspect that records itself and never invokes its continuation.
    fn halt(label: &'static str) -> AspectFn {
        from_fn(move |mut ctx: Context, _next: Next| async move {
            push(&mut ctx, format!("{label}:halt"));
            Ok(ctx)
        })
    }

    /// An aspect that fails after recording itself.
    fn boom(label: &'static str) -> AspectFn {
        from_fn(move |mut ctx: Context, _next: Next| async move {
            push(&mut ctx, format!("{label}:boom"));
            Err(ctx.fail(std::io::Error::other("boom")))
        })
    }

    #[tokio::test]
    async fn empty_chain_returns_context_unchanged() {
        let chain = Interceptor::new();
        let ctx = chain.run(get_context()).await;
        assert!(trace_of(&ctx).is_empty());
        assert!(ctx.route().is_none());
    }

    #[tokio::test]
    async fn onion_ordering() {
        let mut chain = Interceptor::new();
        chain.register(step("a")).register(step("b")).register(step("c"));

        let ctx = chain.run(get_context()).await;
        assert_eq!(
            trace_of(&ctx),
            ["a:pre", "b:pre", "c:pre", "c:post", "b:post", "a:post"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_later_aspects() {
        let mut chain = Interceptor::new();
        chain
            .register(step("a"))
            .register(step("b"))
            .register(halt("c"))
            .register(step("d"));

        let ctx = chain.run(get_context()).await;
        // d never runs; a and b still unwind in reverse order.
        assert_eq!(
            trace_of(&ctx),
            ["a:pre", "b:pre", "c:halt", "b:post", "a:post"]
        );
    }

    #[tokio::test]
    async fn single_failing_aspect_is_caught() {
        let mut chain = Interceptor::new();
        chain.register(boom("a")).register(step("b"));

        // `run` must not panic and must return the reached state.
        let ctx = chain.run(get_context()).await;
        assert_eq!(trace_of(&ctx), ["a:boom"]);
    }

    #[tokio::test]
    async fn failure_skips_enclosing_post_code() {
        let mut chain = Interceptor::new();
        chain.register(step("a")).register(boom("b")).register(step("c"));

        let ctx = chain.run(get_context()).await;
        // The failure propagates through a's `?`, so a:post never runs.
        assert_eq!(trace_of(&ctx), ["a:pre", "b:boom"]);
    }

    #[tokio::test]
    async fn failure_preserves_response_state() {
        let mut chain = Interceptor::new();
        chain
            .register(from_fn(|mut ctx: Context, next: Next| async move {
                ctx.response_mut().set_header("X-Early", "yes");
                next.run(ctx).await
            }))
            .register(from_fn(|ctx: Context, _next: Next| async move {
                Err(ctx.fail(std::io::Error::other("store gone")))
            }));

        let ctx = chain.run(get_context()).await;
        assert_eq!(ctx.response().headers().get("x-early"), Some("yes"));
    }

    #[tokio::test]
    async fn concurrent_traversals_are_independent() {
        let mut chain = Interceptor::new();
        chain.register(step("a")).register(step("b"));
        let chain = Arc::new(chain);

        let (ctx1, ctx2) = tokio::join!(chain.run(get_context()), chain.run(get_context()));
        let expected = ["a:pre", "b:pre", "b:post", "a:post"];
        assert_eq!(trace_of(&ctx1), expected);
        assert_eq!(trace_of(&ctx2), expected);
    }

    #[tokio::test]
    async fn fluent_registration() {
        let mut chain = Interceptor::new();
        chain.register(step("a")).register(step("b")).register(step("c"));
        assert_eq!(chain.len(), 3);
        assert!(!chain.is_empty());
    }

    #[test]
    fn aspect_error_exposes_source() {
        let ctx = get_context();
        let err = ctx.fail(std::io::Error::other("boom"));
        assert_eq!(err.to_string(), "boom");
        assert!(std::error::Error::source(&err).is_some());
    }
}
