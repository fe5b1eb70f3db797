//! # lamina
//!
//! A layered async middleware ("interceptor") and routing framework for
//! HTTP/1.1 services, written from scratch in Rust.
//!
//! Requests travel through an ordered chain of aspects with onion-style
//! semantics: code before an aspect's call to [`Next::run`] executes in
//! registration order, code after it executes in reverse order as the chain
//! unwinds. Routing is itself an aspect — [`Router`] wraps a handler in a
//! guard that claims the request when method and path match and passes it
//! through otherwise, so routes compose with cross-cutting middleware using
//! one mechanism.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lamina::{Context, Next, Router, Server, aspect};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::new();
//!     let mut server = Server::bind("127.0.0.1:8080").await?;
//!
//!     server.register(aspect::params());
//!     server.register(router.get("/items/:id", |mut ctx: Context, _next: Next| async move {
//!         let id = ctx.route().and_then(|r| r.get("id")).unwrap_or("?").to_owned();
//!         ctx.response_mut().set_body(format!("item {id}"));
//!         Ok(ctx)
//!     })?);
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod aspect;
pub mod context;
pub mod http;
pub mod interceptor;
pub mod router;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use context::{Context, Extensions, Parameters};
pub use http::{Body, Headers, Method, Request, Response, StatusCode};
pub use interceptor::{
    Aspect, AspectError, AspectFn, AspectResult, Interceptor, Next, from_aspect, from_fn,
};
pub use router::{Pattern, PatternError, Router, route};
pub use server::{Server, ServerError};
