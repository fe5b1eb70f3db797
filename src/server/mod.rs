//! Async TCP server using Tokio.
//!
//! Accepts connections, parses HTTP/1.1 requests, and drives each one
//! through the interceptor chain. Supports persistent connections
//! (keep-alive) out of the box.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::http::{
    Body, StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::interceptor::{AspectFn, Interceptor};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Hook run against every freshly created context, before the chain.
///
/// This is where startup-constructed collaborators (store handles,
/// configuration) are injected into the traversal:
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # #[derive(Clone)]
/// # struct Store;
/// # async fn example() -> Result<(), lamina::ServerError> {
/// let store = Arc::new(Store);
/// let mut server = lamina::Server::bind("127.0.0.1:8080").await?;
/// server.context_init(move |ctx| {
///     ctx.extensions_mut().insert(Arc::clone(&store));
/// });
/// # Ok(())
/// # }
/// ```
pub type ContextInit = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The lamina HTTP server.
///
/// Owns the interceptor chain; [`register`](Self::register) appends aspects
/// and [`run`](Self::run) starts accepting connections. Each request gets a
/// fresh [`Context`] (seeded by the [`context_init`](Self::context_init)
/// hook, if any), the chain runs it, and the resulting response is
/// serialized back. A traversal that finishes with a `200` status and no
/// body set yields the default `"200 OK"` text body.
///
/// # Examples
///
/// ```rust,no_run
/// use lamina::{Context, Next, Server, from_fn};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut server = Server::bind("127.0.0.1:8080").await?;
///     server.register(from_fn(|mut ctx: Context, _next: Next| async move {
///         ctx.response_mut().set_body("Hello!");
///         Ok(ctx)
///     }));
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    interceptor: Interceptor,
    context_init: Option<ContextInit>,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            interceptor: Interceptor::new(),
            context_init: None,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Appends an aspect to the server's chain, returning `&mut Self` for
    /// fluent registration.
    pub fn register(&mut self, aspect: AspectFn) -> &mut Self {
        self.interceptor.register(aspect);
        self
    }

    /// Sets the context-initialization hook (see [`ContextInit`]).
    pub fn context_init<F>(&mut self, init: F) -> &mut Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.context_init = Some(Arc::new(init));
        self
    }

    /// Starts accepting connections and running requests through the chain.
    ///
    /// Runs until the process is terminated or an unrecoverable listener
    /// error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            listener,
            local_addr,
            interceptor,
            context_init,
        } = self;
        let interceptor = Arc::new(interceptor);
        info!(address = %local_addr, "lamina listening");

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let interceptor = Arc::clone(&interceptor);
            let context_init = context_init.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, interceptor, context_init).await
                {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection or signals
/// `Connection: close`.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    interceptor: Arc<Interceptor>,
    context_init: Option<ContextInit>,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        // Guard against excessively large requests.
        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large — sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }

        // Attempt to parse the buffered data as an HTTP request.
        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                // Headers not yet fully received — read more data.
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set.
        let content_length = request.content_length().unwrap_or(0);
        let total_needed = body_offset + content_length;
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let mut ctx = Context::new(request);
        if let Some(init) = &context_init {
            init(&mut ctx);
        }
        let ctx = interceptor.run(ctx).await;

        let mut response = ctx.into_response();
        // Default response for a traversal no aspect claimed.
        if matches!(response.body_ref(), Body::Empty) && response.status() == StatusCode::Ok {
            response.set_body("200 OK");
        }
        let response = response.keep_alive(keep_alive);

        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        // Drop the consumed request bytes from the buffer.
        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            break;
        }
    }

    Ok(())
}
