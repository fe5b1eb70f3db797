//! HTTP/1.1 response representation and serialization.
//!
//! A [`Response`] lives inside the per-request context and is mutated in
//! place as aspects run; [`Response::into_bytes`] serializes the final
//! state to the HTTP/1.1 wire format once the chain has settled.

use bytes::{BufMut, BytesMut};

use super::{Headers, StatusCode};

/// A response payload.
///
/// Text and JSON bodies are serialized by [`Response::into_bytes`] with a
/// matching default `Content-Type`; `Bytes` payloads are forwarded
/// verbatim. `Empty` means no aspect has set a body yet, which the server
/// distinguishes from an intentionally empty one when it supplies the
/// default response.
#[derive(Debug, Default)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_owned())
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }
}

/// An HTTP/1.1 response.
///
/// Supports two usage styles: consuming builder methods for standalone
/// construction (the server's error paths), and in-place mutators for
/// aspects that decorate the response carried by the context.
///
/// # Examples
///
/// ```
/// use lamina::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("X-Request-Id", "abc-123")
///     .body("Hello");
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 5\r\n"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and no body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::Empty,
            keep_alive: true,
        }
    }

    // ── Consuming builder methods ────────────────────────────────────────────

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    // ── In-place mutators for aspects ────────────────────────────────────────

    /// Sets the response status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Sets a header, replacing any existing values for the name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Appends a header without touching existing values. Use this for
    /// multi-value headers such as `Set-Cookie`.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the response body in place.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the response body.
    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - a default `Content-Type` matching the body variant, when the body is
    ///   non-empty and no `Content-Type` header was set;
    /// - `Content-Length: <n>` (always written);
    /// - `Connection: keep-alive` or `Connection: close`.
    pub fn into_bytes(mut self) -> BytesMut {
        let (default_type, payload) = match std::mem::take(&mut self.body) {
            Body::Empty => (None, Vec::new()),
            Body::Text(s) => (Some("text/plain; charset=utf-8"), s.into_bytes()),
            // `Display` for Value is infallible serialization.
            Body::Json(value) => (Some("application/json"), value.to_string().into_bytes()),
            Body::Bytes(bytes) => (Some("application/octet-stream"), bytes),
        };

        if !payload.is_empty() && !self.headers.contains("content-type") {
            if let Some(content_type) = default_type {
                self.headers.insert("Content-Type", content_type);
            }
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);

        let content_length = payload.len();
        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Status line
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        // Headers
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        if !payload.is_empty() {
            buf.put(payload.as_slice());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
