//! HTTP/1.1 response builder.
//!
//! Responses carry either a complete body, written with `Content-Length`, or
//! a [`BodyStream`] that the server relays with chunked transfer encoding as
//! each piece is produced. Server-Sent Events use the streamed form.

use std::fmt;
use std::pin::Pin;

use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;
use serde::Serialize;
use tracing::error;

use super::{Headers, StatusCode};

/// A body produced incrementally, one chunk per item.
pub type BodyStream = Pin<Box<dyn Stream<Item = Bytes> + Send + 'static>>;

enum Body {
    Full(Vec<u8>),
    Stream(BodyStream),
}

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use note_assist::http::{Response, StatusCode};
///
/// let response = Response::json(StatusCode::Ok, &serde_json::json!({"success": true}));
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Type: application/json\r\n"));
/// assert!(text.ends_with("{\"success\":true}"));
/// ```
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::Full(Vec::new()),
            keep_alive: true,
        }
    }

    /// Serializes `value` as the JSON body.
    ///
    /// Serialization failures are logged and turned into a bare `500`, since
    /// every payload this service emits is built from plain data.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .header("Content-Type", "application/json")
                .body_bytes(body),
            Err(e) => {
                error!(error = %e, "failed to serialize JSON response");
                Self::new(StatusCode::InternalServerError)
            }
        }
    }

    /// Creates a response whose body is relayed chunk by chunk from `stream`.
    pub fn stream<S>(status: StatusCode, stream: S) -> Self
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        Self {
            status,
            headers: Headers::new(),
            body: Body::Stream(Box::pin(stream)),
            keep_alive: true,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place. Intended for middleware that receives a
    /// `Response` from downstream and decorates it without consuming it.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Body::Full(body.into().into_bytes());
        self
    }

    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Full(body.into());
        self
    }

    /// Controls whether the `Connection: keep-alive` or `Connection: close` header is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn wants_keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the complete body, or `None` for a streamed response.
    pub fn full_body(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Full(bytes) => Some(bytes),
            Body::Stream(_) => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }

    /// Splits the response into its serialized head and, for streamed
    /// responses, the body stream still to be relayed.
    ///
    /// For a full body the returned buffer holds the complete message with
    /// `Content-Length`. For a streamed body it holds the status line and
    /// headers with `Transfer-Encoding: chunked`; each item of the stream must
    /// then be written through [`encode_chunk`], followed by [`LAST_CHUNK`].
    ///
    /// Adds `Content-Type: text/plain; charset=utf-8` when a non-empty full
    /// body has no content type, and always writes the `Connection` header.
    pub fn into_wire(mut self) -> (BytesMut, Option<BodyStream>) {
        let needs_type = match &self.body {
            Body::Full(body) => !body.is_empty() && !self.headers.contains("content-type"),
            Body::Stream(_) => false,
        };
        if needs_type {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);

        let body_len = match &self.body {
            Body::Full(body) => body.len(),
            Body::Stream(_) => 0,
        };
        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + body_len);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        match self.body {
            Body::Full(body) => {
                buf.put(format!("Content-Length: {body_len}\r\n\r\n").as_bytes());
                buf.put(body.as_slice());
                (buf, None)
            }
            Body::Stream(stream) => {
                buf.put(&b"Transfer-Encoding: chunked\r\n\r\n"[..]);
                (buf, Some(stream))
            }
        }
    }

    /// Serializes the head and full body. A streamed body is discarded.
    pub fn into_bytes(self) -> BytesMut {
        self.into_wire().0
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("streaming", &self.is_streaming())
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

/// Terminator of a chunked body.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Frames one piece of a streamed body for chunked transfer encoding.
///
/// Empty input yields an empty buffer, since a zero-length chunk would end
/// the body early.
pub fn encode_chunk(data: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(data.len() + 12);
    if data.is_empty() {
        return buf;
    }
    buf.put(format!("{:X}\r\n", data.len()).as_bytes());
    buf.put(data);
    buf.put(&b"\r\n"[..]);
    buf
}
