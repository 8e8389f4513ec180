//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests to a handler function.
//! Supports persistent connections (keep-alive) and relays streamed response
//! bodies with chunked transfer encoding, flushing after every chunk so SSE
//! fragments reach the client as they are produced.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use futures::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::{BodyStream, LAST_CHUNK, Response, encode_chunk},
};

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

/// Maximum size of a buffered HTTP request (headers plus body) before it is
/// rejected with `413`.
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The HTTP server fronting the enhancement API.
///
/// # Examples
///
/// ```rust,no_run
/// use note_assist::server::Server;
/// use note_assist::http::{Request, Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server.run(|_req: Request| async {
///         Response::new(StatusCode::Ok).body("ok")
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
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
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections and dispatches requests to `handler` forever.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.run_until(handler, std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Connections already being served keep running on their own tasks;
    /// only the accept loop stops.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run_until<H, F, S>(self, handler: H, shutdown: S) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "note-assist listening");

        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, size = buf.len(), "request too large, sending 413");
            stream.write_all(&too_large().into_bytes()).await?;
            break;
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => continue,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        let content_length = request.content_length().unwrap_or(0);
        if content_length > MAX_REQUEST_SIZE.saturating_sub(body_offset) {
            warn!(peer = %peer_addr, declared = content_length, "declared body too large, sending 413");
            stream.write_all(&too_large().into_bytes()).await?;
            break;
        }
        let total_needed = body_offset + content_length;
        if buf.len() < total_needed {
            continue;
        }

        let client_keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = handler(request).await;
        let keep_alive = client_keep_alive && response.wants_keep_alive();
        let response = response.keep_alive(keep_alive);
        let (head, body) = response.into_wire();
        stream.write_all(&head).await?;
        stream.flush().await?;

        if let Some(body) = body {
            relay_chunks(&mut stream, body).await?;
        }

        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "client asked to close the connection");
            break;
        }
    }

    Ok(())
}

fn too_large() -> Response {
    Response::new(StatusCode::PayloadTooLarge)
        .body("Request entity too large")
        .keep_alive(false)
}

/// Writes each item of `body` as its own chunk, flushing after every one.
///
/// A write failure means the client went away. The error is returned and the
/// body stream is dropped with it, which cancels whatever was producing it.
async fn relay_chunks(stream: &mut TcpStream, mut body: BodyStream) -> std::io::Result<()> {
    while let Some(piece) = body.next().await {
        let framed = encode_chunk(&piece);
        if framed.is_empty() {
            continue;
        }
        stream.write_all(&framed).await?;
        stream.flush().await?;
    }
    stream.write_all(LAST_CHUNK).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn spawn_server<H, F>(handler: H) -> SocketAddr
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run(handler));
        addr
    }

    async fn exchange(addr: SocketAddr, raw: &[u8]) -> String {
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(raw).await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn waits_for_full_body_before_dispatch() {
        let addr = spawn_server(|req: Request| async move {
            Response::new(StatusCode::Ok).body_bytes(req.body().to_vec())
        })
        .await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"POST /api/word-count HTTP/1.1\r\nConnection: close\r\nContent-Length: 11\r\n\r\n{\"text\":")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        client.write_all(b"\"\"}").await.unwrap();

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("{\"text\":\"\"}"));
    }

    #[tokio::test]
    async fn streamed_body_is_chunk_encoded() {
        let addr = spawn_server(|_req: Request| async {
            let pieces = futures::stream::iter(vec![
                Bytes::from_static(b"data: {\"type\":\"start\"}\n\n"),
                Bytes::new(),
                Bytes::from_static(b"data: {\"type\":\"complete\"}\n\n"),
            ]);
            Response::stream(StatusCode::Ok, pieces)
        })
        .await;

        let text = exchange(
            addr,
            b"GET /api/ai/enhance HTTP/1.1\r\nConnection: close\r\n\r\n",
        )
        .await;

        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(text.contains("18\r\ndata: {\"type\":\"start\"}\n\n\r\n"));
        assert!(text.contains("1B\r\ndata: {\"type\":\"complete\"}\n\n\r\n"));
        assert!(text.ends_with("0\r\n\r\n"));
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let addr = spawn_server(|_req: Request| async { Response::new(StatusCode::Ok) }).await;
        let text = exchange(addr, b"NOT A REQUEST\r\n\r\n").await;
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn oversized_declared_body_gets_413_without_waiting() {
        let addr = spawn_server(|_req: Request| async { Response::new(StatusCode::Ok) }).await;
        let text = exchange(
            addr,
            b"POST /api/ai/enhance HTTP/1.1\r\nContent-Length: 2000000\r\n\r\n{}",
        )
        .await;
        assert!(text.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    }

    #[tokio::test]
    async fn overflowing_content_length_gets_400() {
        let addr = spawn_server(|_req: Request| async { Response::new(StatusCode::Ok) }).await;
        let text = exchange(
            addr,
            b"POST /api/ai/enhance HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n{}",
        )
        .await;
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn run_until_stops_accepting() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let result = server
            .run_until(
                |_req: Request| async { Response::new(StatusCode::Ok) },
                async {},
            )
            .await;
        assert!(result.is_ok());
    }
}
