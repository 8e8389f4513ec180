use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::StreamEvent;
use crate::{Response, StatusCode};

pub const SSE_CONTENT_TYPE: &str = "text/event-stream";

/// Wraps `events` in a `200` SSE response relayed with chunked encoding,
/// one chunk per event.
///
/// `X-Accel-Buffering: no` keeps reverse proxies from holding events back.
pub fn sse_response<S>(events: S) -> Response
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let body = events.map(|event| Bytes::from(event.to_sse()));
    Response::stream(StatusCode::Ok, body)
        .header("Content-Type", SSE_CONTENT_TYPE)
        .header("Cache-Control", "no-cache")
        .header("X-Accel-Buffering", "no")
        .keep_alive(true)
}
