//! Provider chunk stream → [`StreamEvent`] stream.
//!
//! OpenAI-compatible providers stream `data: {json}` lines separated by blank
//! lines and finish with `data: [DONE]`. Network chunks cut those lines at
//! arbitrary byte offsets, so bytes are buffered until a full line is
//! available and only then decoded.

use std::time::Duration;

use async_stream::stream;
use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use super::client::ChunkStream;
use super::error::LlmError;
use super::types::ChunkFrame;
use crate::realtime::StreamEvent;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Longest unterminated line the transcoder buffers before giving up.
pub const MAX_LINE_BYTES: usize = 256 * 1024;

/// Reassembles newline-terminated lines from arbitrarily split chunks.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    /// Bytes of `buf` already searched for `\n`.
    scanned: usize,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_line: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            max_line,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pops the next complete line without its `\n` or `\r\n` terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let Some(pos) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') else {
            self.scanned = self.buf.len();
            return None;
        };
        let line = self.buf.split_to(self.scanned + pos);
        self.buf.advance(1);
        self.scanned = 0;
        Some(decode_line(&line))
    }

    /// Once [`next_line`](Self::next_line) returns `None`, whether the
    /// unterminated tail has outgrown the line limit.
    pub fn overflowed(&self) -> bool {
        self.buf.len() > self.max_line
    }

    /// Drains whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        Some(decode_line(&rest))
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Meaning of one line of the provider stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A non-empty text fragment.
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
    /// Comments, keep-alives, `event:` lines, blank separators, malformed
    /// JSON and frames without text.
    Ignored,
}

/// Classifies a single line of the provider stream.
pub fn parse_line(line: &str) -> Frame {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignored;
    };
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Frame::Done;
    }
    match serde_json::from_str::<ChunkFrame>(data) {
        Ok(frame) => match frame.into_fragment() {
            Some(text) if !text.is_empty() => Frame::Delta(text),
            _ => Frame::Ignored,
        },
        Err(e) => {
            debug!(error = %e, frame_len = data.len(), "skipping malformed stream frame");
            Frame::Ignored
        }
    }
}

/// Re-frames raw provider chunks into provider-agnostic events.
#[derive(Debug, Clone, Copy)]
pub struct StreamTranscoder {
    idle_timeout: Duration,
}

impl Default for StreamTranscoder {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl StreamTranscoder {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    /// Yields one [`StreamEvent::Delta`] per text fragment, in arrival order.
    ///
    /// The sequence ends silently at `[DONE]` or at the end of the body. A
    /// transport failure, or no chunk within the idle timeout, yields a single
    /// [`StreamEvent::Error`] and ends the sequence. `chunks` is dropped as
    /// soon as the sequence ends, which closes the provider connection.
    pub fn transcode(self, chunks: ChunkStream) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let idle = self.idle_timeout;
        stream! {
            let mut chunks = chunks;
            let mut lines = LineBuffer::new();

            loop {
                let next = match tokio::time::timeout(idle, chunks.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let e = LlmError::Stalled { secs: idle.as_secs() };
                        warn!(error = %e, "abandoning provider stream");
                        yield StreamEvent::error(e.public_message());
                        return;
                    }
                };

                match next {
                    Some(Ok(chunk)) => {
                        lines.push(&chunk);
                        while let Some(line) = lines.next_line() {
                            match parse_line(&line) {
                                Frame::Delta(text) => {
                                    yield StreamEvent::Delta { text };
                                }
                                Frame::Done => return,
                                Frame::Ignored => {}
                            }
                        }
                        if lines.overflowed() {
                            let e = LlmError::Decode(format!("stream line longer than {MAX_LINE_BYTES} bytes"));
                            warn!(error = %e, "abandoning provider stream");
                            yield StreamEvent::error(e.public_message());
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "provider stream failed");
                        yield StreamEvent::error(e.public_message());
                        return;
                    }
                    None => break,
                }
            }

            if let Some(line) = lines.finish() {
                if let Frame::Delta(text) = parse_line(&line) {
                    yield StreamEvent::Delta { text };
                }
            }
        }
    }
}
