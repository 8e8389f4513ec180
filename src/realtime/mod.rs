//! Real-time delivery of enhancement output as Server-Sent Events.
//!
//! - [`StreamEvent`] is the provider-agnostic event vocabulary.
//! - [`EventSink`] is where a running enhancement pushes events; a closed
//!   sink means the client went away.
//! - [`sse_response`] wraps an event stream in a `text/event-stream`
//!   [`Response`](crate::Response).

mod sse;

use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;
use tokio::sync::mpsc;

pub use sse::{SSE_CONTENT_TYPE, sse_response};

/// One event of an enhancement stream.
///
/// A well-formed stream is exactly one `Start`, any number of `Delta`s and
/// exactly one terminal `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Start { action: String },
    Delta { text: String },
    Complete,
    Error { message: String },
}

impl StreamEvent {
    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }

    /// `Complete` and `Error` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete | StreamEvent::Error { .. })
    }

    /// Encodes the event as one SSE message: `data: <json>\n\n`.
    pub fn to_sse(&self) -> String {
        // Serializing string-only maps cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        format!("data: {json}\n\n")
    }
}

impl Serialize for StreamEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StreamEvent::Start { action } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "start")?;
                map.serialize_entry("action", action)?;
                map.end()
            }
            StreamEvent::Delta { text } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("content", text)?;
                map.end()
            }
            StreamEvent::Complete => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", "complete")?;
                map.end()
            }
            StreamEvent::Error { message } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "error")?;
                map.serialize_entry("message", message)?;
                map.end()
            }
        }
    }
}

/// The receiving side of an [`EventSink`] is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event sink closed")]
pub struct SinkClosed;

/// Destination for the events of a running enhancement.
pub trait EventSink: Send + Sync {
    /// Delivers one event. `Err(SinkClosed)` tells the producer to stop.
    fn send(&mut self, event: StreamEvent) -> impl Future<Output = Result<(), SinkClosed>> + Send;

    /// Resolves once the receiving side is gone. Never resolves for sinks
    /// that cannot close.
    fn closed(&self) -> impl Future<Output = ()> + Send;
}

impl EventSink for mpsc::Sender<StreamEvent> {
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkClosed> {
        mpsc::Sender::send(self, event).await.map_err(|_| SinkClosed)
    }

    async fn closed(&self) {
        mpsc::Sender::closed(self).await
    }
}

impl EventSink for Vec<StreamEvent> {
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkClosed> {
        self.push(event);
        Ok(())
    }

    async fn closed(&self) {
        std::future::pending().await
    }
}

impl<K: EventSink> EventSink for &mut K {
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkClosed> {
        (**self).send(event).await
    }

    async fn closed(&self) {
        (**self).closed().await
    }
}
