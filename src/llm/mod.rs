//! Chat-completion provider integration.
//!
//! - [`LlmClient`] talks to an OpenAI-compatible `/chat/completions`
//!   endpoint, buffered or streamed.
//! - [`ChatProvider`] is the seam the enhancement service is generic over.
//! - [`StreamTranscoder`] turns the provider's raw streamed body into
//!   [`StreamEvent`](crate::realtime::StreamEvent)s.

mod client;
mod error;
pub mod transcoder;
pub mod types;

pub use client::{ChatProvider, ChunkStream, LlmClient};
pub use error::LlmError;
pub use transcoder::StreamTranscoder;
pub use types::{CompletionResult, GenerationParams, Usage};
