//! # note-assist
//!
//! AI enhancement service for a note-taking application: summarize, improve
//! and tag note text, suggest how to continue a note, and stream the
//! provider's answer to the browser as Server-Sent Events.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use note_assist::config::ProviderConfig;
//! use note_assist::enhance::{EnhancementService, PromptBuilder};
//! use note_assist::llm::{LlmClient, StreamTranscoder};
//! use note_assist::middleware::{LoggerMiddleware, Pipeline};
//! use note_assist::{Server, api};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LlmClient::new(ProviderConfig::new("sk-...", "https://api.openai.com/v1"))?;
//!     let service = EnhancementService::new(client, PromptBuilder::default(), StreamTranscoder::default());
//!     let pipeline = Pipeline::new(api::routes(service)).with(Arc::new(LoggerMiddleware));
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(move |req| {
//!         let pipeline = pipeline.clone();
//!         async move { pipeline.handle(req).await }
//!     }).await?;
//!     Ok(())
//! }
//! ```

// ── HTTP server ───────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

// ── Enhancement pipeline ──────────────────────────────────────────────────────
pub mod api;
pub mod config;
pub mod enhance;
pub mod llm;
pub mod realtime;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
