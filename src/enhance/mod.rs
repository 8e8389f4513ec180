//! Note enhancement: turning note text into provider prompts and running them.
//!
//! - [`EnhancementAction`] is the closed set of things that can be done to a
//!   note; each carries its own [`GenerationParams`](crate::llm::GenerationParams).
//! - [`PromptBuilder`] validates input against [`ContentLimits`] and renders
//!   prompts.
//! - [`EnhancementService`] runs prompts buffered or streamed and owns
//!   provider error translation.

mod action;
mod error;
mod prompt;
mod service;

pub use action::{CANARY_PARAMS, EnhancementAction, SUGGESTION_PARAMS};
pub use error::{EnhanceError, PromptError};
pub use prompt::{ContentLimits, PromptBuilder, PromptKind, PromptRequest};
pub use service::{
    CANARY_PROMPT, ConnectionReport, EnhancementService, EnhancementStream, StreamOutcome,
};
