//! Prompt construction and input validation.
//!
//! Everything here is pure: the same input always yields the same prompt,
//! and nothing is sent anywhere.

use super::action::{EnhancementAction, SUGGESTION_PARAMS};
use super::error::PromptError;
use crate::llm::GenerationParams;

/// Maximum input sizes, counted in characters (Unicode scalar values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLimits {
    pub content: usize,
    pub partial_content: usize,
    pub title: usize,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            content: 10_000,
            partial_content: 5_000,
            title: 255,
        }
    }
}

/// Which operation a [`PromptRequest`] was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Enhance(EnhancementAction),
    Suggest,
}

/// A validated prompt ready for the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub kind: PromptKind,
    /// Length of the caller's text in characters, for logging.
    pub source_chars: usize,
    pub prompt: String,
    pub params: GenerationParams,
}

/// Turns actions and note text into provider prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder {
    limits: ContentLimits,
}

impl PromptBuilder {
    pub fn new(limits: ContentLimits) -> Self {
        Self { limits }
    }

    /// Builds the enhancement prompt for `action` over `content`.
    ///
    /// # Errors
    ///
    /// [`PromptError::MissingField`] for blank content and
    /// [`PromptError::ContentTooLarge`] past the content limit.
    pub fn build(&self, action: EnhancementAction, content: &str) -> Result<PromptRequest, PromptError> {
        let source_chars = require("content", content)?;
        check_len("content", source_chars, self.limits.content)?;

        Ok(PromptRequest {
            kind: PromptKind::Enhance(action),
            source_chars,
            prompt: format!("{}\n\n{content}", action.instruction()),
            params: action.params(),
        })
    }

    /// Builds the "what to write next" prompt from a title and optional
    /// partial content.
    ///
    /// # Errors
    ///
    /// [`PromptError::MissingField`] for a blank title and
    /// [`PromptError::ContentTooLarge`] when the title or partial content is
    /// past its limit.
    pub fn build_suggestion(&self, title: &str, partial: &str) -> Result<PromptRequest, PromptError> {
        let title_chars = require("title", title)?;
        check_len("title", title_chars, self.limits.title)?;
        let partial_chars = partial.chars().count();
        check_len("partial_content", partial_chars, self.limits.partial_content)?;

        let context = if partial.is_empty() {
            " ".to_owned()
        } else {
            format!(" and the following partial content:\n\n{partial}\n\n")
        };

        Ok(PromptRequest {
            kind: PromptKind::Suggest,
            source_chars: title_chars + partial_chars,
            prompt: format!(
                "Based on the title '{title}'{context}Please suggest 3-5 bullet points or ideas \
                 to continue writing this note. Keep suggestions concise and relevant."
            ),
            params: SUGGESTION_PARAMS,
        })
    }
}

fn require(field: &'static str, value: &str) -> Result<usize, PromptError> {
    if value.trim().is_empty() {
        return Err(PromptError::MissingField { field });
    }
    Ok(value.chars().count())
}

fn check_len(field: &'static str, len: usize, max: usize) -> Result<(), PromptError> {
    if len > max {
        return Err(PromptError::ContentTooLarge { field, len, max });
    }
    Ok(())
}
