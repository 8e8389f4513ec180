use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::error::PromptError;
use crate::llm::GenerationParams;

/// Settings for continuation suggestions.
pub const SUGGESTION_PARAMS: GenerationParams = GenerationParams::new(300, 0.8);

/// Settings for the connection canary.
pub const CANARY_PARAMS: GenerationParams = GenerationParams::new(50, 0.1);

/// What to do with a note's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementAction {
    Summarize,
    Improve,
    Tags,
}

impl EnhancementAction {
    pub const ALL: [EnhancementAction; 3] = [
        EnhancementAction::Summarize,
        EnhancementAction::Improve,
        EnhancementAction::Tags,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EnhancementAction::Summarize => "summarize",
            EnhancementAction::Improve => "improve",
            EnhancementAction::Tags => "tags",
        }
    }

    /// Generation settings for this action. Tags are short and focused;
    /// prose rewrites get more room.
    pub fn params(self) -> GenerationParams {
        match self {
            EnhancementAction::Tags => GenerationParams::new(100, 0.3),
            EnhancementAction::Summarize | EnhancementAction::Improve => {
                GenerationParams::new(500, 0.7)
            }
        }
    }

    pub(crate) fn instruction(self) -> &'static str {
        match self {
            EnhancementAction::Summarize => {
                "Please provide a concise summary of the following text:"
            }
            EnhancementAction::Improve => {
                "Please improve the writing quality, clarity, and structure of the following \
                 text while maintaining its original meaning:"
            }
            EnhancementAction::Tags => {
                "Generate 5-7 relevant tags for the following content. Return only the tags \
                 separated by commas:"
            }
        }
    }
}

impl FromStr for EnhancementAction {
    type Err = PromptError;

    /// Accepts exactly `summarize`, `improve` or `tags`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summarize" => Ok(EnhancementAction::Summarize),
            "improve" => Ok(EnhancementAction::Improve),
            "tags" => Ok(EnhancementAction::Tags),
            other => Err(PromptError::InvalidAction(other.to_owned())),
        }
    }
}

impl fmt::Display for EnhancementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
