use thiserror::Error;

use crate::llm::LlmError;

/// The caller's input cannot be turned into a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("invalid action {0:?}; expected one of: summarize, improve, tags")]
    InvalidAction(String),

    #[error("{field} is too long: {len} characters, maximum is {max}")]
    ContentTooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{field} is required")]
    MissingField { field: &'static str },
}

/// Failure of an enhancement, suggestion or stream request.
#[derive(Debug, Error)]
pub enum EnhanceError {
    /// Input fault; nothing was sent to the provider.
    #[error(transparent)]
    Rejected(#[from] PromptError),

    /// Upstream fault.
    #[error("enhancement failed: {cause}")]
    Failed {
        #[source]
        cause: LlmError,
    },
}

impl EnhanceError {
    pub fn is_client_fault(&self) -> bool {
        matches!(self, EnhanceError::Rejected(_))
    }

    /// Message for the HTTP response: the validation message for input
    /// faults, a generic one for upstream faults.
    pub fn public_message(&self) -> String {
        match self {
            EnhanceError::Rejected(e) => e.to_string(),
            EnhanceError::Failed { cause } => cause.public_message().to_owned(),
        }
    }
}

impl From<LlmError> for EnhanceError {
    fn from(cause: LlmError) -> Self {
        EnhanceError::Failed { cause }
    }
}
