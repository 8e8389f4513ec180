use thiserror::Error;

/// Failures talking to the chat-completion provider.
///
/// `Display` never includes the provider's response body; the body is kept
/// on [`LlmError::Provider`] for callers that need it but is not written to
/// logs or client responses.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider returned HTTP {status}")]
    Provider { status: u16, body: String },

    #[error("provider did not respond before the deadline")]
    Timeout,

    #[error("could not reach provider: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("provider response could not be decoded: {0}")]
    Decode(String),

    #[error("provider stream stalled for {secs}s")]
    Stalled { secs: u64 },

    #[error("http client could not be built: {0}")]
    Client(#[source] reqwest::Error),
}

impl LlmError {
    /// Classifies a `reqwest` failure that happened while sending or reading.
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::Decode(e.to_string())
        } else {
            LlmError::Transport(e)
        }
    }

    /// HTTP status of a provider rejection, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message safe to show an end user: no provider detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            LlmError::Provider { status: 401, .. } | LlmError::Provider { status: 403, .. } => {
                "AI provider rejected the service credentials"
            }
            LlmError::Provider { status: 429, .. } => "AI provider rate limit reached",
            LlmError::Provider { .. } => "AI provider returned an error",
            LlmError::Timeout | LlmError::Stalled { .. } => "AI provider timed out",
            LlmError::Transport(_) | LlmError::Client(_) => "AI provider is unreachable",
            LlmError::Decode(_) => "AI provider sent an unreadable response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_display_omits_body() {
        let e = LlmError::Provider {
            status: 401,
            body: "{\"error\":\"invalid key sk-abc\"}".into(),
        };
        assert_eq!(e.to_string(), "provider returned HTTP 401");
        assert_eq!(e.status(), Some(401));
        assert!(!e.public_message().contains("sk-abc"));
    }

    #[test]
    fn stall_is_reported_as_timeout_to_users() {
        let e = LlmError::Stalled { secs: 30 };
        assert_eq!(e.public_message(), "AI provider timed out");
        assert_eq!(e.status(), None);
    }
}
