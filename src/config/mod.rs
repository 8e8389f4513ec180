//! Process configuration.
//!
//! Everything is read once at startup from command-line flags, each of which
//! also falls back to an environment variable, and frozen into an
//! [`AppConfig`]. Nothing here is mutated afterwards; the provider settings
//! are handed to [`LlmClient::new`](crate::llm::LlmClient::new) explicitly.

use std::fmt;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::enhance::ContentLimits;

/// Default chat model when `OPENAI_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano-2025-04-14";

/// Default provider API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Errors raised while validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OpenAI API key is not configured (set OPENAI_API_KEY or --openai-api-key)")]
    MissingApiKey,

    #[error("provider base URL must start with http:// or https://, got {0:?}")]
    InvalidBaseUrl(String),

    #[error("{name} must be greater than zero")]
    ZeroValue { name: &'static str },
}

/// note-assist: AI enhancement service for notes
#[derive(Parser, Debug)]
#[command(name = "note-assist")]
#[command(about = "AI enhancement service for notes: summarize, improve, tag and suggest")]
#[command(version)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "NOTE_ASSIST_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// API key for the chat-completion provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    pub openai_api_key: String,

    /// Chat model identifier
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    pub openai_model: String,

    /// Provider API root; `/chat/completions` is appended
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    /// Deadline for buffered completions, in seconds
    #[arg(long, env = "NOTE_ASSIST_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Abort a streamed completion when no chunk arrives for this many seconds
    #[arg(long, env = "NOTE_ASSIST_STREAM_IDLE_TIMEOUT", default_value = "30")]
    pub stream_idle_timeout_secs: u64,

    /// Maximum characters of note content accepted for enhancement
    #[arg(long, env = "NOTE_ASSIST_MAX_CONTENT_CHARS", default_value = "10000")]
    pub max_content_chars: usize,

    /// Maximum characters of partial content accepted for suggestions
    #[arg(long, env = "NOTE_ASSIST_MAX_PARTIAL_CHARS", default_value = "5000")]
    pub max_partial_chars: usize,

    /// Maximum characters of a note title
    #[arg(long, env = "NOTE_ASSIST_MAX_TITLE_CHARS", default_value = "255")]
    pub max_title_chars: usize,

    /// Allowed CORS origin; repeat or comma-separate for several. Empty allows any origin.
    #[arg(long = "cors-origin", env = "NOTE_ASSIST_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// DEVELOPMENT ONLY: skip TLS certificate verification towards the provider
    #[arg(long, env = "NOTE_ASSIST_DANGER_ACCEPT_INVALID_CERTS")]
    pub danger_accept_invalid_certs: bool,
}

impl Cli {
    /// Parses command-line arguments and environment.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Validates the raw arguments into an immutable [`AppConfig`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingApiKey`] for an empty key,
    /// [`ConfigError::InvalidBaseUrl`] for a non-HTTP base URL, and
    /// [`ConfigError::ZeroValue`] for zero timeouts or limits.
    pub fn into_config(self) -> Result<AppConfig, ConfigError> {
        let api_key = self.openai_api_key.trim().to_owned();
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let base_url = self.openai_base_url.trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.openai_base_url));
        }

        for (name, value) in [
            ("request timeout", self.request_timeout_secs as usize),
            ("stream idle timeout", self.stream_idle_timeout_secs as usize),
            ("max content chars", self.max_content_chars),
            ("max partial chars", self.max_partial_chars),
            ("max title chars", self.max_title_chars),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue { name });
            }
        }

        Ok(AppConfig {
            bind: self.bind,
            provider: ProviderConfig {
                api_key,
                model: self.openai_model,
                base_url,
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                stream_idle_timeout: Duration::from_secs(self.stream_idle_timeout_secs),
                danger_accept_invalid_certs: self.danger_accept_invalid_certs,
            },
            limits: ContentLimits {
                content: self.max_content_chars,
                partial_content: self.max_partial_chars,
                title: self.max_title_chars,
            },
            cors_origins: self
                .cors_origins
                .into_iter()
                .map(|o| o.trim().to_owned())
                .filter(|o| !o.is_empty())
                .collect(),
        })
    }
}

/// Validated, read-only configuration for the whole process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: String,
    pub provider: ProviderConfig,
    pub limits: ContentLimits,
    pub cors_origins: Vec<String>,
}

/// Settings for the upstream chat-completion provider.
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub model: String,
    /// API root without a trailing slash.
    pub base_url: String,
    pub request_timeout: Duration,
    pub stream_idle_timeout: Duration,
    /// Development switch; certificates are verified unless this is set.
    pub danger_accept_invalid_certs: bool,
}

impl ProviderConfig {
    /// Provider settings pointing at `base_url` with default timeouts and
    /// model. Mostly useful for tests and local proxies.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            request_timeout: Duration::from_secs(30),
            stream_idle_timeout: Duration::from_secs(30),
            danger_accept_invalid_certs: false,
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("stream_idle_timeout", &self.stream_idle_timeout)
            .field("danger_accept_invalid_certs", &self.danger_accept_invalid_certs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["note-assist"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_produce_a_valid_config() {
        let config = cli(&["--openai-api-key", "sk-test"]).into_config().unwrap();
        assert_eq!(config.bind, "127.0.0.1:8080");
        assert_eq!(config.provider.model, DEFAULT_MODEL);
        assert_eq!(
            config.provider.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(config.provider.request_timeout, Duration::from_secs(30));
        assert!(!config.provider.danger_accept_invalid_certs);
        assert_eq!(config.limits, ContentLimits::default());
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let err = cli(&["--openai-api-key", "  "]).into_config().unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[test]
    fn base_url_must_be_http() {
        let err = cli(&["--openai-api-key", "k", "--openai-base-url", "api.openai.com"])
            .into_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl(_)));
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let config = cli(&["--openai-api-key", "k", "--openai-base-url", "http://localhost:9000/v1/"])
            .into_config()
            .unwrap();
        assert_eq!(
            config.provider.completions_url(),
            "http://localhost:9000/v1/chat/completions"
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = cli(&["--openai-api-key", "k", "--request-timeout-secs", "0"])
            .into_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroValue { name: "request timeout" }));
    }

    #[test]
    fn cors_origins_split_on_commas() {
        let config = cli(&[
            "--openai-api-key",
            "k",
            "--cors-origin",
            "https://a.example, https://b.example",
        ])
        .into_config()
        .unwrap();
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn api_key_is_redacted_from_debug() {
        let provider = ProviderConfig::new("sk-secret", "http://localhost/v1");
        let debug = format!("{provider:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
