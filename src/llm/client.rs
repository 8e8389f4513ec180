use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use tracing::{debug, warn};

use super::error::LlmError;
use super::types::{ChatMessage, ChatRequest, ChatResponse, CompletionResult, GenerationParams};
use crate::config::ProviderConfig;

/// Raw response body of a streamed completion, one network chunk per item.
///
/// Chunk boundaries carry no meaning; a provider frame may be split across
/// items or several frames may share one. Dropping the stream closes the
/// provider connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send + 'static>>;

/// Anything that can answer chat-completion prompts.
///
/// [`LlmClient`] is the production implementation; the enhancement service
/// is generic over this trait so it can be exercised against a stand-in.
pub trait ChatProvider: Send + Sync + 'static {
    /// Sends `prompt` and waits for the whole answer.
    fn complete(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> impl Future<Output = Result<CompletionResult, LlmError>> + Send;

    /// Sends `prompt` and returns the answer's raw body as it arrives.
    ///
    /// Resolves once the provider has accepted the request (2xx head
    /// received); rejections surface here, before any chunk.
    fn complete_streaming(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> impl Future<Output = Result<ChunkStream, LlmError>> + Send;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// Cheap to clone; clones share the connection pool and configuration.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    config: Arc<ProviderConfig>,
}

impl LlmClient {
    /// Builds the HTTP client from read-only provider settings.
    ///
    /// Certificates are verified unless
    /// [`ProviderConfig::danger_accept_invalid_certs`] is set, which logs a
    /// warning.
    ///
    /// # Errors
    ///
    /// [`LlmError::Client`] if the TLS backend cannot be initialized.
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(config.request_timeout);

        if config.danger_accept_invalid_certs {
            warn!(
                base_url = %config.base_url,
                "TLS certificate verification towards the AI provider is DISABLED; \
                 development use only"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(LlmError::Client)?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    fn request(&self, prompt: &str, params: GenerationParams, stream: bool) -> reqwest::RequestBuilder {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream,
        };
        self.http
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
    }

    /// Buffered completion with `stream: false`.
    ///
    /// # Errors
    ///
    /// - [`LlmError::Provider`] on a non-2xx status
    /// - [`LlmError::Timeout`] when the configured deadline passes
    /// - [`LlmError::Transport`] when the provider cannot be reached
    /// - [`LlmError::Decode`] when a 2xx body is not a completion
    pub async fn complete(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<CompletionResult, LlmError> {
        let started = Instant::now();
        let response = self
            .request(prompt, params, false)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;
        let response = ensure_success(response).await?;

        let body: ChatResponse = response.json().await.map_err(LlmError::from_reqwest)?;
        let result = body.into_completion();

        debug!(
            model = %self.config.model,
            prompt_chars = prompt.chars().count(),
            completion_chars = result.text.chars().count(),
            total_tokens = result.usage.map(|u| u.total_tokens),
            elapsed = ?started.elapsed(),
            "completion finished"
        );
        Ok(result)
    }

    /// Streamed completion with `stream: true`.
    ///
    /// The deadline covers the response head, and the error body when the
    /// status is not 2xx; a successful body is governed by the caller's idle
    /// timeout.
    ///
    /// # Errors
    ///
    /// The same as [`complete`](Self::complete), minus `Decode`.
    pub async fn complete_streaming(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<ChunkStream, LlmError> {
        let open = async {
            let sent = self
                .request(prompt, params, true)
                .header(ACCEPT, "text/event-stream")
                .send()
                .await;
            match sent {
                Ok(response) => ensure_success(response).await,
                Err(e) => Err(LlmError::from_reqwest(e)),
            }
        };
        let response = tokio::time::timeout(self.config.request_timeout, open)
            .await
            .map_err(|_| LlmError::Timeout)??;

        debug!(
            model = %self.config.model,
            prompt_chars = prompt.chars().count(),
            "completion stream opened"
        );
        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(LlmError::from_reqwest)),
        ))
    }
}

impl ChatProvider for LlmClient {
    fn complete(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> impl Future<Output = Result<CompletionResult, LlmError>> + Send {
        LlmClient::complete(self, prompt, params)
    }

    fn complete_streaming(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> impl Future<Output = Result<ChunkStream, LlmError>> + Send {
        LlmClient::complete_streaming(self, prompt, params)
    }
}

/// Turns a non-2xx response into [`LlmError::Provider`], keeping the body
/// off the logs.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(
        status = status.as_u16(),
        body_len = body.len(),
        "provider rejected completion request"
    );
    Err(LlmError::Provider {
        status: status.as_u16(),
        body,
    })
}
