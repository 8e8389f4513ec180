use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use super::action::{CANARY_PARAMS, EnhancementAction};
use super::error::EnhanceError;
use super::prompt::{PromptBuilder, PromptRequest};
use crate::llm::{ChatProvider, CompletionResult, LlmClient, StreamTranscoder, Usage};
use crate::realtime::{EventSink, StreamEvent};

/// Prompt sent by [`EnhancementService::test_connection`].
pub const CANARY_PROMPT: &str =
    "Hello! This is a test message. Please respond with \"API connection successful!\"";

/// Reported by a successful connection test whose reply had no text.
pub const NO_CONTENT: &str = "No response content";

/// How a sink-driven enhancement stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Provider finished; `text` is every delta concatenated.
    Completed { text: String },
    /// A terminal `Error` event was delivered.
    Failed { message: String },
    /// The sink closed before the stream finished.
    Cancelled,
}

/// Result of [`EnhancementService::test_connection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A lazy enhancement event stream: `Start`, deltas, then one terminal event.
///
/// Nothing is sent to the provider until the stream is first polled.
/// Dropping it mid-way closes the provider connection.
pub struct EnhancementStream {
    action: EnhancementAction,
    inner: Pin<Box<dyn Stream<Item = StreamEvent> + Send>>,
}

impl EnhancementStream {
    /// Forwards every event to `sink` in order.
    ///
    /// Stops as soon as the sink reports closed, even while waiting on the
    /// provider, dropping the provider stream, and returns
    /// [`StreamOutcome::Cancelled`].
    pub async fn pipe_to<K: EventSink>(mut self, mut sink: K) -> StreamOutcome {
        let mut text = String::new();
        let mut outcome = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = sink.closed() => {
                    info!(action = %self.action, "event sink closed; dropping provider stream");
                    return StreamOutcome::Cancelled;
                }
                next = self.inner.next() => next,
            };
            let Some(event) = next else { break };

            match &event {
                StreamEvent::Delta { text: fragment } => text.push_str(fragment),
                StreamEvent::Complete => {
                    outcome = Some(StreamOutcome::Completed {
                        text: std::mem::take(&mut text),
                    })
                }
                StreamEvent::Error { message } => {
                    outcome = Some(StreamOutcome::Failed {
                        message: message.clone(),
                    })
                }
                StreamEvent::Start { .. } => {}
            }

            if sink.send(event).await.is_err() {
                info!(action = %self.action, "event sink closed; dropping provider stream");
                return StreamOutcome::Cancelled;
            }
            if outcome.is_some() {
                break;
            }
        }

        let outcome = outcome.unwrap_or(StreamOutcome::Cancelled);
        match &outcome {
            StreamOutcome::Completed { text } => info!(
                action = %self.action,
                output_chars = text.chars().count(),
                "enhancement stream completed"
            ),
            StreamOutcome::Failed { .. } => {
                warn!(action = %self.action, "enhancement stream ended with error")
            }
            StreamOutcome::Cancelled => {}
        }
        outcome
    }
}

impl Stream for EnhancementStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Orchestrates prompt building and provider calls.
///
/// Input faults come back as [`EnhanceError::Rejected`] without touching the
/// provider; provider faults are wrapped as [`EnhanceError::Failed`]. Only
/// actions and lengths are logged, never note text or provider bodies.
pub struct EnhancementService<P: ChatProvider = LlmClient> {
    provider: Arc<P>,
    prompts: PromptBuilder,
    transcoder: StreamTranscoder,
}

impl<P: ChatProvider> Clone for EnhancementService<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            prompts: self.prompts,
            transcoder: self.transcoder,
        }
    }
}

impl<P: ChatProvider> EnhancementService<P> {
    pub fn new(provider: P, prompts: PromptBuilder, transcoder: StreamTranscoder) -> Self {
        Self {
            provider: Arc::new(provider),
            prompts,
            transcoder,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Buffered enhancement of `content`.
    ///
    /// # Errors
    ///
    /// [`EnhanceError::Rejected`] for invalid input, [`EnhanceError::Failed`]
    /// when the provider call fails.
    pub async fn enhance(
        &self,
        content: &str,
        action: EnhancementAction,
    ) -> Result<CompletionResult, EnhanceError> {
        let request = self.prompts.build(action, content)?;
        self.complete(&request, action.as_str()).await
    }

    /// Continuation suggestions for a note with `title` and optional
    /// `partial` content.
    ///
    /// # Errors
    ///
    /// As for [`enhance`](Self::enhance).
    pub async fn suggest_continuation(
        &self,
        title: &str,
        partial: &str,
    ) -> Result<CompletionResult, EnhanceError> {
        let request = self.prompts.build_suggestion(title, partial)?;
        self.complete(&request, "suggest").await
    }

    async fn complete(&self, request: &PromptRequest, label: &str) -> Result<CompletionResult, EnhanceError> {
        info!(action = label, content_chars = request.source_chars, "requesting completion");
        match self.provider.complete(&request.prompt, request.params).await {
            Ok(result) => Ok(result),
            Err(cause) => {
                warn!(
                    action = label,
                    content_chars = request.source_chars,
                    status = cause.status(),
                    error = %cause,
                    "completion failed"
                );
                Err(EnhanceError::Failed { cause })
            }
        }
    }

    /// Validates the input and returns the event stream for it.
    ///
    /// Validation happens here, so input faults surface before any event is
    /// produced. Provider failures, before or during streaming, become a
    /// single terminal [`StreamEvent::Error`].
    ///
    /// # Errors
    ///
    /// [`EnhanceError::Rejected`] for invalid input.
    pub fn open_stream(
        &self,
        content: &str,
        action: EnhancementAction,
    ) -> Result<EnhancementStream, EnhanceError> {
        let request = self.prompts.build(action, content)?;
        let provider = Arc::clone(&self.provider);
        let transcoder = self.transcoder;

        let events = stream! {
            yield StreamEvent::Start { action: action.as_str().to_owned() };
            info!(
                action = %action,
                content_chars = request.source_chars,
                "opening completion stream"
            );

            let chunks = match provider.complete_streaming(&request.prompt, request.params).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!(action = %action, status = e.status(), error = %e, "completion stream failed");
                    yield StreamEvent::error(e.public_message());
                    return;
                }
            };

            let mut deltas = Box::pin(transcoder.transcode(chunks));
            while let Some(event) = deltas.next().await {
                if event.is_terminal() {
                    yield event;
                    return;
                }
                yield event;
            }
            yield StreamEvent::Complete;
        };

        Ok(EnhancementStream {
            action,
            inner: Box::pin(events),
        })
    }

    /// Streams an enhancement into `sink`.
    ///
    /// # Errors
    ///
    /// [`EnhanceError::Rejected`] for invalid input; nothing is sent to the
    /// sink in that case. Every other outcome is reported through
    /// [`StreamOutcome`].
    pub async fn enhance_streaming<K: EventSink>(
        &self,
        content: &str,
        action: EnhancementAction,
        sink: K,
    ) -> Result<StreamOutcome, EnhanceError> {
        let stream = self.open_stream(content, action)?;
        Ok(stream.pipe_to(sink).await)
    }

    /// Sends a canary prompt. Never fails; failures are reported in the
    /// returned [`ConnectionReport`].
    pub async fn test_connection(&self) -> ConnectionReport {
        match self.provider.complete(CANARY_PROMPT, CANARY_PARAMS).await {
            Ok(result) => ConnectionReport {
                success: true,
                message: Some(if result.text.is_empty() {
                    NO_CONTENT.to_owned()
                } else {
                    result.text
                }),
                usage: result.usage,
                error: None,
            },
            Err(e) => {
                warn!(status = e.status(), error = %e, "provider connection test failed");
                ConnectionReport {
                    success: false,
                    message: None,
                    usage: None,
                    error: Some(e.public_message().to_owned()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use bytes::Bytes;
    use futures::stream;

    use super::*;
    use crate::enhance::PromptError;
    use crate::llm::{ChunkStream, GenerationParams, LlmError};

    /// Scripted provider that counts calls.
    #[derive(Default)]
    struct Scripted {
        calls: AtomicUsize,
        reply: Option<&'static str>,
        chunks: Vec<&'static str>,
        reject: Option<u16>,
        /// Keep the body open after `chunks`; set to `true` once the body is dropped.
        hang: Option<Arc<AtomicBool>>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl Scripted {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn rejection(&self) -> Option<LlmError> {
            self.reject.map(|status| LlmError::Provider {
                status,
                body: "upstream detail".into(),
            })
        }
    }

    impl ChatProvider for Scripted {
        async fn complete(&self, _prompt: &str, _params: GenerationParams) -> Result<CompletionResult, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.rejection() {
                return Err(e);
            }
            Ok(CompletionResult {
                text: self.reply.unwrap_or_default().to_owned(),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
            })
        }

        async fn complete_streaming(&self, _prompt: &str, _params: GenerationParams) -> Result<ChunkStream, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.rejection() {
                return Err(e);
            }
            let items: Vec<Result<Bytes, LlmError>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect();
            match &self.hang {
                Some(dropped) => {
                    let guard = DropFlag(Arc::clone(dropped));
                    let body = stream::iter(items).chain(stream::pending()).map(move |chunk| {
                        let _alive = &guard;
                        chunk
                    });
                    Ok(Box::pin(body))
                }
                None => Ok(Box::pin(stream::iter(items))),
            }
        }
    }

    fn service(provider: Scripted) -> EnhancementService<Scripted> {
        EnhancementService::new(provider, PromptBuilder::default(), StreamTranscoder::default())
    }

    fn streaming(chunks: Vec<&'static str>) -> EnhancementService<Scripted> {
        service(Scripted {
            chunks,
            ..Scripted::default()
        })
    }

    const HI_THERE: [&str; 3] = [
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
        "data: [DONE]\n\n",
    ];

    fn start(action: &str) -> StreamEvent {
        StreamEvent::Start { action: action.into() }
    }

    fn delta(text: &str) -> StreamEvent {
        StreamEvent::Delta { text: text.into() }
    }

    #[tokio::test]
    async fn enhance_returns_provider_text() {
        let svc = service(Scripted {
            reply: Some("rust, async"),
            ..Scripted::default()
        });
        let result = svc.enhance("notes about tokio", EnhancementAction::Tags).await.unwrap();
        assert_eq!(result.text, "rust, async");
        assert_eq!(result.usage.unwrap().total_tokens, 15);
        assert_eq!(svc.provider().calls(), 1);
    }

    #[tokio::test]
    async fn oversized_content_never_reaches_provider() {
        let svc = service(Scripted::default());
        let err = svc
            .enhance(&"a".repeat(10_001), EnhancementAction::Summarize)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EnhanceError::Rejected(PromptError::ContentTooLarge { .. })
        ));
        assert_eq!(svc.provider().calls(), 0);
    }

    #[tokio::test]
    async fn provider_fault_is_wrapped() {
        let svc = service(Scripted {
            reject: Some(401),
            ..Scripted::default()
        });
        let err = svc.enhance("text", EnhancementAction::Improve).await.unwrap_err();
        match err {
            EnhanceError::Failed { cause } => assert_eq!(cause.status(), Some(401)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_brackets_deltas_with_start_and_complete() {
        let svc = streaming(HI_THERE.to_vec());
        let events: Vec<_> = svc
            .open_stream("hello", EnhancementAction::Summarize)
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            events,
            vec![start("summarize"), delta("Hi"), delta(" there"), StreamEvent::Complete]
        );
    }

    #[tokio::test]
    async fn end_of_body_without_sentinel_completes() {
        let svc = streaming(vec!["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n"]);
        let events: Vec<_> = svc
            .open_stream("hello", EnhancementAction::Tags)
            .unwrap()
            .collect()
            .await;
        assert_eq!(events, vec![start("tags"), delta("x"), StreamEvent::Complete]);
    }

    #[tokio::test]
    async fn rejected_stream_emits_start_then_error() {
        let svc = service(Scripted {
            reject: Some(500),
            ..Scripted::default()
        });
        let events: Vec<_> = svc
            .open_stream("hello", EnhancementAction::Improve)
            .unwrap()
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], start("improve"));
        match &events[1] {
            StreamEvent::Error { message } => assert!(!message.contains("upstream detail")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_stream_input_is_rejected_before_any_event() {
        let svc = streaming(HI_THERE.to_vec());
        assert!(svc.open_stream("   ", EnhancementAction::Tags).is_err());
        assert_eq!(svc.provider().calls(), 0);
    }

    #[tokio::test]
    async fn stream_is_lazy() {
        let svc = streaming(HI_THERE.to_vec());
        let stream = svc.open_stream("hello", EnhancementAction::Tags).unwrap();
        assert_eq!(svc.provider().calls(), 0);
        drop(stream);
        assert_eq!(svc.provider().calls(), 0);
    }

    #[tokio::test]
    async fn enhance_streaming_returns_full_text() {
        let svc = streaming(HI_THERE.to_vec());
        let mut sink = Vec::new();
        let outcome = svc
            .enhance_streaming("hello", EnhancementAction::Summarize, &mut sink)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StreamOutcome::Completed {
                text: "Hi there".into()
            }
        );
        assert_eq!(sink.len(), 4);
        assert_eq!(sink.last(), Some(&StreamEvent::Complete));
    }

    #[tokio::test]
    async fn closed_sink_cancels_stream() {
        let svc = streaming(HI_THERE.to_vec());
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        drop(rx);
        let outcome = svc
            .enhance_streaming("hello", EnhancementAction::Summarize, tx)
            .await
            .unwrap();
        assert_eq!(outcome, StreamOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_mid_stream_drops_provider_promptly() {
        let dropped = Arc::new(AtomicBool::new(false));
        let svc = service(Scripted {
            chunks: vec!["data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n"],
            hang: Some(Arc::clone(&dropped)),
            ..Scripted::default()
        });
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let began = tokio::time::Instant::now();
        let task = tokio::spawn(
            svc.open_stream("hello", EnhancementAction::Summarize)
                .unwrap()
                .pipe_to(tx),
        );

        assert_eq!(rx.recv().await, Some(start("summarize")));
        assert_eq!(rx.recv().await, Some(delta("Hi")));
        assert!(!dropped.load(Ordering::SeqCst));
        drop(rx);

        assert_eq!(task.await.unwrap(), StreamOutcome::Cancelled);
        assert!(dropped.load(Ordering::SeqCst));
        assert!(began.elapsed() < std::time::Duration::from_secs(1));
    }

    #[tokio::test]
    async fn failed_stream_outcome_carries_message() {
        let svc = service(Scripted {
            reject: Some(429),
            ..Scripted::default()
        });
        let outcome = svc
            .enhance_streaming("hello", EnhancementAction::Tags, Vec::new())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StreamOutcome::Failed {
                message: "AI provider rate limit reached".into()
            }
        );
    }

    #[tokio::test]
    async fn suggestions_use_suggestion_prompt() {
        let svc = service(Scripted {
            reply: Some("- idea"),
            ..Scripted::default()
        });
        let result = svc.suggest_continuation("Trip", "").await.unwrap();
        assert_eq!(result.text, "- idea");
        assert!(matches!(
            svc.suggest_continuation("", "").await,
            Err(EnhanceError::Rejected(PromptError::MissingField { field: "title" }))
        ));
    }

    #[tokio::test]
    async fn connection_test_reports_instead_of_failing() {
        let ok = service(Scripted {
            reply: Some("API connection successful!"),
            ..Scripted::default()
        })
        .test_connection()
        .await;
        assert!(ok.success);
        assert_eq!(ok.message.as_deref(), Some("API connection successful!"));

        let down = service(Scripted {
            reject: Some(401),
            ..Scripted::default()
        })
        .test_connection()
        .await;
        assert!(!down.success);
        assert!(down.error.is_some());
        assert!(down.usage.is_none());
    }

    #[tokio::test]
    async fn empty_canary_reply_is_reported_as_no_content() {
        let report = service(Scripted::default()).test_connection().await;
        assert!(report.success);
        assert_eq!(report.message.as_deref(), Some(NO_CONTENT));
    }
}
