use futures::stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::context::Context;
use crate::enhance::{EnhanceError, EnhancementAction, EnhancementService, PromptError};
use crate::llm::ChatProvider;
use crate::realtime::{StreamEvent, sse_response};
use crate::{Response, StatusCode};

/// Events buffered between the provider task and the client connection.
const EVENT_BUFFER: usize = 32;

#[derive(Debug, Deserialize)]
struct EnhanceBody {
    content: Option<String>,
    action: Option<String>,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct SuggestBody {
    title: Option<String>,
    #[serde(default)]
    partial_content: Option<String>,
}

/// `POST /api/ai/enhance` with a JSON body.
pub(super) async fn enhance_json<P: ChatProvider>(svc: EnhancementService<P>, ctx: Context) -> Response {
    match ctx.json::<EnhanceBody>() {
        Ok(body) => run_enhance(&svc, body.content, body.action, body.stream).await,
        Err(e) => failure(StatusCode::UnprocessableEntity, e.to_string()),
    }
}

/// `GET /api/ai/enhance?content=&action=&stream=`.
pub(super) async fn enhance_query<P: ChatProvider>(svc: EnhancementService<P>, ctx: Context) -> Response {
    let content = ctx.query("content").map(str::to_owned);
    let action = ctx.query("action").map(str::to_owned);
    run_enhance(&svc, content, action, ctx.query_flag("stream")).await
}

async fn run_enhance<P: ChatProvider>(
    svc: &EnhancementService<P>,
    content: Option<String>,
    action: Option<String>,
    stream: bool,
) -> Response {
    let (content, action) = match parse_input(content, action) {
        Ok(input) => input,
        Err(e) => return enhance_failure(&EnhanceError::Rejected(e)),
    };

    if stream {
        return match svc.open_stream(&content, action) {
            Ok(events) => {
                let (tx, rx) = mpsc::channel::<StreamEvent>(EVENT_BUFFER);
                tokio::spawn(events.pipe_to(tx));
                sse_response(receiver_stream(rx))
            }
            Err(e) => enhance_failure(&e),
        };
    }

    match svc.enhance(&content, action).await {
        Ok(result) => Response::json(
            StatusCode::Ok,
            &serde_json::json!({
                "success": true,
                "content": result.text,
                "usage": result.usage,
            }),
        ),
        Err(e) => enhance_failure(&e),
    }
}

fn parse_input(
    content: Option<String>,
    action: Option<String>,
) -> Result<(String, EnhancementAction), PromptError> {
    let content = content.ok_or(PromptError::MissingField { field: "content" })?;
    let action = action
        .ok_or(PromptError::MissingField { field: "action" })?
        .parse::<EnhancementAction>()?;
    Ok((content, action))
}

/// Yields channel events until every sender is gone.
///
/// The server drops this stream when the client disconnects, which closes
/// the channel; the provider task watches for that and stops.
fn receiver_stream(rx: mpsc::Receiver<StreamEvent>) -> impl futures::Stream<Item = StreamEvent> + Send + 'static {
    stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((event, rx))
    })
}

/// `POST /api/ai/suggest`.
pub(super) async fn suggest<P: ChatProvider>(svc: EnhancementService<P>, ctx: Context) -> Response {
    let body = match ctx.json::<SuggestBody>() {
        Ok(body) => body,
        Err(e) => return failure(StatusCode::UnprocessableEntity, e.to_string()),
    };
    let title = body.title.unwrap_or_default();
    let partial = body.partial_content.unwrap_or_default();

    match svc.suggest_continuation(&title, &partial).await {
        Ok(result) => Response::json(
            StatusCode::Ok,
            &serde_json::json!({
                "success": true,
                "suggestions": result.text,
                "usage": result.usage,
            }),
        ),
        Err(e) if e.is_client_fault() => failure(StatusCode::UnprocessableEntity, e.public_message()),
        Err(e) => failure(
            StatusCode::InternalServerError,
            format!("Failed to generate suggestions: {}", e.public_message()),
        ),
    }
}

/// `GET /api/ai/test`. Always `200`; the report says whether it worked.
pub(super) async fn test_connection<P: ChatProvider>(svc: EnhancementService<P>) -> Response {
    let report = svc.test_connection().await;
    debug!(success = report.success, "connection test finished");
    Response::json(StatusCode::Ok, &report)
}

fn enhance_failure(e: &EnhanceError) -> Response {
    if e.is_client_fault() {
        failure(StatusCode::UnprocessableEntity, e.public_message())
    } else {
        failure(
            StatusCode::InternalServerError,
            format!("AI enhancement failed: {}", e.public_message()),
        )
    }
}

fn failure(status: StatusCode, error: String) -> Response {
    Response::json(status, &serde_json::json!({ "success": false, "error": error }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_reported_by_name() {
        assert_eq!(
            parse_input(None, Some("tags".into())).unwrap_err(),
            PromptError::MissingField { field: "content" }
        );
        assert_eq!(
            parse_input(Some("x".into()), None).unwrap_err(),
            PromptError::MissingField { field: "action" }
        );
    }

    #[test]
    fn unknown_action_is_invalid() {
        assert_eq!(
            parse_input(Some("x".into()), Some("translate".into())).unwrap_err(),
            PromptError::InvalidAction("translate".into())
        );
    }

    #[test]
    fn upstream_failure_maps_to_500() {
        let e = EnhanceError::Failed {
            cause: crate::llm::LlmError::Timeout,
        };
        let res = enhance_failure(&e);
        assert_eq!(res.status(), StatusCode::InternalServerError);
        let body: serde_json::Value = serde_json::from_slice(res.full_body().unwrap()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "AI enhancement failed: AI provider timed out");
    }

    #[tokio::test]
    async fn receiver_stream_ends_when_senders_drop() {
        use futures::StreamExt;

        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamEvent::Complete).await.unwrap();
        drop(tx);
        let events: Vec<_> = receiver_stream(rx).collect().await;
        assert_eq!(events, vec![StreamEvent::Complete]);
    }
}
