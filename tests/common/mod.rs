#![allow(dead_code)]

use std::time::Duration;

use futures::StreamExt;
use note_assist::config::ProviderConfig;
use note_assist::enhance::{EnhancementService, PromptBuilder};
use note_assist::llm::{LlmClient, StreamTranscoder};
use note_assist::middleware::Pipeline;
use note_assist::{Request, Response, api};
use serde_json::{Value, json};
use wiremock::MockServer;

pub const API_KEY: &str = "test-key";

pub fn provider_config(provider: &MockServer) -> ProviderConfig {
    let mut config = ProviderConfig::new(API_KEY, provider.uri());
    config.request_timeout = Duration::from_secs(5);
    config.stream_idle_timeout = Duration::from_secs(5);
    config
}

pub fn client(provider: &MockServer) -> LlmClient {
    LlmClient::new(provider_config(provider)).unwrap()
}

pub fn pipeline(provider: &MockServer) -> Pipeline {
    let service = EnhancementService::new(
        client(provider),
        PromptBuilder::default(),
        StreamTranscoder::new(Duration::from_secs(5)),
    );
    Pipeline::new(api::routes(service))
}

/// Provider body for a buffered completion.
pub fn completion(text: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 20, "completion_tokens": 6, "total_tokens": 26 }
    })
}

/// Provider body for a streamed completion carrying `fragments`.
pub fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let frame = json!({ "choices": [{ "index": 0, "delta": { "content": fragment } }] });
        body.push_str(&format!("data: {frame}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn post_json(path: &str, body: &Value) -> Request {
    let body = body.to_string();
    let raw = format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    Request::parse(raw.as_bytes()).unwrap().0
}

pub fn get(target: &str) -> Request {
    let raw = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    Request::parse(raw.as_bytes()).unwrap().0
}

pub fn json_body(response: &Response) -> Value {
    serde_json::from_slice(response.full_body().unwrap()).unwrap()
}

/// Collects a streamed response body as text.
pub async fn streamed_body(response: Response) -> String {
    let (_, body) = response.into_wire();
    let chunks: Vec<_> = body.unwrap().collect().await;
    chunks
        .iter()
        .map(|c| String::from_utf8(c.to_vec()).unwrap())
        .collect()
}
