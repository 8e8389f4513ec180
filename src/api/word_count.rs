use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::{Response, StatusCode};

/// Whitespace-token statistics for a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WordCount {
    pub word_count: usize,
    /// UTF-8 byte length.
    pub character_count: usize,
    /// Newlines plus one.
    pub line_count: usize,
}

impl WordCount {
    pub fn of(text: &str) -> Self {
        Self {
            word_count: text.split_whitespace().count(),
            character_count: text.len(),
            line_count: text.bytes().filter(|b| *b == b'\n').count() + 1,
        }
    }
}

#[derive(Deserialize)]
struct WordCountBody {
    text: Option<String>,
}

pub(super) async fn handle(ctx: Context) -> Response {
    let text = ctx.json::<WordCountBody>().ok().and_then(|body| body.text);
    match text {
        Some(text) => Response::json(StatusCode::Ok, &WordCount::of(&text)),
        None => Response::json(
            StatusCode::BadRequest,
            &serde_json::json!({ "error": "Text parameter is required" }),
        ),
    }
}
