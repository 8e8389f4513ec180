//! HTTP surface: route table and handlers.
//!
//! | Method | Path               | Handler                      |
//! |--------|--------------------|------------------------------|
//! | POST   | `/api/ai/enhance`  | buffered or SSE enhancement  |
//! | GET    | `/api/ai/enhance`  | same, from the query string  |
//! | POST   | `/api/ai/suggest`  | continuation suggestions     |
//! | GET    | `/api/ai/test`     | provider connection check    |
//! | POST   | `/api/word-count`  | word/character/line counts   |
//! | GET    | `/health`          | liveness                     |

mod ai;
mod word_count;

use crate::context::Context;
use crate::enhance::EnhancementService;
use crate::llm::ChatProvider;
use crate::{Response, Router, StatusCode};

pub use word_count::WordCount;

/// Builds the router for every endpoint, sharing `service` across handlers.
pub fn routes<P: ChatProvider>(service: EnhancementService<P>) -> Router {
    let mut router = Router::new();

    let svc = service.clone();
    router.post("/api/ai/enhance", move |ctx: Context| ai::enhance_json(svc.clone(), ctx));

    let svc = service.clone();
    router.get("/api/ai/enhance", move |ctx: Context| ai::enhance_query(svc.clone(), ctx));

    let svc = service.clone();
    router.post("/api/ai/suggest", move |ctx: Context| ai::suggest(svc.clone(), ctx));

    let svc = service;
    router.get("/api/ai/test", move |_ctx: Context| ai::test_connection(svc.clone()));

    router.post("/api/word-count", word_count::handle);
    router.get("/health", |_ctx: Context| async {
        Response::json(StatusCode::Ok, &serde_json::json!({ "status": "ok" }))
    });

    router
}
