use std::pin::Pin;

use crate::{
    Method, Response, StatusCode,
    context::Context,
    middleware::{Middleware, Next},
};

/// CORS middleware: validates the `Origin` header, answers preflight
/// requests, and adds `Access-Control-*` headers to actual responses.
///
/// # Behavior
///
/// - No `Origin` header, or an origin outside the allow-list: the request
///   passes through unmodified.
/// - `OPTIONS` preflight from an allowed origin: short-circuited with
///   `204 No Content`; the router is not called.
/// - Anything else from an allowed origin: the handler runs and the CORS
///   headers are appended. SSE responses are decorated the same way, before
///   the first chunk is written.
/// - A specific (non-wildcard) origin is echoed back with `Vary: Origin`.
///
/// # Examples
///
/// ```rust
/// use note_assist::security::CorsMiddleware;
///
/// let any = CorsMiddleware::from_origins(Vec::<String>::new());
/// let editor_only = CorsMiddleware::from_origins(["https://notes.example.com"]);
/// ```
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::from_origins(Vec::<String>::new())
    }
}

impl CorsMiddleware {
    /// Builds the policy for the API's `GET`/`POST` routes.
    ///
    /// An empty origin list allows every origin (`*`).
    pub fn from_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allowed_origins: Vec<String> = origins.into_iter().map(Into::into).collect();
        if allowed_origins.is_empty() {
            allowed_origins.push("*".to_owned());
        }
        Self {
            allowed_origins,
            allowed_methods: ["GET", "POST", "OPTIONS"].map(str::to_owned).to_vec(),
            allowed_headers: ["Content-Type", "Accept", "Authorization"]
                .map(str::to_owned)
                .to_vec(),
        }
    }

    fn resolve_origin(&self, origin: &str) -> Option<String> {
        if self.allowed_origins.iter().any(|o| o == "*") {
            Some("*".to_owned())
        } else if self.allowed_origins.iter().any(|o| o == origin) {
            Some(origin.to_owned())
        } else {
            None
        }
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let allow_origin = ctx
            .request()
            .headers()
            .get("origin")
            .and_then(|origin| self.resolve_origin(origin));
        let methods = self.allowed_methods.join(", ");
        let headers = self.allowed_headers.join(", ");

        Box::pin(async move {
            let Some(allow_origin) = allow_origin else {
                return next.run(ctx).await;
            };
            let is_wildcard = allow_origin == "*";

            let mut resp = if ctx.request().method() == &Method::Options {
                Response::new(StatusCode::NoContent).header("Access-Control-Max-Age", "3600")
            } else {
                next.run(ctx).await
            };

            resp.add_header("Access-Control-Allow-Origin", allow_origin);
            resp.add_header("Access-Control-Allow-Methods", methods);
            resp.add_header("Access-Control-Allow-Headers", headers);
            if !is_wildcard {
                resp.add_header("Vary", "Origin");
            }
            resp
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{Request, Router, middleware::Pipeline};

    fn pipeline(cors: CorsMiddleware) -> Pipeline {
        let mut router = Router::new();
        router.post("/api/word-count", |_ctx: Context| async {
            Response::new(StatusCode::Ok).body("{}")
        });
        Pipeline::new(router).with(Arc::new(cors))
    }

    fn request(method: &str, origin: Option<&str>) -> Request {
        let origin = origin
            .map(|o| format!("Origin: {o}\r\n"))
            .unwrap_or_default();
        let raw = format!("{method} /api/word-count HTTP/1.1\r\n{origin}\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let res = pipeline(CorsMiddleware::default())
            .handle(request("OPTIONS", Some("https://notes.example.com")))
            .await;
        assert_eq!(res.status(), StatusCode::NoContent);
        assert_eq!(res.headers().get("access-control-allow-origin"), Some("*"));
        assert_eq!(res.headers().get("access-control-max-age"), Some("3600"));
        assert!(res.headers().get("vary").is_none());
    }

    #[tokio::test]
    async fn specific_origin_is_echoed_with_vary() {
        let cors = CorsMiddleware::from_origins(["https://notes.example.com"]);
        let res = pipeline(cors)
            .handle(request("POST", Some("https://notes.example.com")))
            .await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(
            res.headers().get("access-control-allow-origin"),
            Some("https://notes.example.com")
        );
        assert_eq!(res.headers().get("vary"), Some("Origin"));
    }

    #[tokio::test]
    async fn foreign_origin_gets_no_cors_headers() {
        let cors = CorsMiddleware::from_origins(["https://notes.example.com"]);
        let res = pipeline(cors)
            .handle(request("POST", Some("https://evil.example")))
            .await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert!(!res.headers().contains("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn same_origin_requests_pass_untouched() {
        let res = pipeline(CorsMiddleware::default())
            .handle(request("POST", None))
            .await;
        assert!(!res.headers().contains("access-control-allow-origin"));
    }
}
