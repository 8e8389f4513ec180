//! Request routing: map paths and HTTP methods to handler functions.
//!
//! The API surface is a handful of fixed paths, so routes match on the exact
//! path. Trailing slashes are normalized on both the registered path and the
//! incoming one, so `/api/ai/test/` and `/api/ai/test` are the same route.
//!
//! When a path is known but not for the request's method the router answers
//! `405 Method Not Allowed` with an `Allow` header; unknown paths get `404`.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::{Method, Response, StatusCode};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and returns a
/// [`Response`].
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

fn normalize(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

/// HTTP request router.
///
/// Routes are evaluated in registration order; the first route whose method
/// and path both match is used.
///
/// # Examples
///
/// ```rust,no_run
/// use note_assist::context::Context;
/// use note_assist::{Router, Response, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/health", |_ctx: Context| async { Response::new(StatusCode::Ok) });
/// ```
pub struct Router {
    routes: Vec<Route>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a handler for `GET` requests on `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register a handler for `POST` requests on `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx: Context| handler.call(ctx));
        self.routes.push(Route {
            method,
            path: normalize(path).to_owned(),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch the request in `ctx` to the first matching route.
    ///
    /// # Returns
    ///
    /// The handler's response; `405` with an `Allow` header when only the
    /// method mismatched; `404` otherwise.
    pub async fn dispatch(&self, ctx: Context) -> Response {
        let path = normalize(ctx.request().path()).to_owned();
        let method = ctx.request().method().clone();

        let mut allowed: Vec<&str> = Vec::new();
        for route in &self.routes {
            if route.path != path {
                continue;
            }
            if route.method == method {
                return (route.handler)(ctx).await;
            }
            allowed.push(route.method.as_str());
        }

        if allowed.is_empty() {
            Response::json(
                StatusCode::NotFound,
                &serde_json::json!({ "error": format!("no route for {path}") }),
            )
        } else {
            Response::json(
                StatusCode::MethodNotAllowed,
                &serde_json::json!({ "error": format!("{method} not allowed on {path}") }),
            )
            .header("Allow", allowed.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Request;

    fn ctx(method: &str, path: &str) -> Context {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req)
    }

    fn ai_router() -> Router {
        let mut router = Router::new();
        router.post("/api/ai/enhance", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.get("/api/ai/enhance", |_ctx: Context| async { Response::new(StatusCode::NoContent) });
        router.get("/api/ai/test", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router
    }

    #[test]
    fn router_counts_routes() {
        assert!(Router::default().is_empty());
        assert_eq!(ai_router().len(), 3);
    }

    #[tokio::test]
    async fn same_path_dispatches_by_method() {
        let router = ai_router();
        let post = router.dispatch(ctx("POST", "/api/ai/enhance")).await;
        let get = router.dispatch(ctx("GET", "/api/ai/enhance")).await;
        assert_eq!(post.status(), StatusCode::Ok);
        assert_eq!(get.status(), StatusCode::NoContent);
    }

    #[tokio::test]
    async fn trailing_slash_is_ignored() {
        let router = ai_router();
        let res = router.dispatch(ctx("GET", "/api/ai/test/")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let router = ai_router();
        let res = router.dispatch(ctx("POST", "/api/ai/test")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
        assert_eq!(res.headers().get("allow"), Some("GET"));
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let router = ai_router();
        let res = router.dispatch(ctx("GET", "/notes")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }
}
