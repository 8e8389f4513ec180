//! Middleware pipeline: composable before/after request handler logic.
//!
//! A [`Pipeline`] is an ordered middleware stack in front of a [`Router`].
//! Each middleware wraps the next layer and may inspect the request,
//! short-circuit with its own response, or decorate the downstream response.
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain; [`Next::run`] advances it,
//!   and once the stack is exhausted it hands the request to the router.
//! - [`LoggerMiddleware`]: one structured log line per request.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, context::Context, router::Router};

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so each middleware can forward
/// a request at most once.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    index: usize,
    endpoint: Arc<Router>,
}

impl Next {
    /// Invokes the next middleware, or the router once the stack is exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.index < self.middlewares.len() {
            let handler = Arc::clone(&self.middlewares[self.index]);
            self.index += 1;
            handler(ctx, self).await
        } else {
            self.endpoint.dispatch(ctx).await
        }
    }
}

/// The core trait for all middleware.
///
/// Implementations must be `Send + Sync` since the stack is shared across
/// connection tasks, and must not hold `&mut` references to shared state
/// across an `.await` point.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// An ordered middleware stack terminating in a [`Router`].
///
/// Cheap to clone; every connection task holds its own handle.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use note_assist::{Router, middleware::{LoggerMiddleware, Pipeline}};
///
/// let pipeline = Pipeline::new(Router::new()).with(Arc::new(LoggerMiddleware));
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Arc<Router>,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        Self {
            middlewares: Arc::from(Vec::<MiddlewareHandler>::new()),
            endpoint: Arc::new(router),
        }
    }

    /// Appends a middleware; the first one added is the outermost layer.
    #[must_use]
    pub fn with<M>(self, middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        let mut stack: Vec<MiddlewareHandler> = self.middlewares.iter().cloned().collect();
        stack.push(from_middleware(middleware));
        Self {
            middlewares: Arc::from(stack),
            endpoint: self.endpoint,
        }
    }

    /// Runs `request` through the whole stack.
    pub async fn handle(&self, request: Request) -> Response {
        let next = Next {
            middlewares: Arc::clone(&self.middlewares),
            index: 0,
            endpoint: Arc::clone(&self.endpoint),
        };
        next.run(Context::new(request)).await
    }
}

/// Logs each request's method, path, status, and duration.
///
/// For streamed responses the duration covers time to the response head,
/// not the whole stream.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            tracing::info!(
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                streaming = response.is_streaming(),
                elapsed = ?start.elapsed(),
                "request handled"
            );

            response
        })
    }
}
