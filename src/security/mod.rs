//! Security middleware.
//!
//! - [`CorsMiddleware`]: Cross-Origin Resource Sharing for the editor UI,
//!   which calls the AI endpoints from the browser.

mod middleware;

pub use middleware::CorsMiddleware;
