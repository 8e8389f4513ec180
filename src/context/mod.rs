//! Per-request context handed to middleware and route handlers.

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::Request;

/// Errors raised while extracting typed input from a request.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("request body is empty; expected a JSON object")]
    EmptyBody,

    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Per-request context: the parsed request plus typed accessors over it.
pub struct Context {
    request: Request,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Deserializes the request body as JSON.
    ///
    /// # Errors
    ///
    /// [`ContextError::EmptyBody`] when there is no body at all, and
    /// [`ContextError::InvalidJson`] when it does not parse into `T`
    /// (including missing required fields).
    pub fn json<T>(&self) -> Result<T, ContextError>
    where
        T: DeserializeOwned,
    {
        let body = self.request.body();
        if body.is_empty() {
            return Err(ContextError::EmptyBody);
        }
        Ok(serde_json::from_slice(body)?)
    }

    /// Returns a decoded query parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.request.query_param(key)
    }

    /// Interprets a query parameter as a boolean flag.
    ///
    /// `true`, `1`, `yes` and `on` (any case) are true; anything else,
    /// including absence, is false.
    pub fn query_flag(&self, key: &str) -> bool {
        self.query(key).is_some_and(|v| {
            ["true", "1", "yes", "on"]
                .iter()
                .any(|t| v.eq_ignore_ascii_case(t))
        })
    }
}
