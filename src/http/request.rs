//! Per-request context.
//!
//! # Responsibilities
//! - Capture method, URL, and headers at request entry
//! - Record the resolved upstream and final status on the way out
//!
//! # Design Decisions
//! - Context is created by the outermost layer and never shared
//! - The upstream travels back as a response extension, so error paths
//!   that never resolve one are recorded as having none

use axum::http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use std::time::{Duration, Instant};

/// Request ID header, set by the request-id layer when absent.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Upstream host the forwarder dispatched to; attached to the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUpstream(pub String);

/// Everything the logging layer knows about one request.
#[derive(Debug, Clone)]
pub struct ProxyRequestContext {
    pub request_id: Option<String>,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub upstream: Option<String>,
    pub started_at: Instant,
    pub status: Option<StatusCode>,
}

impl ProxyRequestContext {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        Self {
            request_id,
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            upstream: None,
            started_at: Instant::now(),
            status: None,
        }
    }

    /// Record the outcome carried by the final response.
    pub fn complete<B>(&mut self, response: &Response<B>) {
        self.status = Some(response.status());
        self.upstream = response
            .extensions()
            .get::<ResolvedUpstream>()
            .map(|upstream| upstream.0.clone());
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
