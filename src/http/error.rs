//! Request-path and setup errors.

use axum::http::header::{InvalidHeaderName, InvalidHeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Everything that can stop a request from reaching or returning from upstream.
///
/// Rate limit rejections are deliberately absent: they are an outcome,
/// not a failure.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The configured upstream source was absent or blank.
    #[error("{0}")]
    MissingTarget(String),

    /// The upstream string cannot be used as a URI authority.
    #[error("Invalid upstream target: {0}")]
    InvalidTarget(String),

    #[error("Failed to build upstream request: {0}")]
    RequestBuild(#[from] axum::http::Error),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingTarget(_) | ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ProxyError::RequestBuild(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = match &self {
            ProxyError::MissingTarget(_) | ProxyError::InvalidTarget(_) => self.to_string(),
            ProxyError::RequestBuild(_) => "Failed to build upstream request".to_string(),
            ProxyError::Upstream(_) => "Upstream request failed".to_string(),
        };
        (self.status(), body).into_response()
    }
}

/// Failure turning a validated config into a running pipeline.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid substitution pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid marker header name: {0}")]
    MarkerName(#[from] InvalidHeaderName),

    #[error("invalid marker header value: {0}")]
    MarkerValue(#[from] InvalidHeaderValue),
}
