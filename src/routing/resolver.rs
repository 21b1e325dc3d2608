//! Upstream resolution.
//!
//! # Responsibilities
//! - Read the upstream host from the configured query parameter or header
//! - Report an explicit miss when the source is absent or blank
//!
//! # Design Decisions
//! - No host syntax validation here; any non-empty string is a candidate
//! - First occurrence wins for repeated query parameters
//! - Header names are matched case-insensitively

use axum::http::Request;

use crate::config::UpstreamSource;

/// Extracts the upstream host for each request.
#[derive(Debug, Clone)]
pub struct UpstreamResolver {
    source: UpstreamSource,
}

impl UpstreamResolver {
    pub fn new(source: UpstreamSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &UpstreamSource {
        &self.source
    }

    /// Returns the upstream host, or `None` if the source is missing or blank.
    pub fn resolve<B>(&self, request: &Request<B>) -> Option<String> {
        let raw = match &self.source {
            UpstreamSource::Query { param } => request.uri().query().and_then(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .find(|(key, _)| key == param)
                    .map(|(_, value)| value.into_owned())
            }),
            UpstreamSource::Header { name } => request
                .headers()
                .get(name.as_str())
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned),
        }?;

        let host = raw.trim();
        if host.is_empty() {
            None
        } else {
            Some(host.to_owned())
        }
    }

    /// Plain-text reason returned to the caller when resolution fails.
    pub fn missing_reason(&self) -> String {
        match &self.source {
            UpstreamSource::Query { param } if param == "target" => {
                "Target query parameter is required".to_string()
            }
            UpstreamSource::Query { param } => format!("Query parameter '{}' is required", param),
            UpstreamSource::Header { name } => format!("{} header is required", name),
        }
    }
}
