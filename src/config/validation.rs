//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (window > 0, limit > 0, timeouts > 0)
//! - Check that configured header names and values are legal HTTP
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::{HeaderName, HeaderValue};
use std::fmt;

use crate::config::schema::{ProxyConfig, RewriteRuleConfig, UpstreamSource};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a configuration, collecting every violation.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match &config.upstream.source {
        UpstreamSource::Query { param } => {
            if param.trim().is_empty() {
                errors.push(ValidationError::new("upstream.source.param", "must not be empty"));
            }
        }
        UpstreamSource::Header { name } => {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                errors.push(ValidationError::new(
                    "upstream.source.name",
                    format!("'{}' is not a valid header name", name),
                ));
            }
        }
    }

    if config.rate_limit.enabled {
        if config.rate_limit.max_requests == 0 {
            errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
        }
        if config.rate_limit.window_secs == 0 {
            errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
        }
    }

    if HeaderName::from_bytes(config.rewrite.marker_header.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "rewrite.marker_header",
            format!("'{}' is not a valid header name", config.rewrite.marker_header),
        ));
    }
    if HeaderValue::from_str(&config.rewrite.marker_value).is_err() {
        errors.push(ValidationError::new("rewrite.marker_value", "is not a valid header value"));
    }

    match &config.rewrite.rule {
        RewriteRuleConfig::Substitute { find, .. } => {
            if find.is_empty() {
                errors.push(ValidationError::new("rewrite.rule.find", "must not be empty"));
            }
        }
        RewriteRuleConfig::InjectHtml { snippet } => {
            if snippet.is_empty() {
                errors.push(ValidationError::new("rewrite.rule.snippet", "must not be empty"));
            }
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("'{}' is not one of {}", config.observability.log_level, LOG_LEVELS.join(", ")),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
