//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind host, port).
    pub listener: ListenerConfig,

    /// Where the upstream host is read from on each request.
    pub upstream: UpstreamConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Response rewriting.
    pub rewrite: RewriteConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub bind_host: String,

    /// Port to bind. Overridden by the `PORT` environment variable.
    pub port: u16,
}

impl ListenerConfig {
    /// Full `host:port` bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Upstream resolution configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub source: UpstreamSource,
}

/// Where the upstream host comes from. One deployment uses exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpstreamSource {
    /// Query parameter, e.g. `/path?target=example.com`.
    Query {
        #[serde(default = "default_query_param")]
        param: String,
    },
    /// Request header, e.g. `Target-URL: example.com`.
    Header {
        #[serde(default = "default_target_header")]
        name: String,
    },
}

impl Default for UpstreamSource {
    fn default() -> Self {
        UpstreamSource::Query {
            param: default_query_param(),
        }
    }
}

fn default_query_param() -> String {
    "target".to_string()
}

fn default_target_header() -> String {
    "Target-URL".to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum admitted requests per client per window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// How often stale client entries are swept (0 = never).
    pub eviction_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 10,
            window_secs: 60,
            eviction_interval_secs: 0,
        }
    }
}

/// Response rewriting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Header added to every proxied response.
    pub marker_header: String,

    /// Value of the marker header.
    pub marker_value: String,

    /// Body transformation applied to each written chunk.
    pub rule: RewriteRuleConfig,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            marker_header: "X-Custom-Response-Header".to_string(),
            marker_value: "Modified-Response".to_string(),
            rule: RewriteRuleConfig::default(),
        }
    }
}

/// Body transformation variants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewriteRuleConfig {
    /// Replace every occurrence of `find` with `replace`.
    Substitute {
        find: String,
        replace: String,
        /// Content-type prefixes the substitution applies to.
        /// An empty list applies it to every response.
        #[serde(default = "default_text_types")]
        content_types: Vec<String>,
    },
    /// Append `snippet` after every chunk of an HTML body.
    InjectHtml {
        #[serde(default = "default_snippet")]
        snippet: String,
    },
}

impl Default for RewriteRuleConfig {
    fn default() -> Self {
        RewriteRuleConfig::Substitute {
            find: "Hello".to_string(),
            replace: "Modified Hello".to_string(),
            content_types: default_text_types(),
        }
    }
}

fn default_text_types() -> Vec<String> {
    vec!["text/".to_string()]
}

fn default_snippet() -> String {
    "<script>alert('Modified Message');</script>".to_string()
}

/// Timeout configuration for upstream connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { connect_secs: 10 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
