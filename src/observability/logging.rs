//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (pretty or JSON)
//! - Emit one line per request with method, URL, headers, upstream,
//!   status, and duration
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - The request line is written once the response body has been sent
//!   (or has failed, or the caller went away), so the duration covers the
//!   whole transfer and rejections report their real status
//! - Credentials are redacted before headers reach the log

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};
use crate::http::request::ProxyRequestContext;
use crate::observability::metrics;

/// Header values replaced with `[REDACTED]` in log output.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "proxy-authorization",
    "set-cookie",
    "x-api-key",
];

const REDACTED: &str = "[REDACTED]";

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.log_level.to_ascii_lowercase();
        format!("relay_proxy={level},tower_http={level}").into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

/// Header list safe to log.
pub fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                REDACTED.to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_owned(), value)
        })
        .collect()
}

/// Outermost middleware: times the request and logs its final outcome.
///
/// The line is emitted by [`LoggedBody`] when the response body ends.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let mut context = ProxyRequestContext::from_request(&request);
    let response = next.run(request).await;
    context.complete(&response);

    response.map(|body| Body::new(LoggedBody::new(body, context)))
}

/// How the response body left the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BodyOutcome {
    Completed,
    Failed(String),
    /// Dropped before the end: caller disconnect or write error.
    Aborted,
}

/// Response body that writes the request line when it finishes or is dropped.
pub struct LoggedBody {
    inner: Body,
    context: Option<ProxyRequestContext>,
    bytes_sent: u64,
}

impl LoggedBody {
    pub fn new(inner: Body, context: ProxyRequestContext) -> Self {
        Self {
            inner,
            context: Some(context),
            bytes_sent: 0,
        }
    }

    fn finish(&mut self, outcome: BodyOutcome) {
        if let Some(context) = self.context.take() {
            log_request(&context, self.bytes_sent, &outcome);
            metrics::record_request(
                context.method.as_str(),
                context.status.map(|s| s.as_u16()).unwrap_or_default(),
                context.elapsed(),
            );
        }
    }
}

impl HttpBody for LoggedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes_sent += data.len() as u64;
                }
                if this.inner.is_end_stream() {
                    this.finish(BodyOutcome::Completed);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => {
                this.finish(BodyOutcome::Failed(err.to_string()));
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.finish(BodyOutcome::Completed);
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for LoggedBody {
    fn drop(&mut self) {
        // Empty bodies are never polled; they end here.
        let outcome = if self.inner.is_end_stream() {
            BodyOutcome::Completed
        } else {
            BodyOutcome::Aborted
        };
        self.finish(outcome);
    }
}

fn log_request(context: &ProxyRequestContext, bytes: u64, outcome: &BodyOutcome) {
    let status = context.status.map(|s| s.as_u16()).unwrap_or_default();
    let duration_ms = context.elapsed().as_secs_f64() * 1000.0;
    let headers = redact_headers(&context.headers);
    let request_id = context.request_id.as_deref().unwrap_or("-");
    let upstream = context.upstream.as_deref().unwrap_or("-");
    let completed = *outcome == BodyOutcome::Completed;

    match outcome {
        BodyOutcome::Completed if status < 400 => tracing::info!(
            request_id = %request_id,
            method = %context.method,
            uri = %context.uri,
            headers = ?headers,
            upstream = %upstream,
            status,
            duration_ms,
            bytes,
            completed,
            "Request completed"
        ),
        BodyOutcome::Completed | BodyOutcome::Aborted => tracing::warn!(
            request_id = %request_id,
            method = %context.method,
            uri = %context.uri,
            headers = ?headers,
            upstream = %upstream,
            status,
            duration_ms,
            bytes,
            completed,
            "Request completed"
        ),
        BodyOutcome::Failed(error) => tracing::warn!(
            request_id = %request_id,
            method = %context.method,
            uri = %context.uri,
            headers = ?headers,
            upstream = %upstream,
            status,
            duration_ms,
            bytes,
            completed,
            error = %error,
            "Request completed"
        ),
    }
}
