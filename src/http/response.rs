//! Response handling and transformation.
//!
//! # Responsibilities
//! - Add the rewrite marker header before any body bytes are sent
//! - Transform each body write (data frame) with the configured rule
//! - Keep framing honest when the body length changes
//!
//! # Design Decisions
//! - Streaming: each frame is rewritten alone, using only its bytes and the
//!   response Content-Type; nothing is buffered across frames
//! - Content-Length is dropped from rewritten responses so the transport
//!   frames the new length itself; a body that disagrees with a declared
//!   length is a transport write error
//! - Compressed bodies (non-identity Content-Encoding) are never touched

use std::borrow::Cow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use axum::body::Body;
use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE,
};
use axum::http::Response;
use axum::BoxError;
use bytes::{Bytes, BytesMut};
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use pin_project_lite::pin_project;
use regex::bytes::{NoExpand, Regex};

use crate::config::{RewriteConfig, RewriteRuleConfig};
use crate::http::error::SetupError;
use crate::observability::metrics;

/// Compiled body transformation.
#[derive(Debug, Clone)]
pub enum RewriteRule {
    /// Literal find/replace over every non-overlapping match.
    Substitute {
        pattern: Regex,
        replacement: Bytes,
        /// Lowercased Content-Type prefixes; empty matches everything.
        content_types: Vec<String>,
    },
    /// Append a snippet after each chunk of an HTML body.
    InjectHtml { snippet: Bytes },
}

impl RewriteRule {
    pub fn from_config(config: &RewriteRuleConfig) -> Result<Self, regex::Error> {
        Ok(match config {
            RewriteRuleConfig::Substitute {
                find,
                replace,
                content_types,
            } => RewriteRule::Substitute {
                pattern: Regex::new(&regex::escape(find))?,
                replacement: Bytes::copy_from_slice(replace.as_bytes()),
                content_types: content_types.iter().map(|t| t.to_ascii_lowercase()).collect(),
            },
            RewriteRuleConfig::InjectHtml { snippet } => RewriteRule::InjectHtml {
                snippet: Bytes::copy_from_slice(snippet.as_bytes()),
            },
        })
    }

    /// Short label for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            RewriteRule::Substitute { .. } => "substitute",
            RewriteRule::InjectHtml { .. } => "inject_html",
        }
    }

    /// Whether a response with this Content-Type gets its body rewritten.
    pub fn applies_to(&self, content_type: Option<&HeaderValue>) -> bool {
        let media_type = content_type.and_then(media_type);
        match self {
            RewriteRule::Substitute { content_types, .. } => {
                content_types.is_empty()
                    || media_type.is_some_and(|media| {
                        content_types.iter().any(|prefix| media.starts_with(prefix.as_str()))
                    })
            }
            RewriteRule::InjectHtml { .. } => media_type.as_deref() == Some("text/html"),
        }
    }

    /// Rewrite one chunk unconditionally.
    pub fn rewrite_chunk(&self, chunk: Bytes) -> Bytes {
        match self {
            RewriteRule::Substitute {
                pattern,
                replacement,
                ..
            } => {
                let changed = match pattern.replace_all(&chunk, NoExpand(&replacement[..])) {
                    Cow::Borrowed(_) => None,
                    Cow::Owned(changed) => Some(changed),
                };
                changed.map(Bytes::from).unwrap_or(chunk)
            }
            RewriteRule::InjectHtml { snippet } => {
                let mut out = BytesMut::with_capacity(chunk.len() + snippet.len());
                out.extend_from_slice(&chunk);
                out.extend_from_slice(snippet);
                out.freeze()
            }
        }
    }

    /// (content-type, chunk) → chunk, unchanged when the rule does not apply.
    pub fn transform(&self, content_type: Option<&HeaderValue>, chunk: Bytes) -> Bytes {
        if self.applies_to(content_type) {
            self.rewrite_chunk(chunk)
        } else {
            chunk
        }
    }
}

/// Lowercased `type/subtype` with parameters removed.
fn media_type(value: &HeaderValue) -> Option<String> {
    let raw = value.to_str().ok()?;
    let essence = raw.split(';').next().unwrap_or_default().trim();
    Some(essence.to_ascii_lowercase())
}

fn is_identity_encoded(headers: &HeaderMap) -> bool {
    headers.get_all(CONTENT_ENCODING).iter().all(|value| {
        value
            .to_str()
            .map(|v| v.trim().eq_ignore_ascii_case("identity"))
            .unwrap_or(false)
    })
}

/// Applies the marker header and body rule to upstream responses.
#[derive(Debug, Clone)]
pub struct ResponseRewriter {
    rule: Arc<RewriteRule>,
    marker_name: HeaderName,
    marker_value: HeaderValue,
}

impl ResponseRewriter {
    pub fn new(rule: RewriteRule, marker_name: HeaderName, marker_value: HeaderValue) -> Self {
        Self {
            rule: Arc::new(rule),
            marker_name,
            marker_value,
        }
    }

    pub fn from_config(config: &RewriteConfig) -> Result<Self, SetupError> {
        Ok(Self::new(
            RewriteRule::from_config(&config.rule)?,
            HeaderName::from_bytes(config.marker_header.as_bytes())?,
            HeaderValue::from_str(&config.marker_value)?,
        ))
    }

    pub fn rule(&self) -> &RewriteRule {
        &self.rule
    }

    /// Wrap a response so its body is rewritten as it is written out.
    pub fn rewrite<B>(&self, response: Response<B>) -> Response<Body>
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (mut parts, body) = response.into_parts();
        parts
            .headers
            .insert(self.marker_name.clone(), self.marker_value.clone());

        let active = !body.is_end_stream()
            && is_identity_encoded(&parts.headers)
            && self.rule.applies_to(parts.headers.get(CONTENT_TYPE));

        if active {
            parts.headers.remove(CONTENT_LENGTH);
            metrics::record_rewrite(self.rule.name());
        }

        let body = RewriteBody::new(body, self.rule.clone(), active);
        Response::from_parts(parts, Body::new(body))
    }
}

pin_project! {
    /// Body decorator that rewrites every data frame as it passes through.
    pub struct RewriteBody<B> {
        #[pin]
        inner: B,
        rule: Arc<RewriteRule>,
        active: bool,
        bytes_in: u64,
        bytes_out: u64,
        finished: bool,
    }

    impl<B> PinnedDrop for RewriteBody<B> {
        fn drop(this: Pin<&mut Self>) {
            if !this.finished {
                tracing::debug!(
                    bytes_in = this.bytes_in,
                    bytes_out = this.bytes_out,
                    "Response body dropped before completion"
                );
            }
        }
    }
}

impl<B: HttpBody> RewriteBody<B> {
    /// `active == false` passes frames through untouched.
    pub fn new(inner: B, rule: Arc<RewriteRule>, active: bool) -> Self {
        let finished = inner.is_end_stream();
        Self {
            inner,
            rule,
            active,
            bytes_in: 0,
            bytes_out: 0,
            finished,
        }
    }
}

impl<B> HttpBody for RewriteBody<B>
where
    B: HttpBody<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        let frame = match ready!(this.inner.as_mut().poll_frame(cx)) {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                *this.finished = true;
                tracing::warn!(bytes_in = *this.bytes_in, "Upstream body failed mid-stream");
                return Poll::Ready(Some(Err(err)));
            }
            None => {
                if !*this.finished {
                    *this.finished = true;
                    log_completed(*this.active, *this.bytes_in, *this.bytes_out);
                }
                return Poll::Ready(None);
            }
        };

        let frame = match frame.into_data() {
            Ok(data) => {
                *this.bytes_in += data.len() as u64;
                let data = if *this.active {
                    this.rule.rewrite_chunk(data)
                } else {
                    data
                };
                *this.bytes_out += data.len() as u64;
                Frame::data(data)
            }
            Err(frame) => frame,
        };

        if this.inner.is_end_stream() && !*this.finished {
            *this.finished = true;
            log_completed(*this.active, *this.bytes_in, *this.bytes_out);
        }

        Poll::Ready(Some(Ok(frame)))
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        if self.active {
            SizeHint::default()
        } else {
            self.inner.size_hint()
        }
    }
}

fn log_completed(active: bool, bytes_in: u64, bytes_out: u64) {
    if active {
        tracing::debug!(bytes_in, bytes_out, "Response body rewritten");
    }
}
