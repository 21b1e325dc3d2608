//! Request forwarding to the resolved upstream.
//!
//! # Responsibilities
//! - Rebuild the inbound request against `http://<upstream>`
//! - Dispatch it through the shared connection-pooling client
//! - Hand the upstream response to the rewriter, then add CORS headers
//! - Map transport failures to 502 without retrying

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::HOST,
        uri::{Authority, PathAndQuery, Scheme},
        Request, Uri, Version,
    },
    response::{IntoResponse, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::http::error::ProxyError;
use crate::http::response::ResponseRewriter;
use crate::observability::metrics;
use crate::security::headers::{append_forwarded_for, strip_hop_by_hop, CorsHeaders};

/// Forwards requests to a per-request upstream host over plain HTTP.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    rewriter: ResponseRewriter,
}

impl Forwarder {
    pub fn new(connect_timeout: Duration, rewriter: ResponseRewriter) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client, rewriter }
    }

    /// Forward `request` to `upstream` and produce the reply for the caller.
    ///
    /// Always yields a response: failures become 400/500/502 replies. CORS
    /// headers are attached to every reply produced here.
    pub async fn forward(&self, upstream: &str, client_ip: IpAddr, request: Request<Body>) -> Response {
        let cors = CorsHeaders::from_request(request.headers());

        let mut response = match self.dispatch(upstream, client_ip, request).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    ProxyError::Upstream(e) => {
                        tracing::error!(upstream = %upstream, error = %e, "Upstream error");
                        metrics::record_upstream_error();
                    }
                    other => tracing::debug!(upstream = %upstream, error = %other, "Request not forwarded"),
                }
                err.into_response()
            }
        };

        cors.apply(response.headers_mut());
        response
    }

    async fn dispatch(
        &self,
        upstream: &str,
        client_ip: IpAddr,
        request: Request<Body>,
    ) -> Result<Response, ProxyError> {
        let authority =
            Authority::from_str(upstream).map_err(|_| ProxyError::InvalidTarget(upstream.to_owned()))?;
        let outbound = build_outbound(request, authority, client_ip)?;

        tracing::debug!(
            upstream = %upstream,
            method = %outbound.method(),
            uri = %outbound.uri(),
            "Forwarding request"
        );

        let mut upstream_response = self.client.request(outbound).await?;
        strip_hop_by_hop(upstream_response.headers_mut());

        Ok(self.rewriter.rewrite(upstream_response))
    }
}

/// Retarget the inbound request at `http://{authority}`, keeping method,
/// path, query, headers, and body.
fn build_outbound(
    request: Request<Body>,
    authority: Authority,
    client_ip: IpAddr,
) -> Result<Request<Body>, ProxyError> {
    let (parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(authority);
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    let uri = Uri::from_parts(uri_parts).map_err(axum::http::Error::from)?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    // The client derives Host from the upstream authority.
    headers.remove(HOST);
    append_forwarded_for(&mut headers, client_ip);

    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(uri)
        .version(Version::HTTP_11)
        .body(body)?;
    *outbound.headers_mut() = headers;

    Ok(outbound)
}
