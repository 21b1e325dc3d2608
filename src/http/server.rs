//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (request ID, logging, rate limiting)
//! - Bind server to listener and serve until shutdown
//! - Resolve the upstream for each request and hand it to the forwarder
//!
//! Layer order, outermost first:
//! ```text
//! request-id → logging → rate limit → resolver → forwarder → rewriter
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::config::ProxyConfig;
use crate::http::error::{ProxyError, SetupError};
use crate::http::proxy::Forwarder;
use crate::http::request::ResolvedUpstream;
use crate::http::response::ResponseRewriter;
use crate::observability::logging_middleware;
use crate::routing::UpstreamResolver;
use crate::security::rate_limit::{rate_limit_middleware, spawn_eviction_sweep, FixedWindowLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<UpstreamResolver>,
    pub forwarder: Arc<Forwarder>,
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    limiter: Arc<FixedWindowLimiter>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, SetupError> {
        let rewriter = ResponseRewriter::from_config(&config.rewrite)?;
        let forwarder = Forwarder::new(Duration::from_secs(config.timeouts.connect_secs), rewriter);

        let state = AppState {
            resolver: Arc::new(UpstreamResolver::new(config.upstream.source.clone())),
            forwarder: Arc::new(forwarder),
        };
        let limiter = Arc::new(FixedWindowLimiter::from_config(&config.rate_limit));

        let router = Self::build_router(state, limiter.clone());
        Ok(Self {
            router,
            config,
            limiter,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, limiter: Arc<FixedWindowLimiter>) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(middleware::from_fn(logging_middleware))
                    .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware)),
            )
    }

    /// The assembled router. Requires `ConnectInfo<SocketAddr>` when served.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweep_every = self.config.rate_limit.eviction_interval_secs;
        let sweep = (self.limiter.is_enabled() && sweep_every > 0).then(|| {
            spawn_eviction_sweep(
                self.limiter.clone(),
                Duration::from_secs(sweep_every),
                shutdown.resubscribe(),
            )
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        if let Some(handle) = sweep {
            let _ = handle.await;
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Resolves the upstream and forwards the request to it.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let Some(upstream) = state.resolver.resolve(&request) else {
        tracing::debug!(path = %request.uri().path(), "No upstream in request");
        return ProxyError::MissingTarget(state.resolver.missing_reason()).into_response();
    };

    let mut response = state.forwarder.forward(&upstream, addr.ip(), request).await;
    response.extensions_mut().insert(ResolvedUpstream(upstream));
    response
}
