//! Per-client rate limiting with a fixed-window counter.
//!
//! Every client (source IP, port stripped) owns a [`ClientWindowState`]. A
//! single mutex covers the whole read-check-update, so decisions are
//! serialized across clients; the critical section is O(1).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Body of the 429 response.
pub const RATE_LIMIT_MESSAGE: &str = "Rate Limit Exceeded";

/// Counting state for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientWindowState {
    /// When the current counting window began.
    pub window_started_at: Instant,
    /// Requests admitted since `window_started_at`.
    pub request_count: u32,
}

impl ClientWindowState {
    /// A new window that already holds the request that opened it.
    fn opened_at(now: Instant) -> Self {
        Self {
            window_started_at: now,
            request_count: 1,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_started_at) > window
    }
}

/// Fixed-window request counter keyed by client identifier.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    clients: Mutex<HashMap<String, ClientWindowState>>,
    limit: u32,
    window: Duration,
    enabled: bool,
}

impl FixedWindowLimiter {
    /// Admit at most `limit` requests per client in each `window`.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            limit,
            window,
            enabled: true,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            ..Self::new(config.max_requests, Duration::from_secs(config.window_secs))
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether `client_id` may send another request now.
    pub fn is_allowed(&self, client_id: &str) -> bool {
        self.is_allowed_at(client_id, Instant::now())
    }

    /// Same as [`is_allowed`](Self::is_allowed) with an explicit clock reading.
    pub fn is_allowed_at(&self, client_id: &str, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        let mut clients = self.lock();
        match clients.entry(client_id.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(ClientWindowState::opened_at(now));
                metrics::record_tracked_clients(clients.len());
                true
            }
            Entry::Occupied(mut slot) => {
                let state = slot.get_mut();
                if state.is_expired(now, self.window) {
                    *state = ClientWindowState::opened_at(now);
                    true
                } else if state.request_count < self.limit {
                    state.request_count += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Current state for a client, if one has been seen.
    pub fn client_state(&self, client_id: &str) -> Option<ClientWindowState> {
        self.lock().get(client_id).copied()
    }

    /// Number of clients with live state.
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    /// Drop clients whose window has expired. Returns how many were removed.
    pub fn evict_stale(&self) -> usize {
        self.evict_stale_at(Instant::now())
    }

    pub fn evict_stale_at(&self, now: Instant) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, state| !state.is_expired(now, self.window));
        let removed = before - clients.len();
        metrics::record_tracked_clients(clients.len());
        removed
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientWindowState>> {
        // The map holds plain data, so a panic elsewhere cannot leave it torn.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Periodically evict stale clients until shutdown is signalled.
pub fn spawn_eviction_sweep(
    limiter: Arc<FixedWindowLimiter>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval = ?every, "Rate limiter eviction sweep starting");

        let mut ticker = time::interval(every);
        // The first tick completes immediately; nothing can be stale yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.evict_stale();
                    if removed > 0 {
                        tracing::debug!(
                            removed,
                            remaining = limiter.tracked_clients(),
                            "Evicted stale rate limit entries"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Eviction sweep received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    })
}

/// Client identifier used as the rate limit key: the source IP without port.
pub fn client_id(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

/// Middleware function for per-client rate limiting.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<FixedWindowLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_id(&addr);

    if limiter.is_allowed(&client) {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, "Rate limit exceeded");
        metrics::record_rate_limited();
        (StatusCode::TOO_MANY_REQUESTS, RATE_LIMIT_MESSAGE).into_response()
    }
}
