//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (per-request context for logging)
//!     → [resolver picks the upstream host]
//!     → proxy.rs (rebuild and dispatch to http://<upstream>)
//!     → response.rs (marker header, streaming body rewrite)
//!     → Send to client
//! ```

pub mod error;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use error::{ProxyError, SetupError};
pub use proxy::Forwarder;
pub use request::{ProxyRequestContext, ResolvedUpstream, X_REQUEST_ID};
pub use response::{ResponseRewriter, RewriteRule};
pub use server::HttpServer;
