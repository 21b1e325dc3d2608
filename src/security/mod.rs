//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client fixed window, 429 on rejection)
//!     → [resolver + forwarder]
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-For)
//!
//! Outgoing response:
//!     → headers.rs (strip hop-by-hop, CORS triad)
//! ```
//!
//! # Design Decisions
//! - Rate limiting runs before any upstream work
//! - A rejection is a normal outcome, not an error

pub mod headers;
pub mod rate_limit;

pub use headers::CorsHeaders;
pub use rate_limit::{rate_limit_middleware, ClientWindowState, FixedWindowLimiter};
