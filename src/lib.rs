//! Forward-anywhere HTTP relay library.
//!
//! Each request names its own upstream host; the relay logs it, rate limits
//! the caller, forwards it over HTTP, and rewrites the response on its way
//! back.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
