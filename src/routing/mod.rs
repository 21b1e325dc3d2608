//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (query, headers)
//!     → resolver.rs (read configured upstream source)
//!     → Return: upstream host or explicit miss
//! ```
//!
//! # Design Decisions
//! - Exactly one source per deployment (query parameter OR header)
//! - A miss terminates the request with 400 before any upstream contact

pub mod resolver;

pub use resolver::UpstreamResolver;
