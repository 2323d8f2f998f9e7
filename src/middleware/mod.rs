//! Cross-cutting HTTP middleware.
//!
//! This module provides request logging. Upstream rate limiting lives in
//! [`crate::rate_limiter`] — it gates outbound calls to the exchange, not
//! inbound requests, so it is not an `axum` middleware.

pub mod logging;

pub use logging::request_logging_simple;
