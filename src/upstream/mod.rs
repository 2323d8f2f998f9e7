//! Upstream access: the rate-limited C2 client and the C3 paginator built
//! on top of it.

pub mod client;
pub mod paginator;

pub use client::{DataSource, HyperliquidClient, UpstreamError, BATCH_MAX};
pub use paginator::fetch_all_fills;
