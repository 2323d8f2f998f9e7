//! C2: a typed view of the two upstream operations the gateway consumes,
//! gated by the rate limiter (spec §4.2, §6).

use crate::address::Address;
use crate::models::{ClearinghouseState, RawFill};
use crate::rate_limiter::{RateLimiter, WEIGHT_CLEARINGHOUSE, WEIGHT_FILLS, WEIGHT_META};
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Upstream returns at most this many fills per `userFillsByTime` call
/// (spec §4.2).
pub const BATCH_MAX: usize = 2000;

#[derive(Debug)]
pub struct UpstreamError(pub String);

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upstream error: {}", self.0)
    }
}

impl std::error::Error for UpstreamError {}

/// Data source abstraction selected by `DATASOURCE_TYPE` (SPEC_FULL §4.11).
/// `async-trait` (rather than native `async fn in trait`) is required here
/// so the gateway can hold a `Box<dyn DataSource>` chosen at startup.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_fills_once(
        &self,
        user: &Address,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawFill>, UpstreamError>;

    async fn fetch_clearinghouse(&self, user: &Address)
        -> Result<ClearinghouseState, UpstreamError>;

    /// Any `200` response is a healthy signal (spec §6).
    async fn check_meta(&self) -> Result<(), UpstreamError>;
}

/// Production `DataSource` talking to the Hyperliquid-shaped `/info`
/// endpoint described in spec §6.
pub struct HyperliquidClient {
    http: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl HyperliquidClient {
    pub fn new(base_url: String, limiter: Arc<RateLimiter>) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| UpstreamError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            limiter,
        })
    }

    fn url(&self) -> String {
        format!("{}/info", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl DataSource for HyperliquidClient {
    async fn fetch_fills_once(
        &self,
        user: &Address,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawFill>, UpstreamError> {
        self.limiter.acquire(WEIGHT_FILLS).await;

        let body = serde_json::json!({
            "type": "userFillsByTime",
            "user": user.as_str(),
            "startTime": start_ms,
            "endTime": end_ms,
            "aggregateByTime": true,
        });

        let resp = self
            .http
            .post(self.url())
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError(format!("fills request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(UpstreamError(format!(
                "fills request returned status {}",
                resp.status()
            )));
        }

        resp.json::<Vec<RawFill>>()
            .await
            .map_err(|e| UpstreamError(format!("failed to decode fills response: {e}")))
    }

    async fn fetch_clearinghouse(
        &self,
        user: &Address,
    ) -> Result<ClearinghouseState, UpstreamError> {
        self.limiter.acquire(WEIGHT_CLEARINGHOUSE).await;

        let body = serde_json::json!({
            "type": "clearinghouseState",
            "user": user.as_str(),
        });

        let resp = self
            .http
            .post(self.url())
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError(format!("clearinghouse request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(UpstreamError(format!(
                "clearinghouse request returned status {}",
                resp.status()
            )));
        }

        resp.json::<ClearinghouseState>()
            .await
            .map_err(|e| UpstreamError(format!("failed to decode clearinghouse response: {e}")))
    }

    async fn check_meta(&self) -> Result<(), UpstreamError> {
        self.limiter.acquire(WEIGHT_META).await;

        let resp = self
            .http
            .post(self.url())
            .json(&serde_json::json!({ "type": "meta" }))
            .send()
            .await
            .map_err(|e| UpstreamError(format!("meta request failed: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(UpstreamError(format!(
                "meta request returned status {}",
                resp.status()
            )))
        }
    }
}
