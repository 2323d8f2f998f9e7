//! C6: fill normalization, builder filtering, and identity-key collapse
//! (spec §4.6). Also the shared raw-fills accessor that positions/pnl
//! build on top of, so every service reads through the same cache entry
//! for a given `(user, coin, fromMs, toMs)`.

use crate::address::Address;
use crate::builder_filter::BuilderFilter;
use crate::cache::{fills_cache_key, TtlCache};
use crate::error::AppError;
use crate::models::{CollapseBy, NormalizedFill, RawFill};
use crate::upstream::{fetch_all_fills, DataSource, UpstreamError};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TradeParams {
    pub user: Address,
    pub coin: Option<String>,
    pub from_ms: i64,
    pub to_ms: i64,
    pub builder_only: bool,
    pub collapse_by: Option<CollapseBy>,
}

pub struct TradeService {
    source: Arc<dyn DataSource>,
    fills_cache: Arc<TtlCache<Vec<RawFill>, UpstreamError>>,
    builder_filter: Arc<BuilderFilter>,
}

impl TradeService {
    pub fn new(
        source: Arc<dyn DataSource>,
        fills_cache: Arc<TtlCache<Vec<RawFill>, UpstreamError>>,
        builder_filter: Arc<BuilderFilter>,
    ) -> Self {
        Self {
            source,
            fills_cache,
            builder_filter,
        }
    }

    /// Read-through accessor shared with `positions` and `pnl` — both call
    /// this rather than touching the cache or paginator directly (spec
    /// §4.6 "also exposes `getRawFills`").
    pub async fn get_raw_fills(
        &self,
        user: &Address,
        coin: Option<&str>,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Arc<Vec<RawFill>>, AppError> {
        let key = fills_cache_key(user.as_str(), coin, from_ms, to_ms);
        let source = self.source.clone();
        let user = user.clone();
        let coin_owned = coin.map(str::to_string);

        self.fills_cache
            .get(&key, move || async move {
                fetch_all_fills(source.as_ref(), &user, coin_owned.as_deref(), from_ms, to_ms).await
            })
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))
    }

    pub async fn get_trades(&self, params: &TradeParams) -> Result<Vec<NormalizedFill>, AppError> {
        let raw = self
            .get_raw_fills(&params.user, params.coin.as_deref(), params.from_ms, params.to_ms)
            .await?;

        let mut fills: Vec<&RawFill> = raw
            .iter()
            .filter(|f| f.time >= params.from_ms && f.time <= params.to_ms)
            .collect();

        if params.builder_only {
            fills.retain(|f| self.builder_filter.is_builder_fill(f));
        }

        if let Some(collapse) = params.collapse_by {
            fills.sort_by_key(|f| f.time);
            let mut seen = HashSet::new();
            fills.retain(|f| seen.insert(collapse.key_of(f)));
        }

        Ok(fills.iter().map(|f| NormalizedFill::from_raw(f)).collect())
    }
}
