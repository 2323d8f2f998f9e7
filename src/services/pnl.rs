//! C8: realized-PnL aggregation, capped-capital return normalization, and
//! the historical-equity approximation (spec §4.8).

use crate::address::Address;
use crate::builder_filter::BuilderFilter;
use crate::cache::TtlCache;
use crate::error::AppError;
use crate::models::ClearinghouseState;
use crate::services::trades::TradeService;
use crate::upstream::{DataSource, UpstreamError};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PnlParams {
    pub user: Address,
    pub coin: Option<String>,
    pub from_ms: i64,
    pub to_ms: i64,
    pub builder_only: bool,
    pub max_start_capital: f64,
}

/// Minimum effective capital enforced by spec §3's invariant
/// `effectiveCapital >= 0.01`.
const MIN_EFFECTIVE_CAPITAL: f64 = 0.01;

pub struct PnlService {
    source: Arc<dyn DataSource>,
    clearinghouse_cache: Arc<TtlCache<ClearinghouseState, UpstreamError>>,
    trades: Arc<TradeService>,
    builder_filter: Arc<BuilderFilter>,
}

impl PnlService {
    pub fn new(
        source: Arc<dyn DataSource>,
        clearinghouse_cache: Arc<TtlCache<ClearinghouseState, UpstreamError>>,
        trades: Arc<TradeService>,
        builder_filter: Arc<BuilderFilter>,
    ) -> Self {
        Self {
            source,
            clearinghouse_cache,
            trades,
            builder_filter,
        }
    }

    async fn current_equity(&self, user: &Address) -> Result<f64, AppError> {
        let source = self.source.clone();
        let user_owned = user.clone();
        self.clearinghouse_cache
            .get(user.as_str(), move || async move {
                source.fetch_clearinghouse(&user_owned).await
            })
            .await
            .map(|state| state.margin_summary.account_value)
            .map_err(|e| AppError::Upstream(e.to_string()))
    }

    /// Spec §4.8.1: `equityAtFromMs ~= max(currentEquity - sum(closedPnl in
    /// (fromMs, now)), 0.01)`, or `currentEquity` when `fromMs >= now`.
    async fn equity_at_from_ms(
        &self,
        user: &Address,
        coin: Option<&str>,
        from_ms: i64,
        now_ms: i64,
    ) -> Result<f64, AppError> {
        let current_equity = self.current_equity(user).await?;
        if from_ms >= now_ms {
            return Ok(current_equity);
        }

        let fills = self.trades.get_raw_fills(user, coin, from_ms, now_ms).await?;
        let closed_pnl_since: f64 = fills
            .iter()
            .filter(|f| f.time > from_ms && f.time <= now_ms)
            .map(|f| f.closed_pnl)
            .sum();

        Ok((current_equity - closed_pnl_since).max(MIN_EFFECTIVE_CAPITAL))
    }

    /// `now_ms` is threaded through explicitly (rather than read from the
    /// wall clock here) so the historical-equity approximation is
    /// deterministically testable.
    pub async fn calculate_pnl_at(
        &self,
        params: &PnlParams,
        now_ms: i64,
    ) -> Result<crate::models::PnlResult, AppError> {
        let raw = self
            .trades
            .get_raw_fills(&params.user, params.coin.as_deref(), params.from_ms, params.to_ms)
            .await?;

        let mut has_builder = false;
        let mut has_non_builder = false;
        let mut realized_pnl = 0.0_f64;
        let mut fees_paid = 0.0_f64;
        let mut trade_count: u64 = 0;

        for fill in raw
            .iter()
            .filter(|f| f.time >= params.from_ms && f.time <= params.to_ms)
        {
            if self.builder_filter.is_builder_fill(fill) {
                has_builder = true;
            } else {
                has_non_builder = true;
            }

            if !params.builder_only || self.builder_filter.is_builder_fill(fill) {
                realized_pnl += fill.closed_pnl;
                fees_paid += fill.fee;
                trade_count += 1;
            }
        }

        let equity_at_from_ms = self
            .equity_at_from_ms(&params.user, params.coin.as_deref(), params.from_ms, now_ms)
            .await?;
        let effective_capital = equity_at_from_ms
            .max(MIN_EFFECTIVE_CAPITAL)
            .min(params.max_start_capital);
        let return_pct = (100.0 * realized_pnl / effective_capital).clamp(-1000.0, 1000.0);
        let tainted = params.builder_only && has_builder && has_non_builder;

        Ok(crate::models::PnlResult {
            realized_pnl,
            return_pct,
            fees_paid,
            trade_count,
            tainted,
            effective_capital,
        })
    }

    pub async fn calculate_volume(&self, params: &PnlParams) -> Result<f64, AppError> {
        let raw = self
            .trades
            .get_raw_fills(&params.user, params.coin.as_deref(), params.from_ms, params.to_ms)
            .await?;

        let volume = raw
            .iter()
            .filter(|f| f.time >= params.from_ms && f.time <= params.to_ms)
            .filter(|f| !params.builder_only || self.builder_filter.is_builder_fill(f))
            .map(|f| f.px * f.sz)
            .sum();
        Ok(volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MarginSummary, RawFill};
    use async_trait::async_trait;

    fn user() -> Address {
        Address::parse("0x1111111111111111111111111111111111111111").unwrap()
    }

    fn fill(time: i64, side: &str, px: f64, sz: f64, closed_pnl: f64, fee: f64) -> RawFill {
        serde_json::from_value(serde_json::json!({
            "coin": "BTC", "px": px.to_string(), "sz": sz.to_string(), "side": side, "time": time,
            "closedPnl": closed_pnl.to_string(), "fee": fee.to_string(),
            "hash": "0xh", "oid": time, "tid": time,
        }))
        .unwrap()
    }

    struct FixedSource {
        fills: Vec<RawFill>,
        equity: f64,
    }

    #[async_trait]
    impl DataSource for FixedSource {
        async fn fetch_fills_once(
            &self,
            _user: &Address,
            start_ms: i64,
            end_ms: i64,
        ) -> Result<Vec<RawFill>, UpstreamError> {
            Ok(self
                .fills
                .iter()
                .filter(|f| f.time >= start_ms && f.time <= end_ms)
                .cloned()
                .collect())
        }

        async fn fetch_clearinghouse(
            &self,
            _user: &Address,
        ) -> Result<ClearinghouseState, UpstreamError> {
            Ok(ClearinghouseState {
                margin_summary: MarginSummary {
                    account_value: self.equity,
                },
                asset_positions: vec![],
            })
        }

        async fn check_meta(&self) -> Result<(), UpstreamError> {
            Ok(())
        }
    }

    fn service(fills: Vec<RawFill>, equity: f64, target_builder: Option<Address>) -> PnlService {
        let source: Arc<dyn DataSource> = Arc::new(FixedSource { fills, equity });
        let builder_filter = Arc::new(BuilderFilter::new(target_builder));
        let trades = Arc::new(TradeService::new(
            source.clone(),
            Arc::new(TtlCache::new(60_000)),
            builder_filter.clone(),
        ));
        PnlService::new(source, Arc::new(TtlCache::new(5_000)), trades, builder_filter)
    }

    fn params(from_ms: i64, to_ms: i64, builder_only: bool, max_start_capital: f64) -> PnlParams {
        PnlParams {
            user: user(),
            coin: None,
            from_ms,
            to_ms,
            builder_only,
            max_start_capital,
        }
    }

    #[tokio::test]
    async fn s1_basic_buy_then_sell_pnl() {
        let svc = service(
            vec![
                fill(1000, "B", 100.0, 1.0, 0.0, 1.0),
                fill(2000, "A", 110.0, 1.0, 10.0, 1.0),
            ],
            1_000.0,
            None,
        );
        let result = svc
            .calculate_pnl_at(&params(0, 5000, false, 1_000_000.0), 10_000)
            .await
            .unwrap();
        assert_eq!(result.realized_pnl, 10.0);
        assert_eq!(result.fees_paid, 2.0);
        assert_eq!(result.trade_count, 2);
        assert!(!result.tainted);
    }

    #[tokio::test]
    async fn s4_return_pct_is_capped_at_1000() {
        let svc = service(vec![fill(1000, "B", 100.0, 1.0, 5000.0, 0.0)], 1.0, None);
        let result = svc
            .calculate_pnl_at(&params(0, 5000, false, 1.0), 0)
            .await
            .unwrap();
        // fromMs(0) >= now(0) -> effectiveCapital is currentEquity capped to maxStartCapital = 1
        assert_eq!(result.effective_capital, 1.0);
        assert_eq!(result.return_pct, 1000.0);
    }

    #[tokio::test]
    async fn taint_requires_builder_only_and_a_mix_of_fills() {
        let target = Address::parse("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let mut builder_fill = fill(1000, "B", 100.0, 1.0, 0.0, 0.0);
        builder_fill.builder_fee = Some(1.0);
        let non_builder_fill = fill(2000, "A", 100.0, 1.0, 0.0, 0.0);

        let svc = service(vec![builder_fill, non_builder_fill], 1_000.0, Some(target));
        let result = svc
            .calculate_pnl_at(&params(0, 5000, true, 1_000_000.0), 10_000)
            .await
            .unwrap();
        assert!(result.tainted);
    }

    #[tokio::test]
    async fn equity_approximation_subtracts_closed_pnl_after_from_ms() {
        // currentEquity = 1000; one fill after fromMs realized closedPnl=100
        let svc = service(vec![fill(2000, "A", 110.0, 1.0, 100.0, 0.0)], 1_000.0, None);
        let result = svc
            .calculate_pnl_at(&params(1500, 1500, false, 1_000_000.0), 10_000)
            .await
            .unwrap();
        assert_eq!(result.effective_capital, 900.0);
    }

    #[tokio::test]
    async fn calculate_volume_sums_price_times_size() {
        let svc = service(
            vec![
                fill(1000, "B", 100.0, 2.0, 0.0, 0.0),
                fill(2000, "A", 50.0, 1.0, 0.0, 0.0),
            ],
            0.0,
            None,
        );
        let volume = svc.calculate_volume(&params(0, 5000, false, 1.0)).await.unwrap();
        assert_eq!(volume, 250.0);
    }
}
