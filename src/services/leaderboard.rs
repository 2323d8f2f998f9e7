//! C10: fans C8 out over the registered user set and ranks the results
//! (spec §4.10). The fan-out uses `FuturesUnordered` so slow per-user PnL
//! calls don't head-of-line block the rest — the same shape the teacher
//! crate uses to fetch candles for many wallets at once.

use crate::address::Address;
use crate::models::{LeaderboardEntry, Metric};
use crate::registry::Registry;
use crate::services::pnl::{PnlParams, PnlService};
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct LeaderboardParams {
    pub metric: Metric,
    pub coin: Option<String>,
    pub from_ms: i64,
    pub to_ms: i64,
    pub builder_only: bool,
    pub max_start_capital: f64,
    pub limit: usize,
}

pub struct LeaderboardService {
    pnl: Arc<PnlService>,
    registry: Arc<Registry>,
}

impl LeaderboardService {
    pub fn new(pnl: Arc<PnlService>, registry: Arc<Registry>) -> Self {
        Self { pnl, registry }
    }

    /// Per-user PnL (and, for the `volume` metric, an extra C8 call) is
    /// resolved concurrently; a failure or taint-exclusion just drops that
    /// user's row rather than failing the whole call (spec §4.10, §7
    /// "leaderboard still succeeds").
    pub async fn get_leaderboard(&self, params: &LeaderboardParams, now_ms: i64) -> Vec<LeaderboardEntry> {
        let users = self.registry.list();

        let mut pending = FuturesUnordered::new();
        for (idx, user) in users.into_iter().enumerate() {
            let pnl = self.pnl.clone();
            let params = params.clone();
            pending.push(async move { Self::compute_one(pnl, idx, user, params, now_ms).await });
        }

        let mut rows = Vec::new();
        while let Some(row) = pending.next().await {
            if let Some(row) = row {
                rows.push(row);
            }
        }

        rows.sort_by(|a, b| {
            b.1.metric_value
                .partial_cmp(&a.1.metric_value)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        rows.into_iter()
            .take(params.limit)
            .enumerate()
            .map(|(i, (_, mut entry))| {
                entry.rank = (i + 1) as u32;
                entry
            })
            .collect()
    }

    async fn compute_one(
        pnl: Arc<PnlService>,
        idx: usize,
        user: Address,
        params: LeaderboardParams,
        now_ms: i64,
    ) -> Option<(usize, LeaderboardEntry)> {
        let pnl_params = PnlParams {
            user: user.clone(),
            coin: params.coin.clone(),
            from_ms: params.from_ms,
            to_ms: params.to_ms,
            builder_only: params.builder_only,
            max_start_capital: params.max_start_capital,
        };

        let result = match pnl.calculate_pnl_at(&pnl_params, now_ms).await {
            Ok(r) => r,
            Err(err) => {
                warn!(user = %user.as_str(), error = ?err, "leaderboard: per-user PnL failed, skipping");
                return None;
            }
        };

        if params.builder_only && result.tainted {
            return None;
        }

        let metric_value = match params.metric {
            Metric::Pnl => result.realized_pnl,
            Metric::ReturnPct => result.return_pct,
            Metric::Volume => match pnl.calculate_volume(&pnl_params).await {
                Ok(v) => v,
                Err(err) => {
                    warn!(user = %user.as_str(), error = ?err, "leaderboard: volume lookup failed, skipping");
                    return None;
                }
            },
        };

        Some((
            idx,
            LeaderboardEntry {
                rank: 0,
                user: user.as_str().to_string(),
                metric_value,
                trade_count: result.trade_count,
                tainted: result.tainted,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder_filter::BuilderFilter;
    use crate::cache::TtlCache;
    use crate::models::{ClearinghouseState, MarginSummary, RawFill};
    use crate::services::trades::TradeService;
    use crate::upstream::{DataSource, UpstreamError};
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn fill(time: i64, side: &str, px: f64, sz: f64, closed_pnl: f64) -> RawFill {
        serde_json::from_value(serde_json::json!({
            "coin": "BTC", "px": px.to_string(), "sz": sz.to_string(), "side": side, "time": time,
            "closedPnl": closed_pnl.to_string(), "fee": "0", "hash": "0xh", "oid": time, "tid": time,
        }))
        .unwrap()
    }

    /// Per-user scripted fills/equity, keyed by lowercase address.
    struct PerUserSource {
        fills: HashMap<String, Vec<RawFill>>,
        equity: HashMap<String, f64>,
    }

    #[async_trait]
    impl DataSource for PerUserSource {
        async fn fetch_fills_once(
            &self,
            user: &Address,
            start_ms: i64,
            end_ms: i64,
        ) -> Result<Vec<RawFill>, UpstreamError> {
            Ok(self
                .fills
                .get(user.as_str())
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|f| f.time >= start_ms && f.time <= end_ms)
                .collect())
        }

        async fn fetch_clearinghouse(&self, user: &Address) -> Result<ClearinghouseState, UpstreamError> {
            Ok(ClearinghouseState {
                margin_summary: MarginSummary {
                    account_value: *self.equity.get(user.as_str()).unwrap_or(&1_000_000.0),
                },
                asset_positions: vec![],
            })
        }

        async fn check_meta(&self) -> Result<(), UpstreamError> {
            Ok(())
        }
    }

    fn build(
        fills: HashMap<String, Vec<RawFill>>,
        target_builder: Option<Address>,
        users: &[&str],
    ) -> LeaderboardService {
        let source: Arc<dyn DataSource> = Arc::new(PerUserSource {
            fills,
            equity: HashMap::new(),
        });
        let builder_filter = Arc::new(BuilderFilter::new(target_builder));
        let trades = Arc::new(TradeService::new(
            source.clone(),
            Arc::new(TtlCache::new(60_000)),
            builder_filter.clone(),
        ));
        let pnl = Arc::new(PnlService::new(
            source,
            Arc::new(TtlCache::new(5_000)),
            trades,
            builder_filter,
        ));
        let registry = Arc::new(Registry::new());
        for u in users {
            registry.register(addr(u));
        }
        LeaderboardService::new(pnl, registry)
    }

    #[tokio::test]
    async fn s5_leaderboard_excludes_tainted_user_under_builder_only() {
        let target = addr("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let user_a = "0x1111111111111111111111111111111111111111";
        let user_b = "0x2222222222222222222222222222222222222222";

        let mut fills = HashMap::new();
        let mut a_fill = fill(1000, "B", 100.0, 1.0, 50.0);
        a_fill.builder_fee = Some(1.0);
        fills.insert(user_a.to_string(), vec![a_fill]);

        let mut b_builder = fill(1000, "B", 100.0, 1.0, 10.0);
        b_builder.builder_fee = Some(1.0);
        let b_non_builder = fill(2000, "A", 100.0, 1.0, 5.0);
        fills.insert(user_b.to_string(), vec![b_builder, b_non_builder]);

        let svc = build(fills, Some(target), &[user_a, user_b]);
        let entries = svc
            .get_leaderboard(
                &LeaderboardParams {
                    metric: Metric::Pnl,
                    coin: None,
                    from_ms: 0,
                    to_ms: 5000,
                    builder_only: true,
                    max_start_capital: 1_000_000.0,
                    limit: 100,
                },
                10_000,
            )
            .await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user, user_a);
        assert_eq!(entries[0].rank, 1);
        assert!(!entries[0].tainted);
    }

    #[tokio::test]
    async fn ranks_dense_and_descending_by_metric() {
        let user_a = "0x1111111111111111111111111111111111111111";
        let user_b = "0x2222222222222222222222222222222222222222";

        let mut fills = HashMap::new();
        fills.insert(user_a.to_string(), vec![fill(1000, "B", 100.0, 1.0, 10.0)]);
        fills.insert(user_b.to_string(), vec![fill(1000, "B", 100.0, 1.0, 90.0)]);

        let svc = build(fills, None, &[user_a, user_b]);
        let entries = svc
            .get_leaderboard(
                &LeaderboardParams {
                    metric: Metric::Pnl,
                    coin: None,
                    from_ms: 0,
                    to_ms: 5000,
                    builder_only: false,
                    max_start_capital: 1_000_000.0,
                    limit: 100,
                },
                10_000,
            )
            .await;

        assert_eq!(entries[0].user, user_b);
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[1].user, user_a);
        assert_eq!(entries[1].rank, 2);
    }

    #[tokio::test]
    async fn truncates_to_limit() {
        let user_a = "0x1111111111111111111111111111111111111111";
        let user_b = "0x2222222222222222222222222222222222222222";
        let mut fills = HashMap::new();
        fills.insert(user_a.to_string(), vec![fill(1000, "B", 100.0, 1.0, 10.0)]);
        fills.insert(user_b.to_string(), vec![fill(1000, "B", 100.0, 1.0, 20.0)]);

        let svc = build(fills, None, &[user_a, user_b]);
        let entries = svc
            .get_leaderboard(
                &LeaderboardParams {
                    metric: Metric::Pnl,
                    coin: None,
                    from_ms: 0,
                    to_ms: 5000,
                    builder_only: false,
                    max_start_capital: 1_000_000.0,
                    limit: 1,
                },
                10_000,
            )
            .await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user, user_b);
    }
}
