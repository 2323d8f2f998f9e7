//! C7: average-cost position reconstruction with builder-only lifecycle
//! taint tracking (spec §4.7).

use crate::address::Address;
use crate::builder_filter::BuilderFilter;
use crate::error::AppError;
use crate::models::{PositionState, RawFill};
use crate::services::trades::TradeService;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PositionParams {
    pub user: Address,
    pub coin: Option<String>,
    pub from_ms: i64,
    pub to_ms: i64,
    pub include_prior: bool,
    pub builder_only: bool,
}

pub struct PositionService {
    trades: Arc<TradeService>,
    builder_filter: Arc<BuilderFilter>,
}

impl PositionService {
    pub fn new(trades: Arc<TradeService>, builder_filter: Arc<BuilderFilter>) -> Self {
        Self {
            trades,
            builder_filter,
        }
    }

    pub async fn get_position_history(
        &self,
        params: &PositionParams,
    ) -> Result<Vec<PositionState>, AppError> {
        let lower_bound = if params.include_prior { 0 } else { params.from_ms };
        let raw = self
            .trades
            .get_raw_fills(&params.user, params.coin.as_deref(), lower_bound, params.to_ms)
            .await?;

        let coins: Vec<String> = match &params.coin {
            Some(c) => vec![c.to_uppercase()],
            None => {
                let mut seen = BTreeSet::new();
                let mut order = Vec::new();
                for f in raw.iter() {
                    if seen.insert(f.coin.to_uppercase()) {
                        order.push(f.coin.clone());
                    }
                }
                order
            }
        };

        let mut states = Vec::new();
        for coin in &coins {
            let mut coin_fills: Vec<&RawFill> = raw
                .iter()
                .filter(|f| f.coin.eq_ignore_ascii_case(coin))
                .collect();
            coin_fills.sort_by_key(|f| f.time);
            states.extend(self.reconstruct(&coin_fills, coin, params.from_ms, params.builder_only));
        }
        states.sort_by_key(|s| s.time_ms);
        Ok(states)
    }

    /// Average-cost reconstruction (spec §4.7). `net_size`/`avg_entry_px`
    /// only move for fills counted under the active mode; every fill
    /// still updates the lifecycle's `hasBuilder`/`hasNonBuilder`
    /// counters, which reset the instant the position returns to flat.
    fn reconstruct(
        &self,
        fills: &[&RawFill],
        coin: &str,
        from_ms: i64,
        builder_only: bool,
    ) -> Vec<PositionState> {
        let mut net_size = 0.0_f64;
        let mut avg_entry_px = 0.0_f64;
        let mut has_builder = false;
        let mut has_non_builder = false;
        let mut out = Vec::new();

        for fill in fills {
            let counted = !builder_only || self.builder_filter.is_builder_fill(fill);

            if counted {
                let s = fill.signed_size();
                let p = fill.px;
                let n = net_size;
                let n_prime = n + s;

                if n == 0.0 {
                    avg_entry_px = p;
                } else if n.signum() == s.signum() {
                    let total_cost = n.abs() * avg_entry_px + s.abs() * p;
                    if n_prime != 0.0 {
                        avg_entry_px = total_cost / n_prime.abs();
                    }
                } else if s.abs() > n.abs() {
                    avg_entry_px = p;
                }
                // else: reduce — avg_entry_px stays put, totalCost isn't rescaled.

                net_size = n_prime;
            }

            if self.builder_filter.is_builder_fill(fill) {
                has_builder = true;
            } else {
                has_non_builder = true;
            }

            if counted && fill.time >= from_ms {
                out.push(PositionState {
                    time_ms: fill.time,
                    coin: coin.to_string(),
                    net_size,
                    avg_entry_px: if net_size == 0.0 { 0.0 } else { avg_entry_px },
                    tainted: has_builder && has_non_builder,
                });
            }

            if net_size == 0.0 {
                has_builder = false;
                has_non_builder = false;
            }
        }

        out
    }
}
