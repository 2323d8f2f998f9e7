//! C11: the HTTP surface. Parses/validates query params and dispatches to
//! C6–C10 (spec §6). The transport itself is explicitly out of scope of the
//! core derivation pipeline — this module is thin by design.

pub mod routes;

use crate::registry::Registry;
use crate::services::leaderboard::LeaderboardService;
use crate::services::pnl::PnlService;
use crate::services::positions::PositionService;
use crate::services::trades::TradeService;
use crate::upstream::DataSource;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub trades: Arc<TradeService>,
    pub positions: Arc<PositionService>,
    pub pnl: Arc<PnlService>,
    pub leaderboard: Arc<LeaderboardService>,
    pub registry: Arc<Registry>,
    pub source: Arc<dyn DataSource>,
    pub datasource_name: &'static str,
    pub default_max_start_capital: f64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/v1/trades", get(routes::get_trades))
        .route("/v1/positions/history", get(routes::get_positions))
        .route("/v1/pnl", get(routes::get_pnl))
        .route("/v1/leaderboard", get(routes::get_leaderboard))
        .route(
            "/v1/users",
            get(routes::list_users).post(routes::register_user),
        )
        .route("/v1/users/:user", axum::routing::delete(routes::unregister_user))
        .with_state(state)
}
